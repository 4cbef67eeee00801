//! Per-batch interning tables.
//!
//! Repeated type names and actor refs are sent once per batch and referenced
//! by index from each envelope.

use std::collections::HashMap;

use crate::types::ActorRef;

/// Interning table for payload type names. Indices are 0-based.
#[derive(Debug, Default)]
pub struct TypeNameTable {
    index: HashMap<String, u32>,
    names: Vec<String>,
}

impl TypeNameTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, inserting it on first sight.
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        // One entry costs several encoded bytes, so a table past u32::MAX
        // entries belongs to a batch far over MAX_PAYLOAD_SIZE. Such a batch
        // is split or dropped before any byte is written, so a wrapped index
        // never reaches the wire.
        let id = self.names.len() as u32;
        self.index.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing was interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consume the table, yielding names in index order.
    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Interning table for actor refs.
///
/// Refs are keyed by their stripped form, so the `(address, id)` pair is
/// compared field by field and the request id never splits an identity.
/// Returned indices are 1-based so 0 can stand for "no ref".
#[derive(Debug, Default)]
pub struct ActorRefTable {
    index: HashMap<ActorRef, u32>,
    refs: Vec<ActorRef>,
}

impl ActorRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based index of `actor`, or 0 when `actor` is `None`.
    pub fn intern(&mut self, actor: Option<&ActorRef>) -> u32 {
        let Some(actor) = actor else {
            return 0;
        };

        let key = actor.stripped();
        if let Some(&id) = self.index.get(&key) {
            return id + 1;
        }
        // At most one ref per envelope; see TypeNameTable::intern.
        let id = self.refs.len() as u32;
        self.refs.push(key.clone());
        self.index.insert(key, id);
        id + 1
    }

    /// Number of distinct refs.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// True when nothing was interned.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Consume the table, yielding stripped refs in array order.
    pub fn into_refs(self) -> Vec<ActorRef> {
        self.refs
    }
}
