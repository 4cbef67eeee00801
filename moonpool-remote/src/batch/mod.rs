//! Batch assembly and per-batch interning.

mod assembler;
mod lookup;

pub use assembler::EnvelopeAssembler;
pub use lookup::{ActorRefTable, TypeNameTable};
