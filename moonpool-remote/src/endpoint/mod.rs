//! The endpoint: state machine, writer, supervision and routing.

mod manager;
mod message;
mod state;
mod supervisor;
mod writer;

pub use manager::EndpointManager;
pub use message::{BatchItem, EndpointMessage};
pub use state::EndpointState;
pub use supervisor::{EndpointHandle, EndpointSupervisor};
pub use writer::{EndpointWriter, Flow};
