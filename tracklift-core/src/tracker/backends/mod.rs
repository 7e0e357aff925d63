//! Concrete tracker backends built on [`GenericBackend`](super::generic::GenericBackend)

pub mod sp;
pub mod yus;

pub use sp::SpBackend;
pub use yus::YusBackend;
