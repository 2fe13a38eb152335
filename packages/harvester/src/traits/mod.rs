//! Trait abstractions at the library's seams.

pub mod catalog;
pub mod persistence;
pub mod transport;

pub use catalog::QueryCatalog;
pub use persistence::SessionStore;
pub use transport::Transport;
