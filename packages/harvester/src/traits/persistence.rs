//! Session persistence seam.
//!
//! Serialization format and storage location belong to the application; the
//! library only needs a session loaded at run start and offered back at run
//! end.

use async_trait::async_trait;

use crate::types::session::SessionState;

/// Boxed error type for storage backends.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Loads and saves one identity's session between runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the persisted session.
    async fn load(&self) -> Result<SessionState, StoreError>;

    /// Persist the session after a run. Implementations decide what (if
    /// anything) of the credential set they are willing to write out.
    async fn save(&self, session: &SessionState) -> Result<(), StoreError>;
}
