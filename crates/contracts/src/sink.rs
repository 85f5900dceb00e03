//! Sink trait - Router output interface
//!
//! Defines the abstract delivery capability. A sink may accept several
//! notification types by implementing `Sink<N>` once per type.

use async_trait::async_trait;

use crate::ContractError;

/// Delivery backend for notifications of type `N`
///
/// Implementations must be safe to call from several routers at once.
/// Implementors need `N: Sync` so the delivery future stays `Send`.
#[async_trait]
pub trait Sink<N>: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one notification
    ///
    /// # Errors
    /// Returns the delivery failure (should include context)
    async fn deliver(&self, notification: &N) -> Result<(), ContractError>;
}
