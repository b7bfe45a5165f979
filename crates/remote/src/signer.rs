//! Event signing capability.

use crate::error::Result;
use crate::event::{EventTemplate, SignedEvent};
use async_trait::async_trait;

/// Produces signed events on behalf of one identity.
///
/// A signer may be backed by a local key or by a remote session; both must
/// satisfy this interface. Implementations must be safe to call from many
/// concurrent uploads. A signer that can only handle one request at a time
/// (e.g. a hardware device) must serialize internally.
///
/// When no signature can be produced, return
/// [`SignerUnavailable`](crate::error::ErrorKind::SignerUnavailable) rather
/// than retrying or prompting: that decision belongs to the caller.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key of the identity events are signed for.
    fn public_key(&self) -> &str;

    /// Sign a template, producing the event identifier and signature.
    async fn sign(&self, template: EventTemplate) -> Result<SignedEvent>;
}
