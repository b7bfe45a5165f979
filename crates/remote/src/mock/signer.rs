use crate::error::{ErrorKind, Result};
use crate::event::{EventTemplate, SignedEvent};
use crate::signer::Signer;
use async_trait::async_trait;

/// Deterministic signer for tests.
///
/// The event id is the BLAKE3 digest of the canonical JSON array
/// `[0, pubkey, created_at, kind, tags, content]`; the "signature" is a
/// keyed digest of that id. Good enough to tell events apart, useless as
/// cryptography.
pub struct MockSigner {
    public_key: String,
    key: [u8; 32],
    available: bool,
}

impl MockSigner {
    pub fn new(public_key: impl Into<String>) -> Self {
        let public_key = public_key.into();
        let key = *blake3::hash(public_key.as_bytes()).as_bytes();
        Self { public_key, key, available: true }
    }

    /// A signer whose key can never be reached.
    pub fn unavailable(public_key: impl Into<String>) -> Self {
        Self { available: false, ..Self::new(public_key) }
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn public_key(&self) -> &str {
        &self.public_key
    }

    async fn sign(&self, template: EventTemplate) -> Result<SignedEvent> {
        if !self.available {
            exn::bail!(ErrorKind::SignerUnavailable("mock signer is locked".to_string()));
        }
        let canonical =
            serde_json::to_vec(&(0, &self.public_key, template.created_at, template.kind, &template.tags, &template.content))
                .map_err(|e| ErrorKind::InvalidEvent(e.to_string()))?;
        let id = blake3::hash(&canonical).to_hex().to_string();
        let sig = blake3::keyed_hash(&self.key, id.as_bytes()).to_hex().to_string();
        Ok(SignedEvent {
            id,
            pubkey: self.public_key.clone(),
            created_at: template.created_at,
            kind: template.kind,
            tags: template.tags,
            content: template.content,
            sig,
        })
    }
}
