//! The node's Ed25519 identity, persisted in storage.

use sprawl_core::keys::{PRIVATE_KEY, PUBLIC_KEY};
use sprawl_core::{Ed25519PublicKey, Ed25519Signature, Keypair, PeerId};
use sprawl_store::Storage;
use tracing::info;

use crate::error::{Result, ServiceError};

/// The keypair this node signs with, and the peer id derived from it.
#[derive(Debug, Clone)]
pub struct Identity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl Identity {
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = PeerId::from_public_key(&keypair.public_key());
        Self { keypair, peer_id }
    }

    /// Load the stored identity, generating and persisting one on first use.
    ///
    /// A stored public key that does not match the stored seed is an error.
    pub async fn load_or_generate<S: Storage + ?Sized>(storage: &S) -> Result<Self> {
        let seed = storage.get(PRIVATE_KEY).await?;
        let public = storage.get(PUBLIC_KEY).await?;

        if let (Some(seed), Some(public)) = (seed, public) {
            let seed: [u8; 32] = seed
                .as_slice()
                .try_into()
                .map_err(|_| ServiceError::Identity(format!("seed is {} bytes", seed.len())))?;
            let keypair = Keypair::from_seed(&seed);

            if keypair.public_key().as_bytes() != public.as_slice() {
                return Err(ServiceError::Identity(
                    "stored public key does not match the seed".into(),
                ));
            }
            return Ok(Self::from_keypair(keypair));
        }

        let keypair = Keypair::generate();
        storage.put(PRIVATE_KEY, &keypair.seed()).await?;
        storage
            .put(PUBLIC_KEY, keypair.public_key().as_bytes())
            .await?;

        let identity = Self::from_keypair(keypair);
        info!(peer = %identity.peer_id, "generated new identity");
        Ok(identity)
    }

    /// The seed and public key.
    pub fn get_identity(&self) -> ([u8; 32], Ed25519PublicKey) {
        (self.keypair.seed(), self.keypair.public_key())
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn sign(&self, payload: &[u8]) -> Ed25519Signature {
        self.keypair.sign(payload)
    }

    /// Whether `signature` over `payload` was made by `public_key`.
    pub fn verify(public_key: &Ed25519PublicKey, payload: &[u8], signature: &[u8]) -> bool {
        Ed25519Signature::try_from(signature)
            .and_then(|signature| public_key.verify(payload, &signature))
            .is_ok()
    }
}
