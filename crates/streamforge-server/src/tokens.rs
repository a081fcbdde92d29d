//! Publish tokens: `hex(HMAC-SHA256(stream_secret, stream_key))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use streamforge_core::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks per-stream publish tokens.
#[derive(Clone)]
pub struct StreamTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for StreamTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTokens").finish_non_exhaustive()
    }
}

impl StreamTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, stream_key: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("invalid stream secret: {e}")))?;
        mac.update(stream_key.as_bytes());
        Ok(mac)
    }

    /// Token a publisher must present for `stream_key`.
    pub fn create(&self, stream_key: &str) -> Result<String> {
        Ok(hex::encode(self.mac(stream_key)?.finalize().into_bytes()))
    }

    /// Constant-time check of a hex token.
    pub fn verify(&self, stream_key: &str, token: &str) -> bool {
        let Ok(expected) = hex::decode(token.trim()) else {
            return false;
        };
        match self.mac(stream_key) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}
