//! HMAC-SHA256 packet signatures.
//!
//! The signature covers the packet's wire encoding with the `s` field removed,
//! so signer and verifier agree on the bytes regardless of who encoded them.

use crate::config::MIN_SIGNING_KEY_LEN;
use crate::core::packet::Packet;
use crate::error::{FrameworkError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies packets with a shared key
#[derive(Clone)]
pub struct PacketSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for PacketSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSigner").finish_non_exhaustive()
    }
}

impl PacketSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self> {
        let key = key.as_ref();
        if key.len() < MIN_SIGNING_KEY_LEN {
            return Err(FrameworkError::ConfigError(format!(
                "Signing key must be at least {MIN_SIGNING_KEY_LEN} bytes"
            )));
        }
        Ok(Self { key: key.to_vec() })
    }

    fn mac(&self, packet: &Packet) -> Result<HmacSha256> {
        let mut unsigned = Vec::with_capacity(128);
        let stripped = Packet {
            signature: None,
            ..packet.clone()
        };
        stripped.encode_into(&mut unsigned)?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| FrameworkError::ConfigError(e.to_string()))?;
        mac.update(&unsigned);
        Ok(mac)
    }

    /// Compute and attach the signature
    pub fn sign(&self, packet: &mut Packet) -> Result<()> {
        let tag = self.mac(packet)?.finalize().into_bytes();
        packet.signature = Some(hex::encode(tag));
        Ok(())
    }

    /// Check the attached signature in constant time
    pub fn verify(&self, packet: &Packet) -> Result<()> {
        let Some(ref claimed) = packet.signature else {
            warn!(header = %packet.header, "Unsigned packet rejected");
            return Err(FrameworkError::SignatureMismatch);
        };

        let claimed = hex::decode(claimed).map_err(|e| {
            warn!(header = %packet.header, error = %e, "Packet signature is not hex");
            FrameworkError::SignatureMismatch
        })?;
        self.mac(packet)?.verify_slice(&claimed).map_err(|_| {
            warn!(header = %packet.header, "Packet signature mismatch");
            FrameworkError::SignatureMismatch
        })
    }
}
