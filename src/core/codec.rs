//! Length-prefixed stream framing for packets.
//!
//! ```text
//! [Length(4, big-endian)] [JSON packet(N)]
//! [Length(4, big-endian)] [Nonce(24)] [Encrypted JSON packet + Tag(16)]   (with a cipher)
//! ```
//! The length is validated against `max_packet_size` before any allocation.

use crate::config::MAX_PACKET_SIZE;
use crate::core::crypto::PacketCipher;
use crate::core::packet::Packet;
use crate::core::signing::PacketSigner;
use crate::error::{FrameworkError, Result};
use crate::utils::pool::BufferPool;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Size of the frame length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Tokio codec carrying [`Packet`]s over a byte stream
#[derive(Clone, Debug)]
pub struct PacketCodec {
    max_packet_size: usize,
    scratch: Option<BufferPool>,
    signer: Option<PacketSigner>,
    cipher: Option<PacketCipher>,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}

impl PacketCodec {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            max_packet_size,
            scratch: None,
            signer: None,
            cipher: None,
        }
    }

    /// Serialize through pooled scratch buffers
    pub fn with_scratch(mut self, pool: BufferPool) -> Self {
        self.scratch = Some(pool);
        self
    }

    /// Sign outbound packets and reject inbound packets with a bad signature
    pub fn with_signer(mut self, signer: PacketSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Encrypt every frame body; frames that fail to decrypt are rejected
    pub fn with_cipher(mut self, cipher: PacketCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    fn write_frame(&self, packet: &Packet, scratch: &mut Vec<u8>, dst: &mut BytesMut) -> Result<()> {
        packet.encode_into(scratch)?;
        let sealed;
        let body: &[u8] = match &self.cipher {
            Some(cipher) => {
                sealed = cipher.seal(scratch)?;
                &sealed[..]
            }
            None => &scratch[..],
        };

        if body.len() > self.max_packet_size {
            return Err(FrameworkError::OversizedPacket(body.len()));
        }
        dst.reserve(LENGTH_PREFIX_LEN + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(body);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_packet_size {
            warn!(len, max = self.max_packet_size, "Oversized frame rejected");
            return Err(FrameworkError::OversizedPacket(len));
        }

        if src.len() < LENGTH_PREFIX_LEN + len {
            src.reserve(LENGTH_PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let frame = src.split_to(len);
        let packet = match &self.cipher {
            Some(cipher) => Packet::decode(&cipher.open(&frame).map_err(|e| {
                warn!(bytes = len, "Frame failed to decrypt");
                e
            })?)?,
            None => Packet::decode(&frame)?,
        };

        if let Some(signer) = &self.signer {
            signer.verify(&packet)?;
        }

        debug!(header = %packet.header, kind = %packet.packet_type, bytes = len, "Frame decoded");
        Ok(Some(packet))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameworkError;

    fn encode(&mut self, mut item: Packet, dst: &mut BytesMut) -> Result<()> {
        if let Some(signer) = &self.signer {
            signer.sign(&mut item)?;
        }

        match self.scratch.as_ref().map(|pool| pool.lease()) {
            Some(Ok(mut buf)) => self.write_frame(&item, &mut buf, dst),
            // Pool exhausted or absent: fall back to a one-off buffer
            _ => self.write_frame(&item, &mut Vec::with_capacity(256), dst),
        }
    }
}
