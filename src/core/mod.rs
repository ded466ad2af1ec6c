//! # Core Protocol Components
//!
//! Packet model, wire encoding, stream framing, packet signatures and encryption.
//!
//! ## Components
//! - **Packet**: header/body/type/key message unit and its JSON projection
//! - **Codec**: Tokio codec for length-prefixed framing over byte streams
//! - **Signing**: optional HMAC-SHA256 integrity check
//! - **Crypto**: optional XChaCha20-Poly1305 frame encryption
//!
//! ## Wire Format
//! ```text
//! [Length(4)] {"h": header, "b": body, "t": type-code, "k": key?, "s": signature?}
//! ```
//!
//! ## Security
//! - Maximum packet size: 16MB by default (prevents memory exhaustion)
//! - Length validation before allocation

pub mod codec;
pub mod crypto;
pub mod packet;
pub mod signing;
