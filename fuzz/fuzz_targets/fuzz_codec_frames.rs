#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use socket_runtime::core::codec::PacketCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Stream of arbitrary frames: stop at the first error, never panic or over-allocate
    let mut codec = PacketCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
