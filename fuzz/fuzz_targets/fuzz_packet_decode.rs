#![no_main]

use libfuzzer_sys::fuzz_target;
use socket_runtime::Packet;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic; anything accepted must re-encode
    if let Ok(packet) = Packet::decode(data) {
        let encoded = packet.encode().expect("decoded packet re-encodes");
        let _ = Packet::decode(&encoded);
    }
});
