#![no_main]

use libfuzzer_sys::fuzz_target;
use socketpush_protocol::{EnginePacket, SocketPacket};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Whole Engine.IO frames
        if let Ok(packet) = EnginePacket::decode(text) {
            // Anything we accept must be re-encodable
            let encoded = packet.encode().expect("encode decoded packet");
            let _ = EnginePacket::decode(&encoded);
        }

        // Bare Socket.IO packets
        if let Ok(packet) = SocketPacket::decode(text) {
            let _ = packet.namespace();
            let _ = packet.encode();
        }
    }
});
