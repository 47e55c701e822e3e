#![no_main]

use libfuzzer_sys::fuzz_target;
use socketpush_protocol::{
    AckResponse, CustomEvent, DeliveryReceipt, IncomingMessage, OnlineUsers, StatusUpdate,
};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Server-pushed channel payloads
    let _ = serde_json::from_str::<StatusUpdate>(s);
    let _ = serde_json::from_str::<IncomingMessage>(s);
    let _ = serde_json::from_str::<DeliveryReceipt>(s);
    let _ = serde_json::from_str::<CustomEvent>(s);
    if let Ok(users) = serde_json::from_str::<OnlineUsers>(s) {
        assert_eq!(users.aliases().count(), users.len());
    }

    // Acknowledgment arguments never fail to interpret
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(s) {
        let _ = AckResponse::from_args(std::slice::from_ref(&value));
        if let serde_json::Value::Array(args) = value {
            let _ = AckResponse::from_args(&args);
        }
    }
});
