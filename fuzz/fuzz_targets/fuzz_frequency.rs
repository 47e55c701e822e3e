#![no_main]

use libfuzzer_sys::fuzz_target;
use socketpush_protocol::Frequency;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(frequency) = s.parse::<Frequency>() {
            assert!(frequency.count() > 0);
            let _ = frequency.as_duration();
            let reparsed: Frequency = frequency.to_string().parse().expect("re-parse");
            assert_eq!(reparsed, frequency);
        }
    }
});
