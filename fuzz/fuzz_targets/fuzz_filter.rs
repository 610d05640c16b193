#![no_main]

use libfuzzer_sys::fuzz_target;
use topic_guard::{filter_recommendation, is_basketball_related, REDIRECT_MESSAGE};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let filtered = filter_recommendation(text);
        // Output is either untouched or the redirect
        assert!(filtered == text || filtered == REDIRECT_MESSAGE);
        if is_basketball_related(text) {
            assert_eq!(filtered, text);
        }
        assert_eq!(filter_recommendation(&filtered), filtered);
    }
});
