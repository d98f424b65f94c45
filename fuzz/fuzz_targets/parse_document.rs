#![no_main]

use libfuzzer_sys::fuzz_target;
use projdesk_core::model::Document;

// Any accepted document must re-encode and parse back to itself.
fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(doc) = Document::parse(&raw) {
        let encoded = doc.to_json().expect("parsed document re-encodes");
        let reparsed = Document::parse(&encoded).expect("encoded document parses");
        assert_eq!(doc, reparsed);
    }
});
