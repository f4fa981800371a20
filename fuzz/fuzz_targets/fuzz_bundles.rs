#![no_main]

use libfuzzer_sys::fuzz_target;
use macaroon_identity::Macaroon;
use macaroon_identity::serialization::{decode_bundle, encode_bundle};

fuzz_target!(|data: &[u8]| {
    let _ = Macaroon::from_msgpack(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = Macaroon::from_json(s);
        let _ = Macaroon::from_base64(s);

        // Whatever decodes must re-encode and decode to the same bundle
        if let Ok(bundle) = decode_bundle(s) {
            let encoded = encode_bundle(&bundle).expect("decoded bundle must encode");
            let decoded = decode_bundle(&encoded).expect("encoded bundle must decode");
            assert_eq!(bundle, decoded);
        }
    }
});
