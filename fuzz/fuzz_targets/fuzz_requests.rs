#![no_main]

use libfuzzer_sys::fuzz_target;
use macaroon_identity::http::{DischargeRequest, ErrorEnvelope};
use macaroon_identity::login::parse_login;

fuzz_target!(|data: &[u8]| {
    let _ = parse_login(data);
    let _ = serde_json::from_slice::<DischargeRequest>(data);

    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(data) {
        let _ = envelope.into_error();
    }
});
