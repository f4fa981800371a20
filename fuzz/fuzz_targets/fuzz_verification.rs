#![no_main]

use libfuzzer_sys::fuzz_target;
use macaroon_identity::Macaroon;
use macaroon_identity::checker::{AcceptAll, StandardChecker};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let split = (data[0] as usize) % data.len();
    let (root_key, rest) = data[1..].split_at(split.min(data.len() - 1));
    if root_key.is_empty() {
        return;
    }

    let mut macaroon = Macaroon::new(root_key, b"fuzz_identifier", None::<String>);
    for chunk in rest.chunks(12) {
        macaroon.add_first_party_caveat(chunk);
    }

    assert!(macaroon.verify(root_key, &AcceptAll, &[]).is_ok());
    let _ = macaroon.verify(root_key, &StandardChecker::new(), &[]);
    let _ = macaroon.verify(b"other_root_key", &AcceptAll, &[]);

    // A third-party caveat keyed from the input, discharged both bound and unbound
    if rest.len() >= 32 {
        let mut caveat_key = [0u8; 32];
        caveat_key.copy_from_slice(&rest[..32]);
        let caveat_id = rest[32..].to_vec();

        if macaroon
            .add_third_party_caveat(&caveat_key, caveat_id.clone(), "http://fuzz")
            .is_ok()
        {
            let discharge = Macaroon::create_discharge(&caveat_key, caveat_id, None::<String>);
            let _ = macaroon.verify(root_key, &AcceptAll, &[discharge.clone()]);

            let bundle = macaroon.prepare_for_request(vec![discharge]);
            let _ = macaroon.verify(root_key, &AcceptAll, &bundle[1..]);
        }
    }

    if let Ok(parsed) = Macaroon::from_msgpack(data) {
        let _ = parsed.verify(root_key, &AcceptAll, &[]);
    }
});
