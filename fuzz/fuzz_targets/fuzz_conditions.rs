#![no_main]

use libfuzzer_sys::fuzz_target;
use macaroon_identity::ConditionKind;
use macaroon_identity::caveat::parse_caveat;
use macaroon_identity::checker::{Checker, StandardChecker};

fuzz_target!(|data: &[u8]| {
    let Ok(condition) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok((name, arg)) = parse_caveat(condition) {
        assert!(!name.contains(' '));
        assert!(condition.starts_with(name));
        assert!(condition.ends_with(arg));
    }

    let _ = ConditionKind::parse(condition);
    let _ = StandardChecker::new().check(condition);
});
