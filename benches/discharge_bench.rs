use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use macaroon_identity::authorizer::ThirdPartyAuthorizer;
use macaroon_identity::checker::{AcceptAll, StandardChecker};
use macaroon_identity::engine::{CredentialEngine, MacaroonEngine, StaticLocator, Ticket};
use macaroon_identity::serialization::{decode_bundle, encode_bundle};
use macaroon_identity::{Caveat, CredentialStore, KeyPair, Macaroon, Op};

const IDM: &str = "https://idm.example.com";

fn bench_macaroon_new(c: &mut Criterion) {
    let root_key = b"super_secret_key_for_benchmarking";

    c.bench_function("macaroon_new", |b| {
        b.iter(|| {
            Macaroon::new(
                black_box(root_key),
                black_box(b"identifier-12345"),
                Some("https://example.com"),
            )
        })
    });
}

fn bench_verify_with_caveats(c: &mut Criterion) {
    let root_key = b"super_secret_key_for_benchmarking";
    let mut group = c.benchmark_group("verify_with_caveats");

    for count in [1, 5, 10, 20].iter() {
        let mut m = Macaroon::new(root_key, b"identifier", Some("https://example.com"));
        for i in 0..*count {
            m.add_first_party_caveat(format!("declared attr{i} value"));
        }
        let checker = StandardChecker::new();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _count| {
            b.iter(|| {
                m.verify(black_box(root_key), black_box(&checker), &[]).unwrap();
                black_box(())
            })
        });
    }
    group.finish();
}

fn bench_third_party(c: &mut Criterion) {
    let identity = KeyPair::generate().unwrap();
    let engine = MacaroonEngine::new(
        "https://target.example.com",
        StaticLocator::new().with(IDM, identity.public),
    )
    .unwrap();
    let ops = vec![Op::new("docs", "GET")];
    let caveats = vec![Caveat::third_party(IDM, "is-member-of group1 group2")];

    c.bench_function("mint_with_third_party_caveat", |b| {
        b.iter(|| black_box(engine.mint(black_box(&ops), black_box(&caveats)).unwrap()))
    });

    let primary = engine.mint(&ops, &caveats).unwrap();
    let caveat_id = primary.caveats[0].id.clone();

    c.bench_function("open_ticket", |b| {
        b.iter(|| black_box(Ticket::open(&identity, black_box(&caveat_id)).unwrap()))
    });

    let ticket = Ticket::open(&identity, &caveat_id).unwrap();
    let discharge = Macaroon::create_discharge(&ticket.caveat_key, caveat_id.clone(), Some(IDM));
    let bundle = primary.prepare_for_request(vec![discharge.clone()]);

    let root_key = b"super_secret_key_for_benchmarking";
    let mut own = Macaroon::new(root_key, b"identifier", Some("https://example.com"));
    own.add_third_party_caveat(&ticket.caveat_key, caveat_id.clone(), IDM)
        .unwrap();
    let own_bundle = own.prepare_for_request(vec![discharge]);

    c.bench_function("verify_with_discharge", |b| {
        b.iter(|| {
            own_bundle[0]
                .verify(black_box(root_key), black_box(&AcceptAll), &own_bundle[1..])
                .unwrap();
            black_box(())
        })
    });

    let authorizer = ThirdPartyAuthorizer::new(IDM, vec!["group1".to_string()]);
    let bundles = vec![bundle.clone()];
    c.bench_function("engine_verify_bundle", |b| {
        b.iter(|| black_box(engine.verify(black_box(&bundles), &ops, &authorizer).unwrap()))
    });

    let encoded = encode_bundle(&bundle).unwrap();
    c.bench_function("decode_bundle", |b| {
        b.iter(|| black_box(decode_bundle(black_box(&encoded)).unwrap()))
    });
}

fn bench_credential_store(c: &mut Criterion) {
    let store = CredentialStore::new();
    let rows: Vec<Vec<String>> = (0..1000)
        .map(|i| {
            vec![
                format!("user{i}"),
                format!("pass{i}"),
                format!("group{} group{}", i % 7, i % 13),
            ]
        })
        .collect();
    store.load_from_table(rows).unwrap();
    let required: Vec<String> = (0..5).map(|i| format!("group{}", i * 3)).collect();

    c.bench_function("credentials_check", |b| {
        b.iter(|| black_box(store.check(black_box("user500"), black_box("pass500"))))
    });

    c.bench_function("user_in_any_group", |b| {
        b.iter(|| black_box(store.user_in_any_group(black_box("user500"), &required)))
    });
}

criterion_group!(
    benches,
    bench_macaroon_new,
    bench_verify_with_caveats,
    bench_third_party,
    bench_credential_store,
);

criterion_main!(benches);
