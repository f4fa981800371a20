use macaroon_identity::http::{ErrorEnvelope, MACAROONS_HEADER};
use macaroon_identity::{
    Client, CredentialStore, Error, FormInteractor, IdentityConfig, IdentityService, KeyPair,
    TargetConfig, TargetService,
};
use std::sync::Arc;
use tokio::net::TcpListener;

struct Services {
    identity_url: String,
    target_url: String,
}

async fn start(required_groups: &[&str]) -> Services {
    let store = Arc::new(CredentialStore::new());
    store
        .load_from_table(vec![
            vec!["user1", "pass1", "group1 group3"],
            vec!["user2", "pass2", "group2"],
            vec!["user3", "pass3", "group3"],
        ])
        .unwrap();

    let identity = IdentityService::new(
        IdentityConfig::default(),
        KeyPair::generate().unwrap(),
        store,
    );
    let identity_key = identity.key_pair().public;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let identity_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(identity.serve(listener));

    let target = TargetService::new(
        TargetConfig {
            identity_url: identity_url.clone(),
            required_groups: required_groups.iter().map(|g| g.to_string()).collect(),
            ..TargetConfig::default()
        },
        identity_key,
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(target.serve(listener));

    Services {
        identity_url,
        target_url,
    }
}

fn client(username: &str, password: &str) -> Client {
    Client::new().with_interactor(FormInteractor::new(username, password))
}

#[tokio::test]
async fn test_member_of_required_group_is_served() {
    let services = start(&["group1", "group2"]).await;

    let body = client("user1", "pass1")
        .get(&format!("{}/", services.target_url))
        .await
        .unwrap();
    assert_eq!(body, r#"you requested URL "/""#);

    let body = client("user2", "pass2")
        .get(&format!("{}/docs/1", services.target_url))
        .await
        .unwrap();
    assert_eq!(body, r#"you requested URL "/docs/1""#);
}

#[tokio::test]
async fn test_wrong_password_fails_at_login() {
    let services = start(&["group1", "group2"]).await;

    let result = client("user1", "wrong")
        .get(&format!("{}/", services.target_url))
        .await;
    assert_eq!(result, Err(Error::InvalidCredentials));
}

#[tokio::test]
async fn test_user_outside_required_groups_is_refused() {
    let services = start(&["group1", "group2"]).await;

    let result = client("user3", "pass3")
        .get(&format!("{}/", services.target_url))
        .await;
    assert_eq!(result, Err(Error::GroupMembership));
}

#[tokio::test]
async fn test_no_required_groups_only_needs_login() {
    let services = start(&[]).await;

    let body = client("user3", "pass3")
        .get(&format!("{}/", services.target_url))
        .await
        .unwrap();
    assert_eq!(body, r#"you requested URL "/""#);
}

#[tokio::test]
async fn test_without_interactor_interaction_is_required() {
    let services = start(&["group1"]).await;

    let result = Client::new()
        .get(&format!("{}/", services.target_url))
        .await;
    assert!(matches!(
        result,
        Err(Error::InteractionRequired(interaction)) if interaction.url == "/form"
    ));
}

#[tokio::test]
async fn test_request_without_token_names_identity_service() {
    let services = start(&["group1", "group2"]).await;

    let response = reqwest::get(format!("{}/", services.target_url))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let envelope: ErrorEnvelope = response.json().await.unwrap();
    let info = envelope.info.clone().unwrap();
    assert_eq!(info["macaroon_path"], "/");
    assert_eq!(info["cookie_name_suffix"], "auth");

    let Error::DischargeRequired(required) = envelope.into_error() else {
        panic!("expected discharge required");
    };
    assert_eq!(
        required.caveats[0].location.as_deref(),
        Some(services.identity_url.as_str())
    );
    assert!(required.caveats[0].condition.starts_with("is-member-of "));
}

#[tokio::test]
async fn test_bundle_is_reusable() {
    let services = start(&["group1"]).await;
    let http = reqwest::Client::new();

    let response = http
        .get(format!("{}/docs", services.target_url))
        .send()
        .await
        .unwrap();
    let envelope: ErrorEnvelope = response.json().await.unwrap();
    let Error::DischargeRequired(required) = envelope.into_error() else {
        panic!("expected discharge required");
    };
    let macaroon = required.macaroon.unwrap();

    let bundle = client("user1", "pass1")
        .discharge_all(&macaroon)
        .await
        .unwrap();
    let header = macaroon_identity::serialization::encode_bundle(&bundle).unwrap();

    for path in ["/docs", "/docs/2"] {
        let response = http
            .get(format!("{}{path}", services.target_url))
            .header(MACAROONS_HEADER, &header)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }

    let response = http
        .post(format!("{}/docs", services.target_url))
        .header(MACAROONS_HEADER, &header)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_form_endpoints() {
    let services = start(&[]).await;
    let http = reqwest::Client::new();

    let schema: serde_json::Value = http
        .get(format!("{}/form", services.identity_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(schema["schema"]["password"].is_object());

    let response = http
        .delete(format!("{}/form", services.identity_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
}
