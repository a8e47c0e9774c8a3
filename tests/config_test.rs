//! Loading config and secrets files and building a gateway from them.

use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde_json::json;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use switchboard::types::Deployment;
use switchboard::{Config, RouteRequest, RoutingPolicy, Secrets, TaskCategory};

const CONFIG: &str = r#"
[router]
default_policy = "privacy_first"
max_attempts = 2

[[providers]]
name = "groq"
kind = "openai_compatible"
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.3-70b-versatile"
api_key_env = "SWITCHBOARD_TEST_KEY_THAT_IS_NEVER_SET"
priority = 10

[[providers]]
name = "ollama"
kind = "ollama"
model = "llama3.2"
"#;

#[test]
fn load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, CONFIG).unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.router.default_policy, RoutingPolicy::PrivacyFirst);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.fallback().max_attempts, 2);
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn malformed_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[router\nmax_attempts = ").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[cfg(unix)]
#[test]
fn world_readable_secrets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    fs::write(&path, "[groq]\napi_key = \"gsk-test\"\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    let err = Secrets::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("insecure permissions"));
}

#[cfg(unix)]
#[test]
fn private_secrets_are_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    fs::write(&path, "[groq]\napi_key = \"gsk-test\"\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

    let secrets = Secrets::load_from(&path).unwrap();
    assert_eq!(secrets.api_key("groq", None).as_deref(), Some("gsk-test"));
}

#[test]
fn provider_without_credential_is_registered_disabled() {
    let config = Config::parse(CONFIG).unwrap();
    let board = config.into_builder(&Secrets::default()).unwrap().build().unwrap();

    let groq = board.registry().get("groq").unwrap();
    assert!(!groq.is_enabled());
    assert_eq!(groq.priority(), 10);

    let ollama = board.registry().get("ollama").unwrap();
    assert!(ollama.is_enabled());
    assert_eq!(ollama.deployment(), Deployment::Local);
    assert_eq!(ollama.priority(), 100);

    let decision = board.route(&RouteRequest::prompt("hi")).unwrap();
    assert_eq!(decision.fallback_order(), vec!["ollama"]);
    assert_eq!(decision.policy, RoutingPolicy::PrivacyFirst);
}

#[test]
fn credential_from_secrets_enables_provider() {
    let config = Config::parse(CONFIG).unwrap();
    let mut secrets = Secrets::default();
    secrets.insert("groq", "gsk-test");

    let board = config.into_builder(&secrets).unwrap().build().unwrap();
    assert!(board.registry().get("groq").unwrap().is_enabled());
}

#[test]
fn task_overrides_replace_builtin_profiles() {
    let config = Config::parse(
        r#"
        [[providers]]
        name = "ollama"
        kind = "ollama"
        model = "llama3.2"

        [tasks.coding]
        preferred = ["ollama"]
        "#,
    )
    .unwrap();
    let board = config.into_builder(&Secrets::default()).unwrap().build().unwrap();

    // The built-in coding profile wants tools and 16k context; the override does not.
    let decision = board
        .route(&RouteRequest::prompt("fix this").task(TaskCategory::Coding))
        .unwrap();
    assert_eq!(decision.fallback_order(), vec!["ollama"]);
    assert!(decision.relaxations.is_empty());
}

#[test]
fn config_without_providers_fails_to_build() {
    let config = Config::parse("").unwrap();
    let err = config.into_builder(&Secrets::default()).unwrap().build().unwrap_err();
    assert!(err.to_string().contains("no providers"));
}

#[tokio::test]
async fn configured_gateway_calls_the_endpoint_with_its_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer gsk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "configured"}, "finish_reason": "stop"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = Config::parse(&format!(
        r#"
        [[providers]]
        name = "remote"
        kind = "openai_compatible"
        base_url = "{}"
        model = "m"
        "#,
        server.uri()
    ))
    .unwrap();
    let mut secrets = Secrets::default();
    secrets.insert("remote", "gsk-test");
    let board = config.into_builder(&secrets).unwrap().build().unwrap();

    let routed = board.generate(&RouteRequest::prompt("hi")).await.unwrap();
    assert_eq!(routed.content(), "configured");
    assert_eq!(routed.provenance.model, "m");
}
