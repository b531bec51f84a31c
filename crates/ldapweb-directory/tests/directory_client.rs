//! Integration tests for the public directory client API.
//!
//! Nothing here needs a running directory server: the unreachable-server cases point at a local
//! port nobody listens on.

use chrono::Duration;
use ldapweb_core::{MemorySessionStore, Session, SessionStore};
use ldapweb_directory::{
    build_dn, DirectoryAttribute, DirectoryClient, DirectoryConfig, DirectoryEntry, Error,
    PasswordChange,
};
use secrecy::{ExposeSecret, SecretString};

fn example_config() -> DirectoryConfig {
    DirectoryConfig::new(
        "dir.example.com",
        389,
        "dc=example,dc=com",
        "uid=%s,ou=people,dc=example,dc=com",
        "(uid=%s)",
    )
    .unwrap()
}

fn unreachable_config() -> DirectoryConfig {
    DirectoryConfig::new(
        "127.0.0.1",
        1,
        "dc=example,dc=com",
        "uid=%s,ou=people,dc=example,dc=com",
        "(uid=%s)",
    )
    .unwrap()
    .with_connection_timeout_secs(2)
    .with_operation_timeout_secs(2)
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

#[test]
fn test_example_dn_for_alice() {
    let config = example_config();
    assert_eq!(
        build_dn(config.dn_template(), "alice"),
        "uid=alice,ou=people,dc=example,dc=com"
    );

    let client = DirectoryClient::new(config);
    let credential = client.credential("alice", secret("wonderland"));
    assert_eq!(credential.dn(), "uid=alice,ou=people,dc=example,dc=com");
}

#[tokio::test]
async fn test_mismatched_confirmation_fails_before_any_network_attempt() {
    let client = DirectoryClient::new(unreachable_config());
    let credential = client.credential("alice", secret("wonderland"));
    let change = PasswordChange::new(secret("foo"), secret("bar"));

    let err = client
        .change_user_password(&credential, &change)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    let client = DirectoryClient::new(unreachable_config());
    let credential = client.credential("alice", secret("wonderland"));

    let err = client.lookup_user(&credential).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionError(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert!(!err.to_string().contains("wonderland"));
}

#[test]
fn test_entry_serializes_in_server_order() {
    let entry = DirectoryEntry {
        dn: "uid=alice,ou=people,dc=example,dc=com".to_string(),
        attributes: vec![
            DirectoryAttribute {
                name: "uid".to_string(),
                values: vec!["alice".to_string()],
            },
            DirectoryAttribute {
                name: "mailalias".to_string(),
                values: vec!["z@example.com".to_string(), "a@example.com".to_string()],
            },
        ],
    };

    let json = serde_json::to_string(&entry).unwrap();
    assert_eq!(
        json,
        r#"{"dn":"uid=alice,ou=people,dc=example,dc=com","attributes":[{"name":"uid","values":["alice"]},{"name":"mailalias","values":["z@example.com","a@example.com"]}]}"#
    );
}

#[test]
fn test_session_login_becomes_a_fresh_credential() {
    let client = DirectoryClient::new(example_config());
    let store = MemorySessionStore::new(Duration::minutes(15));
    let id = store
        .create(Session::new("alice", secret("wonderland")))
        .unwrap();

    let session = store.get(&id).unwrap().unwrap();
    let credential = client.credential(
        session.username(),
        secret(session.password().expose_secret()),
    );
    assert_eq!(credential.dn(), "uid=alice,ou=people,dc=example,dc=com");
    assert_eq!(credential.password().expose_secret(), "wonderland");
}
