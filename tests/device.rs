//! Device lifecycle tests over in-memory connections

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{FakeConnector, registry};
use rust_netconf::{
    ChannelPolicy, Credentials, Datastore, Device, DeviceConfig, NetconfError, SessionState,
};

fn device(policy: ChannelPolicy, connector: Arc<FakeConnector>) -> Device {
    let mut config = DeviceConfig::new("router1.example.net");
    config.channel_policy = policy;
    Device::new(config, connector, registry())
}

#[tokio::test]
async fn test_connect_requires_credentials() {
    let connector = Arc::new(FakeConnector::new(true));
    let mut device = device(ChannelPolicy::PerSession, Arc::clone(&connector));

    let err = device.connect().await.unwrap_err();
    assert!(matches!(err, NetconfError::Config(_)), "{err:?}");
    assert!(!device.is_connected());
    assert_eq!(connector.connections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_session_before_connect() {
    let mut device = device(ChannelPolicy::PerSession, Arc::new(FakeConnector::new(true)));
    device.add_user(Credentials::new("operator", "secret"));
    let err = device.new_session("main").await.unwrap_err();
    assert!(matches!(err, NetconfError::InvalidState(_)), "{err:?}");
}

#[tokio::test]
async fn test_per_session_lifecycle() {
    let connector = Arc::new(FakeConnector::new(false));
    let mut device = device(ChannelPolicy::PerSession, Arc::clone(&connector));
    device.add_user(Credentials::new("operator", "secret"));
    device.connect().await.unwrap();
    assert!(device.is_connected());

    let main = device.new_session("main").await.unwrap();
    let audit = device.new_session("audit").await.unwrap();
    assert_eq!(connector.connections.load(Ordering::SeqCst), 2);
    assert_ne!(main.session_id(), audit.session_id());
    assert_eq!(device.session_names().collect::<Vec<_>>(), ["audit", "main"]);

    let err = device.new_session("main").await.unwrap_err();
    assert!(matches!(err, NetconfError::InvalidState(_)), "{err:?}");

    assert!(main.lock(Datastore::Running).await.unwrap().is_ok());

    let reply = device.close_session("audit").await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(audit.state(), SessionState::Closed);
    assert!(device.session("audit").is_none());

    let err = device.close_session("audit").await.unwrap_err();
    assert!(matches!(err, NetconfError::UnknownSession(ref name) if name == "audit"), "{err:?}");

    device.close().await.unwrap();
    assert_eq!(main.state(), SessionState::Closed);
    assert!(!device.is_connected());
    assert_eq!(device.session_names().count(), 0);
}

#[tokio::test]
async fn test_shared_connection_multiplexes_sessions() {
    let connector = Arc::new(FakeConnector::new(true));
    let mut device = device(ChannelPolicy::Shared, Arc::clone(&connector));
    device.add_user(Credentials::new("operator", "secret"));
    device.connect().await.unwrap();

    let first = device.new_session("first").await.unwrap();
    let second = device.new_session("second").await.unwrap();
    assert_eq!(connector.connections.load(Ordering::SeqCst), 1);
    assert_eq!(connector.channels.load(Ordering::SeqCst), 2);
    assert_eq!(first.state(), SessionState::Established);
    assert_eq!(second.state(), SessionState::Established);

    device.close().await.unwrap();
    assert_eq!(first.state(), SessionState::Closed);
    assert_eq!(second.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_shared_policy_without_multiplexing() {
    let connector = Arc::new(FakeConnector::new(false));
    let mut device = device(ChannelPolicy::Shared, Arc::clone(&connector));
    device.add_user(Credentials::new("operator", "secret"));
    device.connect().await.unwrap();

    device.new_session("only").await.unwrap();
    let err = device.new_session("another").await.unwrap_err();
    assert!(matches!(err, NetconfError::Transport(_)), "{err:?}");
    assert_eq!(device.session_names().collect::<Vec<_>>(), ["only"]);
    device.close().await.unwrap();
}

#[tokio::test]
async fn test_add_user_replaces_same_name() {
    let mut device = device(ChannelPolicy::PerSession, Arc::new(FakeConnector::new(true)));
    device.add_user(Credentials::new("operator", "old"));
    device.add_user(Credentials::new("auditor", "x"));
    device.add_user(Credentials::new("operator", "new"));

    let debug = format!("{device:?}");
    assert!(debug.contains("operator"));
    assert!(debug.contains("auditor"));
    assert!(!debug.contains("new"), "{debug}");
}
