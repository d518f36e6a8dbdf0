//! Cross-component integration tests for the relay core.
//!
//! These tests exercise the authentication gate, connection registry and
//! dispatcher together against the memory preference store, with raw mpsc
//! receivers standing in for socket tasks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use notification_relay::auth::{AuthOutcome, AuthenticationGate, ConnectParams, RejectReason};
use notification_relay::connection_manager::{ConnectionHandle, ConnectionRegistry};
use notification_relay::notification::{
    DispatchRequest, DispatchResult, NotificationDispatcher, NotificationTarget,
};
use notification_relay::preferences::MemoryPreferenceStore;
use notification_relay::websocket::{OutboundMessage, ServerMessage};

struct TestEnvironment {
    registry: Arc<ConnectionRegistry>,
    gate: AuthenticationGate,
    dispatcher: NotificationDispatcher,
    preferences: Arc<MemoryPreferenceStore>,
}

fn create_test_environment() -> TestEnvironment {
    let registry = Arc::new(ConnectionRegistry::new());
    let preferences = Arc::new(MemoryPreferenceStore::new());
    let gate = AuthenticationGate::new(
        registry.clone(),
        preferences.clone(),
        Duration::from_millis(500),
    );
    let dispatcher = NotificationDispatcher::new(registry.clone());

    TestEnvironment {
        registry,
        gate,
        dispatcher,
        preferences,
    }
}

/// A preference document with one active group enabling the given events
fn document_enabling(events: &[&str]) -> serde_json::Value {
    let entries: Vec<_> = events
        .iter()
        .map(|cmd| json!({"cmd": cmd, "active": true}))
        .collect();
    json!({"groups": [{"active": true, "events": entries}]})
}

/// Authenticate a connection, panicking on rejection
async fn connect(
    env: &TestEnvironment,
    user: &str,
    site: &str,
    company: &str,
) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
    let (tx, rx) = mpsc::channel(16);
    match env
        .gate
        .authenticate(ConnectParams::new(user, site, company), tx)
        .await
    {
        AuthOutcome::Accepted(handle) => (handle, rx),
        AuthOutcome::Rejected(reason) => panic!("unexpected rejection: {}", reason),
    }
}

fn request(target: NotificationTarget, cmd: &str, msg: &str) -> DispatchRequest {
    DispatchRequest {
        target,
        event_cmd: cmd.to_string(),
        message: msg.to_string(),
    }
}

fn assert_notification(msg: Option<OutboundMessage>, expected_cmd: &str, expected_msg: &str) {
    match msg {
        Some(OutboundMessage::Raw(ServerMessage::Notification { cmd, msg })) => {
            assert_eq!(cmd, expected_cmd);
            assert_eq!(msg, expected_msg);
        }
        other => panic!("expected notification, got {:?}", other),
    }
}

// =============================================================================
// User-targeted dispatch
// =============================================================================

mod user_dispatch {
    use super::*;

    #[tokio::test]
    async fn test_delivered_when_event_enabled() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (_handle, mut rx) = connect(&env, "u1", "s1", "c1").await;

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::User("u1".to_string()), "ping", "hi"))
            .await;
        assert_eq!(result, DispatchResult::Delivered(1));
        assert_notification(rx.recv().await, "ping", "hi");
    }

    #[tokio::test]
    async fn test_no_targets_when_event_disabled() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (_handle, mut rx) = connect(&env, "u1", "s1", "c1").await;

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::User("u1".to_string()), "pong", "hi"))
            .await;
        assert_eq!(result, DispatchResult::NoTargets);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_targets_for_unknown_user() {
        let env = create_test_environment();

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::User("ghost".to_string()), "ping", "hi"))
            .await;
        assert_eq!(result, DispatchResult::NoTargets);
    }
}

// =============================================================================
// Site- and company-targeted dispatch
// =============================================================================

mod group_dispatch {
    use super::*;

    #[tokio::test]
    async fn test_site_dispatch_respects_preferences() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["alert"]));
        env.preferences.insert("u2", "c1", "s1", document_enabling(&["ping"]));

        let (_h1, mut rx1) = connect(&env, "u1", "s1", "c1").await;
        let (_h2, mut rx2) = connect(&env, "u2", "s1", "c1").await;

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s1".to_string()), "alert", "x"))
            .await;

        // Only u1 enabled "alert"
        assert_eq!(result, DispatchResult::Delivered(1));
        assert_notification(rx1.recv().await, "alert", "x");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_company_dispatch_spans_sites() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["news"]));
        env.preferences.insert("u2", "c1", "s2", document_enabling(&["news"]));

        let (_h1, mut rx1) = connect(&env, "u1", "s1", "c1").await;
        let (_h2, mut rx2) = connect(&env, "u2", "s2", "c1").await;

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Company("c1".to_string()), "news", "x"))
            .await;

        assert_eq!(result, DispatchResult::Delivered(2));
        assert_notification(rx1.recv().await, "news", "x");
        assert_notification(rx2.recv().await, "news", "x");
    }

    #[tokio::test]
    async fn test_unknown_group_ids_are_no_targets() {
        let env = create_test_environment();

        for target in [
            NotificationTarget::Site("nowhere".to_string()),
            NotificationTarget::Company("nowhere".to_string()),
        ] {
            let result = env.dispatcher.dispatch(request(target, "ping", "hi")).await;
            assert_eq!(result, DispatchResult::NoTargets);
        }
    }

    #[tokio::test]
    async fn test_invalid_request_fields() {
        let env = create_test_environment();

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s1".to_string()), "", "x"))
            .await;
        assert_eq!(result, DispatchResult::Invalid);

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s1".to_string()), "ping", ""))
            .await;
        assert_eq!(result, DispatchResult::Invalid);
    }
}

// =============================================================================
// Connection lifecycle
// =============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_disconnect_removes_all_traces() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (handle, _rx) = connect(&env, "u1", "s1", "c1").await;
        env.registry.unregister_connection("u1", handle.id);

        assert!(env.registry.get("u1").is_none());
        assert!(env.registry.site_members("s1").is_empty());
        assert!(env.registry.company_members("c1").is_empty());

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s1".to_string()), "ping", "x"))
            .await;
        assert_eq!(result, DispatchResult::NoTargets);
    }

    #[tokio::test]
    async fn test_duplicate_disconnect_is_noop() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (handle, _rx) = connect(&env, "u1", "s1", "c1").await;

        assert!(env.registry.unregister_connection("u1", handle.id).is_some());
        assert!(env.registry.unregister_connection("u1", handle.id).is_none());
        assert!(env.registry.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_under_new_site_moves_buckets() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));
        env.preferences.insert("u1", "c1", "s2", document_enabling(&["ping"]));

        let (_h1, _rx1) = connect(&env, "u1", "s1", "c1").await;
        let (_h2, mut rx2) = connect(&env, "u1", "s2", "c1").await;

        // The old site bucket no longer lists u1
        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s1".to_string()), "ping", "x"))
            .await;
        assert_eq!(result, DispatchResult::NoTargets);

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::Site("s2".to_string()), "ping", "x"))
            .await;
        assert_eq!(result, DispatchResult::Delivered(1));
        assert_notification(rx2.recv().await, "ping", "x");
    }

    #[tokio::test]
    async fn test_stale_disconnect_does_not_remove_replacement() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (first, _rx1) = connect(&env, "u1", "s1", "c1").await;
        let (_second, mut rx2) = connect(&env, "u1", "s1", "c1").await;

        // The first connection's disconnect fires after the reconnect
        assert!(env.registry.unregister_connection("u1", first.id).is_none());

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::User("u1".to_string()), "ping", "hi"))
            .await;
        assert_eq!(result, DispatchResult::Delivered(1));
        assert_notification(rx2.recv().await, "ping", "hi");
    }

    #[tokio::test]
    async fn test_last_writer_wins_delivery() {
        let env = create_test_environment();
        env.preferences.insert("u1", "c1", "s1", document_enabling(&["ping"]));

        let (_first, mut rx1) = connect(&env, "u1", "s1", "c1").await;
        let (_second, mut rx2) = connect(&env, "u1", "s1", "c1").await;

        env.dispatcher
            .dispatch(request(NotificationTarget::User("u1".to_string()), "ping", "hi"))
            .await;

        // Only the most recent connection receives
        assert!(rx1.try_recv().is_err());
        assert_notification(rx2.recv().await, "ping", "hi");
    }
}

// =============================================================================
// Authentication outcomes
// =============================================================================

mod authentication {
    use super::*;

    #[tokio::test]
    async fn test_missing_params() {
        let env = create_test_environment();

        for params in [
            ConnectParams::new("", "s1", "c1"),
            ConnectParams::new("u1", "", "c1"),
            ConnectParams::new("u1", "s1", ""),
        ] {
            let (tx, _rx) = mpsc::channel(4);
            let outcome = env.gate.authenticate(params, tx).await;
            assert!(matches!(
                outcome,
                AuthOutcome::Rejected(RejectReason::MissingParams)
            ));
        }
        assert!(env.registry.is_empty());
    }

    #[tokio::test]
    async fn test_no_preference_document() {
        let env = create_test_environment();
        let (tx, _rx) = mpsc::channel(4);

        let outcome = env
            .gate
            .authenticate(ConnectParams::new("u1", "s1", "c1"), tx)
            .await;

        assert!(matches!(
            outcome,
            AuthOutcome::Rejected(RejectReason::NoPreferences)
        ));
    }

    #[tokio::test]
    async fn test_zero_enabled_events_is_admitted_but_receives_nothing() {
        let env = create_test_environment();
        // Document exists, but its only group is inactive
        env.preferences.insert(
            "u1",
            "c1",
            "s1",
            json!({"groups": [{"active": false, "events": [{"cmd": "ping", "active": true}]}]}),
        );

        let (handle, mut rx) = connect(&env, "u1", "s1", "c1").await;
        assert!(handle.enabled_events.is_empty());

        let result = env
            .dispatcher
            .dispatch(request(NotificationTarget::User("u1".to_string()), "ping", "hi"))
            .await;
        assert_eq!(result, DispatchResult::NoTargets);
        assert!(rx.try_recv().is_err());
    }
}
