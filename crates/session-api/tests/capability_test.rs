//! Capability refresh through the capability scheduler

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{test_config, wait_until, MockCapabilityEngine, RecordingListener};
use rvoip_session_api::{CapabilityService, ContactId, ServiceError, SessionEvent};

fn contact(value: &str) -> ContactId {
    ContactId::parse(value).unwrap()
}

#[tokio::test]
async fn test_contact_refresh_reaches_scoped_listener() {
    let engine = Arc::new(MockCapabilityEngine::default());
    let service = CapabilityService::new(&test_config(), engine.clone());
    let everyone = Arc::new(RecordingListener::default());
    let alice_only = Arc::new(RecordingListener::default());
    service.add_listener(everyone.clone());
    service.add_contact_listener("+111", alice_only.clone()).unwrap();

    service.request_contact_capabilities("+111").await.unwrap();
    service.request_contact_capabilities("+222").await.unwrap();
    service.shutdown().await;

    assert_eq!(everyone.events().len(), 2);
    let alice_events = alice_only.events();
    assert_eq!(alice_events.len(), 1);
    match &alice_events[0] {
        SessionEvent::CapabilitiesChanged { contact: who, capabilities } => {
            assert_eq!(who, &contact("+111"));
            assert!(capabilities.image_sharing);
            assert!(capabilities.timestamp > 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_all_skips_failing_contact() {
    let engine = Arc::new(MockCapabilityEngine {
        contacts: vec![contact("+1"), contact("+2"), contact("+3")],
        unreachable: Some(contact("+2")),
        ..Default::default()
    });
    let service = CapabilityService::new(&test_config(), engine.clone());
    let listener = Arc::new(RecordingListener::default());
    service.add_listener(listener.clone());

    service.request_all_contacts_capabilities().await.unwrap();
    assert!(wait_until(|| listener.events().len() == 2).await);
    service.shutdown().await;

    assert_eq!(engine.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_contact_is_rejected() {
    let service = CapabilityService::new(&test_config(), Arc::new(MockCapabilityEngine::default()));
    assert!(matches!(
        service.request_contact_capabilities("not a number").await,
        Err(ServiceError::Validation { .. })
    ));
    assert!(service.add_contact_listener("", Arc::new(RecordingListener::default())).is_err());
}

#[tokio::test]
async fn test_requests_after_shutdown_fail() {
    let service = CapabilityService::new(&test_config(), Arc::new(MockCapabilityEngine::default()));
    service.shutdown().await;
    assert!(matches!(
        service.request_contact_capabilities("+111").await,
        Err(ServiceError::SendFailed { .. })
    ));
    // The failed request does not stay marked as queued
    assert!(matches!(
        service.request_contact_capabilities("+111").await,
        Err(ServiceError::SendFailed { .. })
    ));
}
