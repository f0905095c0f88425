//! Integration tests for the dispatcher pipeline.
//!
//! These drive full calls through the registration gate, retry policy,
//! executor and agent cache against scripted transports.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{dispatcher, MockStandalone, Scripted};
use courier_dispatch::constants::{ACCESS_KEY_HEADER, AUTHORIZATION_HEADER, CONTENT_LENGTH_HEADER};
use courier_dispatch::request::{FieldType, ResponseSchema};
use courier_dispatch::{
    CallOptions, DispatchError, DispatchEvent, Method, Operation, RequestDescriptor,
    ResponseData, ResponseShape,
};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_two_transport_failures_then_success() {
    let mock = MockStandalone::with_script(vec![
        Scripted::TransportError,
        Scripted::TransportError,
        Scripted::json(200, json!({"config": []})),
    ]);
    let d = dispatcher(Arc::clone(&mock));

    let outcome = d
        .call(CallOptions::new(Operation::Config, Method::Get).with_shape(ResponseShape::Json))
        .await
        .unwrap();

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.json(), Some(&json!({"config": []})));

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);
    for pair in requests.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_secs(1) && gap < Duration::from_millis(1100));
    }
}

#[tokio::test(start_paused = true)]
async fn test_persistent_transport_failure_stops_at_three() {
    let mock = MockStandalone::with_script(vec![Scripted::TransportError; 5]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .call(CallOptions::new(Operation::Whoami, Method::Get))
        .await
        .unwrap_err();

    assert_eq!(err.status(), 0);
    assert!(matches!(err, DispatchError::Transport { .. }));
    assert_eq!(mock.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_is_retried() {
    let mock = MockStandalone::with_script(vec![Scripted::Hang; 3]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .call(
            CallOptions::new(Operation::Whoami, Method::Get)
                .with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Timeout { timeout_ms: 50 }));
    assert_eq!(mock.count(), 3);
}

#[tokio::test]
async fn test_http_status_not_retried() {
    let mock = MockStandalone::with_script(vec![Scripted::Reply(
        413,
        vec![("retry-after", "60".to_string())],
        Bytes::from_static(b"rate limited"),
    )]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .call(CallOptions::new(Operation::Keys, Method::Put))
        .await
        .unwrap_err();

    assert_eq!(err.status(), 413);
    assert_eq!(err.headers().and_then(|h| h.get("Retry-After")), Some("60"));
    assert_eq!(err.body().map(|b| b.as_ref()), Some(&b"rate limited"[..]));
    match &err {
        DispatchError::HttpStatus { context, .. } => {
            assert_eq!(context, "PUT (REST) https://chat.example.org/v2/keys")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mock.count(), 1);
}

#[tokio::test]
async fn test_access_key_scenario() {
    let mock = MockStandalone::new();
    let d = dispatcher(Arc::clone(&mock));

    d.call(
        CallOptions::new(Operation::Messages, Method::Put)
            .with_suffix("/recipient")
            .with_json(json!({"messages": []}))
            .unauthenticated(Some("c2VjcmV0".to_string())),
    )
    .await
    .unwrap();

    let wire = &mock.requests()[0].wire;
    assert_eq!(wire.headers.get_all(ACCESS_KEY_HEADER).len(), 1);
    assert_eq!(wire.headers.get(ACCESS_KEY_HEADER), Some("c2VjcmV0"));
    assert!(!wire.headers.contains(AUTHORIZATION_HEADER));
}

#[tokio::test]
async fn test_authenticated_call_uses_current_credentials() {
    let mock = MockStandalone::new();
    let d = dispatcher(Arc::clone(&mock));

    d.call(CallOptions::new(Operation::Whoami, Method::Get))
        .await
        .unwrap();

    let wire = &mock.requests()[0].wire;
    assert_eq!(
        wire.headers.get(AUTHORIZATION_HEADER),
        Some("Basic YWxpY2UuMTpodW50ZXIy")
    );
    assert_eq!(
        wire.headers.get("content-type"),
        Some("application/json; charset=utf-8")
    );
}

#[tokio::test]
async fn test_bytes_with_details_round_trip() {
    let mock = MockStandalone::with_script(vec![Scripted::Echo]);
    let d = dispatcher(Arc::clone(&mock));
    let payload: Vec<u8> = (0..=255u8).cycle().take(4099).collect();

    let outcome = d
        .call(
            CallOptions::new(Operation::StorageRead, Method::Put)
                .with_bytes(payload.clone())
                .with_content_type("application/x-protobuf")
                .with_shape(ResponseShape::BytesWithDetails),
        )
        .await
        .unwrap();

    let wire = &mock.requests()[0].wire;
    assert_eq!(wire.headers.get(CONTENT_LENGTH_HEADER), Some("4099"));

    match outcome.data {
        ResponseData::BytesWithDetails(details) => {
            assert_eq!(details.data.len(), payload.len());
            assert_eq!(&details.data[..], &payload[..]);
            assert_eq!(details.content_type.as_deref(), Some("application/x-protobuf"));
            assert_eq!(details.response.status, 200);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_success_is_empty_json() {
    let mock = MockStandalone::with_script(vec![Scripted::Reply(
        200,
        vec![("content-type", "text/html".to_string())],
        Bytes::from_static(b"<html></html>"),
    )]);
    let d = dispatcher(mock);

    let outcome = d
        .call(CallOptions::new(Operation::Profile, Method::Get).with_shape(ResponseShape::Json))
        .await
        .unwrap();

    assert!(matches!(outcome.data, ResponseData::Json(None)));
}

#[tokio::test]
async fn test_malformed_json_is_validation_failure() {
    let mock = MockStandalone::with_script(vec![Scripted::Reply(
        200,
        vec![("content-type", "application/json".to_string())],
        Bytes::from_static(b"{not json"),
    )]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .call(CallOptions::new(Operation::Profile, Method::Get).with_shape(ResponseShape::Json))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Validation { status: 200, .. }));
    assert_eq!(mock.count(), 1);
}

#[tokio::test]
async fn test_schema_mismatch_is_validation_failure() {
    let mock = MockStandalone::with_script(vec![Scripted::json(
        200,
        json!({"uuid": 12, "deviceId": 1}),
    )]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .call(
            CallOptions::new(Operation::Whoami, Method::Get)
                .with_shape(ResponseShape::Json)
                .with_schema(
                    ResponseSchema::new()
                        .field("uuid", FieldType::String)
                        .field("deviceId", FieldType::Number),
                ),
        )
        .await
        .unwrap_err();

    match err {
        DispatchError::Validation {
            status,
            body,
            reason,
            ..
        } => {
            assert_eq!(status, 200);
            assert!(reason.contains("uuid"));
            assert_eq!(
                serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
                json!({"uuid": 12, "deviceId": 1})
            );
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(mock.count(), 1);
}

#[tokio::test]
async fn test_unauthorized_from_service_raises_event() {
    let mock = MockStandalone::with_script(vec![Scripted::status(401), Scripted::status(401)]);
    let d = dispatcher(Arc::clone(&mock));
    let mut events = d.subscribe_events();

    let err = d
        .call(CallOptions::new(Operation::Whoami, Method::Get))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 401);
    assert_eq!(events.try_recv().unwrap(), DispatchEvent::MightBeUnlinked);

    let err = d
        .call(CallOptions::new(Operation::Profile, Method::Get).unauthenticated(None))
        .await
        .unwrap_err();
    assert_eq!(err.status(), 401);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_unauthorized_from_cdn_raises_no_event() {
    let mock = MockStandalone::with_script(vec![Scripted::status(401)]);
    let d = dispatcher(Arc::clone(&mock));
    let mut events = d.subscribe_events();

    let err = d
        .call_url(RequestDescriptor::new(
            Method::Get,
            "https://cdn.example.org/attachments/x",
        ))
        .await
        .unwrap_err();

    assert_eq!(err.status(), 401);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_call() {
    let mock = MockStandalone::with_script(vec![Scripted::Hang]);
    let d = dispatcher(Arc::clone(&mock));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = d
        .call(
            CallOptions::new(Operation::Whoami, Method::Get)
                .with_timeout(Duration::from_secs(60))
                .with_cancel(cancel),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Cancelled));
    assert!(!err.is_retryable());
    assert_eq!(mock.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_agent_reused_within_ttl_and_cycled_after() {
    let mock = MockStandalone::new();
    let d = dispatcher(Arc::clone(&mock));

    for _ in 0..2 {
        d.call(CallOptions::new(Operation::Whoami, Method::Get))
            .await
            .unwrap();
    }
    d.call(CallOptions::new(Operation::Profile, Method::Get).unauthenticated(None))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(301)).await;
    d.call(CallOptions::new(Operation::Whoami, Method::Get))
        .await
        .unwrap();

    let ids: Vec<u64> = mock
        .requests()
        .iter()
        .map(|r| r.agent_id.unwrap())
        .collect();
    assert_eq!(ids[0], ids[1]);
    assert_ne!(ids[0], ids[2]);
    assert_ne!(ids[0], ids[3]);
    assert_ne!(ids[2], ids[3]);
    assert_eq!(d.agent_stats().cycled, 1);
}
