//! Integration tests for CDN uploads and downloads.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{dispatcher, dispatcher_with_config, test_config, MockStandalone, Scripted};
use courier_dispatch::constants::{AUTHORIZATION_HEADER, CONTENT_LENGTH_HEADER};
use courier_dispatch::{DispatchConfig, DispatchError, Method, RequestDescriptor, ResponseData};
use futures::StreamExt;
use serde_json::{json, Value};

fn form(key: &str) -> Value {
    json!({
        "key": key,
        "credential": "cred",
        "acl": "private",
        "algorithm": "AWS4-HMAC-SHA256",
        "date": "20261019T000000Z",
        "policy": "cG9saWN5",
        "signature": "sig"
    })
}

fn pack_forms(count: usize) -> Scripted {
    let stickers: Vec<Value> = (0..count).map(|i| form(&format!("stickers/p/{i}"))).collect();
    Scripted::json(
        200,
        json!({"packId": "pack-1", "manifest": form("stickers/p/manifest"), "stickers": stickers}),
    )
}

fn parts(count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(vec![i as u8; 64 + i]))
        .collect()
}

#[tokio::test]
async fn test_upload_pack_posts_manifest_then_parts() {
    let mock = MockStandalone::with_script(vec![pack_forms(3)]);
    let d = dispatcher(Arc::clone(&mock));
    let mut progress = Vec::new();

    let pack_id = d
        .upload_pack(b"manifest-bytes", &parts(3), |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(pack_id, "pack-1");
    assert_eq!(progress.len(), 3);
    assert_eq!(progress.last().map(|p| p.completed), Some(3));

    let requests = mock.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(
        requests[0].wire.url,
        "https://chat.example.org/v1/sticker/pack/form/3"
    );
    let manifest_body = String::from_utf8_lossy(requests[1].wire.body.as_ref().unwrap()).into_owned();
    assert!(manifest_body.contains("name=\"key\"\r\n\r\nstickers/p/manifest\r\n"));

    for upload in &requests[1..] {
        let wire = &upload.wire;
        assert_eq!(wire.url, "https://cdn.example.org/");
        assert!(wire.timeout.is_none());
        assert!(!wire.headers.contains(AUTHORIZATION_HEADER));
        assert!(wire
            .headers
            .get("content-type")
            .unwrap()
            .starts_with("multipart/form-data; boundary="));
        assert_eq!(
            wire.headers.get(CONTENT_LENGTH_HEADER),
            Some(wire.body.as_ref().unwrap().len().to_string().as_str())
        );
    }
}

#[tokio::test]
async fn test_upload_pack_form_count_mismatch() {
    let mock = MockStandalone::with_script(vec![pack_forms(2)]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .upload_pack(b"m", &parts(3), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Validation { .. }));
    assert_eq!(mock.count(), 1);
}

#[tokio::test]
async fn test_upload_pack_part_failure_fails_batch() {
    let mock = MockStandalone::with_script(vec![
        pack_forms(3),
        Scripted::status(200),
        Scripted::status(500),
    ]);
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .upload_pack(b"m", &parts(3), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Batch { .. }));
    assert_eq!(err.status(), 500);
}

#[tokio::test]
async fn test_put_attachment_returns_server_id() {
    let mut reply = form("attachments/att-9");
    reply["attachmentIdString"] = json!("att-9");
    let mock = MockStandalone::with_script(vec![Scripted::json(200, reply)]);
    let d = dispatcher(Arc::clone(&mock));

    let id = d.put_attachment(b"ciphertext").await.unwrap();

    assert_eq!(id, "att-9");
    let requests = mock.requests();
    assert_eq!(
        requests[0].wire.url,
        "https://chat.example.org/v2/attachments/form/upload"
    );
    assert_eq!(requests[1].wire.url, "https://cdn.example.org/attachments/");
}

#[tokio::test]
async fn test_get_attachment_streams_from_numbered_cdn() {
    let mock = MockStandalone::with_script(vec![
        Scripted::Stream(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")], false),
        Scripted::Stream(vec![Bytes::from_static(b"x")], false),
    ]);
    let d = dispatcher(Arc::clone(&mock));

    let mut chunks = d.get_attachment("key123", Some(2)).await.unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = chunks.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"abcd");

    let _ = d.get_attachment("key456", Some(7)).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests[0].wire.url, "https://cdn2.example.org/attachments/key123");
    assert!(requests[0].wire.stream_body);
    assert!(!requests[0].wire.headers.contains(AUTHORIZATION_HEADER));
    assert_eq!(requests[1].wire.url, "https://cdn.example.org/attachments/key456");
}

#[tokio::test(start_paused = true)]
async fn test_get_attachment_stalled_chunk_times_out() {
    let mock = MockStandalone::with_script(vec![Scripted::Stream(
        vec![Bytes::from_static(b"first")],
        true,
    )]);
    let d = dispatcher(mock);

    let mut chunks = d.get_attachment("key123", None).await.unwrap();
    assert_eq!(&chunks.next().await.unwrap().unwrap()[..], b"first");

    let start = tokio::time::Instant::now();
    let err = chunks.next().await.unwrap().unwrap_err();
    assert!(matches!(err, DispatchError::Timeout { timeout_ms: 10_000 }));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(chunks.next().await.is_none());
}

#[tokio::test]
async fn test_fetch_content_goes_through_content_proxy() {
    let mock = MockStandalone::with_script(vec![
        Scripted::status(200),
        Scripted::Reply(
            200,
            vec![("content-type", "text/html".to_string())],
            Bytes::from_static(b"<title>hi</title>"),
        ),
    ]);
    let config = DispatchConfig {
        content_proxy_url: Some("http://proxy.example.org:8080".to_string()),
        ..test_config()
    };
    let d = dispatcher_with_config(config, Arc::clone(&mock));

    d.call_url(
        RequestDescriptor::new(Method::Get, "https://cdn.example.org/x").unauthenticated(None),
    )
    .await
    .unwrap();
    let outcome = d
        .fetch_content("https://news.example.com/story", None)
        .await
        .unwrap();

    match outcome.data {
        ResponseData::BytesWithDetails(details) => {
            assert_eq!(&details.data[..], b"<title>hi</title>");
            assert_eq!(details.content_type.as_deref(), Some("text/html"));
        }
        other => panic!("unexpected {other:?}"),
    }
    let requests = mock.requests();
    assert_eq!(requests[1].wire.url, "https://news.example.com/story");
    assert!(!requests[1].wire.headers.contains(AUTHORIZATION_HEADER));
    assert_ne!(requests[0].agent_id, requests[1].agent_id);
}

#[tokio::test]
async fn test_fetch_content_requires_content_proxy() {
    let mock = MockStandalone::new();
    let d = dispatcher(Arc::clone(&mock));

    let err = d
        .fetch_content("https://news.example.com/story", None)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Config(_)));
    assert_eq!(mock.count(), 0);
}
