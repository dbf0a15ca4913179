//! HTTP API through the router, volumes mocked

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{config, MockVolumes};
use fastkv::coordinator::http::create_router;
use fastkv::coordinator::{MemStore, RecordStore};
use fastkv::{Coordinator, CoordinatorConfig};
use std::sync::Arc;
use tower::ServiceExt;

fn setup(cfg: CoordinatorConfig) -> (Arc<Coordinator<MockVolumes>>, Router, MockVolumes) {
    let volumes = MockVolumes::default();
    let store: Arc<dyn RecordStore> = Arc::new(MemStore::new());
    let coord = Arc::new(Coordinator::new(cfg, store, volumes.clone()).unwrap());
    let router = create_router(coord.clone());
    (coord, router, volumes)
}

async fn send(router: &Router, method: &str, uri: &str, body: &'static str) -> axum::response::Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

fn location(response: &axum::response::Response) -> String {
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_put_then_get_redirects() {
    let (coord, router, volumes) = setup(config(&["v1", "v2", "v3", "v4"]));

    let put = send(&router, "PUT", "/a", "hello").await;
    assert_eq!(put.status(), StatusCode::CREATED);
    assert_eq!(volumes.stores(), 2);

    let record = coord.get_record(b"a").unwrap();
    assert_eq!(record.locations.len(), 2);
    let first = &record.locations[0];
    let path = coord.placement().path(b"a", first);
    assert_eq!(volumes.get(first, &path).unwrap(), "hello");

    let get = send(&router, "GET", "/a", "").await;
    assert_eq!(get.status(), StatusCode::FOUND);
    assert_eq!(location(&get), format!("http://{}{}", first, path));

    let head = send(&router, "HEAD", "/a", "").await;
    assert_eq!(head.status(), StatusCode::FOUND);

    let again = send(&router, "PUT", "/a", "other").await;
    assert_eq!(again.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_missing() {
    let (_, router, _) = setup(config(&["v1", "v2"]));
    let get = send(&router, "GET", "/nope", "").await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);

    let cfg = CoordinatorConfig {
        fallback: Some("fb:8080".into()),
        ..config(&["v1", "v2"])
    };
    let (_, router, _) = setup(cfg);
    let get = send(&router, "GET", "/nope", "").await;
    assert_eq!(get.status(), StatusCode::FOUND);
    assert_eq!(location(&get), "http://fb:8080/nope");
}

#[tokio::test]
async fn test_get_skips_missing_replica() {
    let (coord, router, volumes) = setup(config(&["v1", "v2", "v3"]));
    send(&router, "PUT", "/k", "v").await;

    let record = coord.get_record(b"k").unwrap();
    volumes.take_down(&record.locations[0]);

    let get = send(&router, "GET", "/k", "").await;
    assert_eq!(get.status(), StatusCode::FOUND);
    let second = &record.locations[1];
    assert_eq!(
        location(&get),
        format!("http://{}{}", second, coord.placement().path(b"k", second))
    );
}

#[tokio::test]
async fn test_put_rejections() {
    let (coord, router, volumes) = setup(config(&["v1", "v2"]));

    let empty = send(&router, "PUT", "/e", "").await;
    assert_eq!(empty.status(), StatusCode::LENGTH_REQUIRED);

    assert!(coord.lock_key(b"busy"));
    let busy = send(&router, "PUT", "/busy", "x").await;
    assert_eq!(busy.status(), StatusCode::CONFLICT);
    coord.unlock_key(b"busy");

    volumes.take_down("v2");
    let down = send(&router, "PUT", "/d", "x").await;
    assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(coord.get_record(b"d").unwrap().is_hard());
    assert!(!coord.locks().is_locked(b"d"));
}

#[tokio::test]
async fn test_unlink_then_delete() {
    let (coord, router, volumes) = setup(config(&["v1", "v2", "v3"]));
    send(&router, "PUT", "/a", "hello").await;

    let unlink = send(&router, "UNLINK", "/a", "").await;
    assert_eq!(unlink.status(), StatusCode::NO_CONTENT);
    assert_eq!(send(&router, "GET", "/a", "").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(send(&router, "UNLINK", "/a", "").await.status(), StatusCode::NOT_FOUND);
    // data stays until DELETE
    assert_eq!(volumes.removes(), 0);

    let delete = send(&router, "DELETE", "/a", "").await;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);
    assert_eq!(volumes.removes(), 2);
    assert!(coord.store().get(b"a").unwrap().is_none());

    assert_eq!(send(&router, "DELETE", "/a", "").await.status(), StatusCode::NOT_FOUND);
    // the key can be written again
    assert_eq!(send(&router, "PUT", "/a", "again").await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_protect_requires_unlink() {
    let cfg = CoordinatorConfig {
        protect: true,
        ..config(&["v1", "v2"])
    };
    let (_, router, _) = setup(cfg);
    send(&router, "PUT", "/p", "value").await;

    assert_eq!(send(&router, "DELETE", "/p", "").await.status(), StatusCode::FORBIDDEN);
    assert_eq!(send(&router, "UNLINK", "/p", "").await.status(), StatusCode::NO_CONTENT);
    assert_eq!(send(&router, "DELETE", "/p", "").await.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health() {
    let (_, router, _) = setup(config(&["v1", "v2"]));
    send(&router, "PUT", "/h", "value").await;

    let response = send(&router, "GET", "/health", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["replicas"], 2);
    assert_eq!(json["lock_kind"], "readwrite");
    assert_eq!(json["filter"]["keys"], 1);
}

#[tokio::test]
async fn test_unsupported_method() {
    let (_, router, _) = setup(config(&["v1", "v2"]));
    let response = send(&router, "POST", "/a", "x").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
