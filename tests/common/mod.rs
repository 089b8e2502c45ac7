//! Shared helpers for router-level tests.

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voxserve::config::Config;
use voxserve::{AppState, MockEngineFactory, ModelSpec, SlotManager, create_router};

pub struct TestServer {
    pub router: Router,
    pub slots: Arc<SlotManager>,
}

impl TestServer {
    /// Router over `factory` with nothing loaded.
    pub fn empty(factory: MockEngineFactory, config: Config) -> Self {
        let slots = Arc::new(SlotManager::new(
            Arc::new(factory),
            Duration::from_secs(5),
        ));
        let router = create_router(AppState::new(Arc::clone(&slots), config));
        Self { router, slots }
    }

    /// Router with `base.en` and `espeak-ng` loaded.
    pub async fn loaded(factory: MockEngineFactory, config: Config) -> Self {
        let server = Self::empty(factory, config);
        server
            .slots
            .begin_stt_swap(ModelSpec::new("base.en", "auto"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        server
            .slots
            .begin_tts_swap(ModelSpec::new("espeak-ng", "a"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        server
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert an OpenAI-shaped error and return its body.
pub async fn expect_error(
    response: Response<Body>,
    status: StatusCode,
    code: &str,
) -> serde_json::Value {
    assert_eq!(response.status(), status);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], code, "unexpected error body: {body}");
    body
}

/// Mono sample count of a WAV body.
pub fn wav_sample_count(bytes: &[u8]) -> usize {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(reader.spec().channels, 1);
    reader.len() as usize
}
