//! Test helpers: an in-process application over the in-memory stores

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use blogpress::{
    app_state::AppState,
    routes,
    services::{
        memory::{MemoryContentStore, MemoryJobQueue, MemoryStore},
        pdf::{fonts::FontSet, PdfRenderer},
        result_store::ResultStore,
        worker::{process_next_job, ArtifactWorker},
    },
};

pub struct TestApp {
    pub router: Router,
    pub content: Arc<MemoryContentStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub store: Arc<MemoryStore>,
    pub worker: ArtifactWorker,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

impl TestApp {
    pub fn new(surface_job_failures: bool) -> Self {
        let content = Arc::new(MemoryContentStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let store = Arc::new(MemoryStore::new());
        let results = ResultStore::new(store.clone());

        let state = AppState::new(
            content.clone(),
            results.clone(),
            queue.clone(),
            surface_job_failures,
        );
        let worker = ArtifactWorker::new(
            content.clone(),
            results,
            PdfRenderer::new(FontSet::builtin()),
            Duration::from_secs(600),
            Duration::from_secs(30),
        );

        Self {
            router: routes::router(state, None),
            content,
            queue,
            store,
            worker,
        }
    }

    pub async fn request(&self, method: Method, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri).await
    }

    pub async fn post(&self, uri: &str) -> TestResponse {
        self.request(Method::POST, uri).await
    }

    /// Start a job over HTTP and return its task id.
    pub async fn start(&self, content_id: i64) -> String {
        let response = self.post(&format!("/artifacts/{content_id}/start")).await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json();
        assert_eq!(body["status"], "success");
        body["task_id"].as_str().unwrap().to_string()
    }

    /// Let the worker drain everything currently queued.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while process_next_job(self.queue.as_ref(), &self.worker).await.unwrap() {
            processed += 1;
        }
        processed
    }
}

/// Text of every `Tj` operation in the document, tagged with font and size.
pub fn pdf_text_runs(bytes: &[u8]) -> Vec<(String, f32, Vec<u8>)> {
    use lopdf::content::Content;
    use lopdf::{Document, Object};

    let doc = Document::load_mem(bytes).unwrap();
    let mut runs = Vec::new();
    for page_id in doc.get_pages().into_values() {
        let data = doc.get_page_content(page_id).unwrap();
        let content = Content::decode(&data).unwrap();

        let mut font = String::new();
        let mut size = 0.0;
        for op in content.operations {
            match op.operator.as_str() {
                "Tf" => {
                    font = String::from_utf8(op.operands[0].as_name().unwrap().to_vec()).unwrap();
                    size = op.operands[1].as_float().unwrap();
                }
                "Tj" => {
                    if let Object::String(text, _) = &op.operands[0] {
                        runs.push((font.clone(), size, text.clone()));
                    }
                }
                _ => {}
            }
        }
    }
    runs
}
