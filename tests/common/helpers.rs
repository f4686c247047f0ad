use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use bon::bon;
use deemas::{
    RuleManager,
    api::{self, ApiState},
};
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

/// Initialize tracing for tests
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("deemas=trace,api_tests=trace")
        .with_test_writer()
        .try_init();
}

/// Router backed by a throwaway database and default rules directory.
pub struct TestApp {
    _db_file: NamedTempFile,
    _defaults: TempDir,
    pub manager: Arc<RuleManager>,
    state: ApiState,
    router: Router,
}

#[bon]
impl TestApp {
    #[builder]
    pub async fn new(
        #[builder(default)] default_rules: &[(&str, &str)],
        #[builder(default = true)] bootstrap_on_create: bool,
    ) -> Self {
        init_test_tracing();

        let db_file = NamedTempFile::new().unwrap();
        let defaults = TempDir::new().unwrap();
        for (name, body) in default_rules {
            fs::write(defaults.path().join(name), body).unwrap();
        }

        let manager = Arc::new(
            RuleManager::builder()
                .db_path(db_file.path())
                .default_rules_dir(defaults.path())
                .bootstrap_on_create(bootstrap_on_create)
                .build()
                .await
                .unwrap(),
        );
        let state = ApiState::new(Arc::clone(&manager), None);
        let router = api::router(state.clone());

        Self {
            _db_file: db_file,
            _defaults: defaults,
            manager,
            state,
            router,
        }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    /// Send a request and return the status with the body parsed as JSON
    /// (`Value::Null` for an empty or non-JSON body).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn put(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn post(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    pub async fn create_service(&self, name: &str, protocol: &str) {
        let body = serde_json::json!({ "name": name, "protocol": protocol }).to_string();
        let (status, json) = self.post("/services", &body).await;
        assert_eq!(status, StatusCode::CREATED, "create service failed: {}", json);
    }
}
