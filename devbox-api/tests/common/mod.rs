//! Common test utilities and helpers for devbox-api tests
//!
//! The control plane is the in-memory mock from devbox-proxmox; Caddy is a
//! small axum app holding the route table in memory.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{Request, Response, StatusCode};
use axum::routing::put;
use axum::{Json, Router};
use devbox_api::{create_app, AppState};
use devbox_core::{AddressTemplate, User, UserDirectory};
use devbox_orchestrator::ReconcileSettings;
use devbox_proxmox::mock::MockControlPlane;
use devbox_router::{CaddyConfig, RouteManager};
use serde_json::Value;

pub type RouteTable = Arc<Mutex<Vec<Value>>>;

/// Serve a minimal Caddy admin API for `routes` and return its base URL.
pub async fn spawn_fake_caddy(routes: RouteTable) -> String {
    async fn list(State(routes): State<RouteTable>) -> Json<Value> {
        Json(Value::Array(routes.lock().unwrap().clone()))
    }

    async fn insert(
        State(routes): State<RouteTable>,
        Path((_server, index)): Path<(String, usize)>,
        body: Bytes,
    ) -> StatusCode {
        let mut routes = routes.lock().unwrap();
        let route: Value = serde_json::from_slice(&body).unwrap();
        let duplicate = route["@id"].as_str().is_some_and(|id| position(&routes, id).is_some());
        if index > routes.len() || duplicate {
            return StatusCode::BAD_REQUEST;
        }
        routes.insert(index, route);
        StatusCode::OK
    }

    async fn replace(
        State(routes): State<RouteTable>,
        Path((_server, index)): Path<(String, usize)>,
        body: Bytes,
    ) -> StatusCode {
        match routes.lock().unwrap().get_mut(index) {
            Some(slot) => {
                *slot = serde_json::from_slice(&body).unwrap();
                StatusCode::OK
            }
            None => StatusCode::BAD_REQUEST,
        }
    }

    async fn remove(
        State(routes): State<RouteTable>,
        Path((_server, index)): Path<(String, usize)>,
    ) -> StatusCode {
        let mut routes = routes.lock().unwrap();
        if index >= routes.len() {
            return StatusCode::BAD_REQUEST;
        }
        routes.remove(index);
        StatusCode::OK
    }

    fn position(routes: &[Value], id: &str) -> Option<usize> {
        routes.iter().position(|r| r["@id"] == id)
    }

    async fn replace_by_id(State(routes): State<RouteTable>, Path(id): Path<String>, body: Bytes) -> StatusCode {
        let mut routes = routes.lock().unwrap();
        match position(&routes, &id) {
            Some(index) => {
                routes[index] = serde_json::from_slice(&body).unwrap();
                StatusCode::OK
            }
            None => StatusCode::NOT_FOUND,
        }
    }

    async fn remove_by_id(State(routes): State<RouteTable>, Path(id): Path<String>) -> StatusCode {
        let mut routes = routes.lock().unwrap();
        match position(&routes, &id) {
            Some(index) => {
                routes.remove(index);
                StatusCode::OK
            }
            None => StatusCode::NOT_FOUND,
        }
    }

    let app = Router::new()
        .route(
            "/config/apps/http/servers/{server}/routes",
            axum::routing::get(list),
        )
        .route(
            "/config/apps/http/servers/{server}/routes/{index}",
            put(insert).patch(replace).delete(remove),
        )
        .route("/id/{id}", axum::routing::patch(replace_by_id).delete(remove_by_id))
        .with_state(routes);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn test_users() -> UserDirectory {
    UserDirectory::from_users(vec![User::new("alice", 42), User::new("bob", 43)]).unwrap()
}

pub fn test_settings() -> ReconcileSettings {
    let mut settings = ReconcileSettings::new("pve", 9000, AddressTemplate::new("10.0.0.%d/24").unwrap());
    settings.max_wait = Duration::from_secs(10);
    settings.poll_interval = Duration::from_millis(10);
    settings
}

pub struct TestApp {
    pub app: Router,
    pub control_plane: Arc<MockControlPlane>,
    pub routes: RouteTable,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(test_settings(), Duration::from_secs(30)).await
    }

    pub async fn with_settings(settings: ReconcileSettings, request_timeout: Duration) -> Self {
        let control_plane = Arc::new(MockControlPlane::new());
        let routes: RouteTable = Arc::default();
        let caddy_url = spawn_fake_caddy(routes.clone()).await;
        let route_manager = RouteManager::new(CaddyConfig::new(caddy_url, "code.example.com")).unwrap();

        let state = AppState::new(
            control_plane.clone(),
            settings,
            route_manager,
            test_users(),
            request_timeout,
        );

        Self {
            app: create_app(state),
            control_plane,
            routes,
        }
    }

    /// Send a request to the API
    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        self.send_request(build("GET", uri, user)).await
    }

    pub async fn post(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        self.send_request(build("POST", uri, user)).await
    }
}

fn build(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-devbox-user", user);
    }
    builder.body(Body::empty()).unwrap()
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body<T>(response: Response<Body>) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
