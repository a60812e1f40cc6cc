#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use userhub::config::{AppConfig, DirectoryConfig};
use userhub::directory::{DirectoryClient, DirectoryError, DirectoryUser};
use userhub::state::AppState;
use userhub::users::memory::InMemoryUserStore;
use userhub::users::model::{Role, User};
use userhub::users::repo::UserStore;

pub const ADMIN_KEY: &str = "AdminKey000000000001";
pub const USER_KEY: &str = "UserKey0000000000001";
pub const OTHER_KEY: &str = "OtherKey000000000001";

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn json_request(method: &str, uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("request")
}

pub fn get_request(uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).expect("request")
}

/// Directory double: answers with `reply` or, when `None`, a 503 rejection.
pub struct StubDirectory {
    reply: Option<Value>,
    pub seen: Mutex<Vec<DirectoryUser>>,
}

impl StubDirectory {
    pub fn accepting(id: &str) -> Self {
        Self {
            reply: Some(json!({ "id": id })),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DirectoryClient for StubDirectory {
    async fn register_user(&self, user: &DirectoryUser) -> Result<Value, DirectoryError> {
        self.seen.lock().expect("lock").push(user.clone());
        match &self.reply {
            Some(body) => Ok(body.clone()),
            None => Err(DirectoryError::Rejected {
                status: 503,
                body: json!({ "message": "unavailable" }),
            }),
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        db_max_connections: 1,
        host: "127.0.0.1".into(),
        port: 0,
        directory: DirectoryConfig {
            url: None,
            token: String::new(),
            timeout_secs: 1,
        },
    }
}

pub fn user(name: &str, email: &str, api_key: &str, role: Role) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        name: name.into(),
        email: email.into(),
        password_hash: "hash".into(),
        phone_number: "555-0100".into(),
        api_key: api_key.into(),
        role,
        external_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Seeded fixture: one admin and two regular users.
pub struct Fixture {
    pub store: InMemoryUserStore,
    pub directory: Arc<StubDirectory>,
    pub admin: User,
    pub alice: User,
    pub bob: User,
}

impl Fixture {
    pub async fn new(directory: StubDirectory) -> Self {
        let store = InMemoryUserStore::new();
        let admin = store
            .insert(user("Root", "root@example.com", ADMIN_KEY, Role::Admin))
            .await
            .expect("admin");
        let alice = store
            .insert(user("Alice", "alice@example.com", USER_KEY, Role::User))
            .await
            .expect("alice");
        let bob = store
            .insert(user("Bob", "bob@example.com", OTHER_KEY, Role::User))
            .await
            .expect("bob");
        Self {
            store,
            directory: Arc::new(directory),
            admin,
            alice,
            bob,
        }
    }

    pub fn app(&self) -> axum::routing::RouterIntoService<Body, ()> {
        self.app_with_store(Arc::new(self.store.clone()))
    }

    /// Same app, backed by `store` instead of the seeded one.
    pub fn app_with_store(&self, store: Arc<dyn UserStore>) -> axum::routing::RouterIntoService<Body, ()> {
        let state = AppState::from_parts(store, self.directory.clone(), Arc::new(test_config()));
        userhub::app::build_app(state).into_service()
    }
}
