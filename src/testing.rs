//! Test infrastructure: in-memory store, MockProvider, and StaticVerifier.
//!
//! Provides a fully wired store and collaborators with no network or disk,
//! suitable for integration tests that exercise the real request flows.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::api::AppState;
use crate::db::migrations;
use crate::store::SqliteStore;
use crate::traits::{CompletionProvider, CrmStore, NewContact, TokenVerifier, VerifiedIdentity};

/// In-memory SQLite store with the full schema applied. A single connection
/// keeps the in-memory database alive for the pool's lifetime.
pub async fn memory_store() -> SqliteStore {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("in-memory DSN")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("open in-memory pool");
    migrations::migrate(&pool).await.expect("migrate");
    SqliteStore::new(pool)
}

/// Seed a user row so contact operations have an owner on record.
pub async fn seed_user(store: &SqliteStore, uid: &str) {
    let identity = VerifiedIdentity {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        name: Some(format!("User {uid}")),
        picture: None,
    };
    store.upsert_user(&identity).await.expect("seed user");
}

/// Fully wired handler state over an in-memory store, an always-succeeding
/// mock provider, and a single-token verifier for uid "u1".
pub async fn test_state() -> AppState {
    let store = memory_store().await;
    seed_user(&store, "u1").await;
    AppState {
        store: Arc::new(store),
        verifier: Arc::new(StaticVerifier {
            token: "test-token".to_string(),
            uid: "u1".to_string(),
        }),
        provider: Arc::new(MockProvider::new()),
        media: None,
        model: "mock-model".to_string(),
    }
}

pub fn contact_input(name: &str, email: &str, tags: &[&str]) -> NewContact {
    NewContact {
        name: name.to_string(),
        email: email.to_string(),
        phone: "555-0100".to_string(),
        company: "Acme Corp".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        note: String::new(),
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A recorded call to `MockProvider::complete()`.
#[derive(Debug, Clone)]
pub struct MockCompleteCall {
    pub model: String,
    pub messages: Vec<Value>,
}

/// Mock completion provider that returns scripted replies.
pub struct MockProvider {
    replies: Mutex<Vec<String>>,
    pub call_log: Mutex<Vec<MockCompleteCall>>,
}

impl MockProvider {
    /// Create a provider that always returns "Mock reply".
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider with a FIFO queue of scripted replies.
    pub fn with_replies(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// How many times `complete()` was called.
    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }

    /// The system prompt sent on the most recent call.
    pub async fn last_system_prompt(&self) -> Option<String> {
        let log = self.call_log.lock().await;
        let call = log.last()?;
        let first = call.messages.first()?;
        if first["role"] == "system" {
            first["content"].as_str().map(|s| s.to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, model: &str, messages: &[Value]) -> anyhow::Result<String> {
        self.call_log.lock().await.push(MockCompleteCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        });

        let mut replies = self.replies.lock().await;
        if replies.is_empty() {
            Ok("Mock reply".to_string())
        } else {
            Ok(replies.remove(0))
        }
    }
}

/// Provider whose every call fails, for upstream-outage paths.
pub struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    async fn complete(&self, _model: &str, _messages: &[Value]) -> anyhow::Result<String> {
        anyhow::bail!("completion API unavailable")
    }
}

// ---------------------------------------------------------------------------
// StaticVerifier
// ---------------------------------------------------------------------------

/// Verifier that accepts exactly one token and maps it to a fixed uid.
pub struct StaticVerifier {
    pub token: String,
    pub uid: String,
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<VerifiedIdentity> {
        if token != self.token {
            anyhow::bail!("unknown credential");
        }
        Ok(VerifiedIdentity {
            uid: self.uid.clone(),
            email: Some(format!("{}@example.com", self.uid)),
            name: Some("Static User".to_string()),
            picture: None,
        })
    }
}
