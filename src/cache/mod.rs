//! Namespace-scoped key/value cache with TTL and bulk-namespace invalidation.
//! Advisory only: every reader falls back to storage on miss or error. After
//! `unhealthy_after_errors` consecutive errors the cache self-marks unhealthy
//! and stops issuing calls until a manual or timed reset.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    PipelineSteps,
    DocumentClasses,
    AvailableModels,
    SystemSettings,
    OcrConfig,
}

impl Namespace {
    fn key_prefix(&self) -> &'static str {
        match self {
            Namespace::PipelineSteps => "pipeline_steps",
            Namespace::DocumentClasses => "document_classes",
            Namespace::AvailableModels => "available_models",
            Namespace::SystemSettings => "system_settings",
            Namespace::OcrConfig => "ocr_config",
        }
    }
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

pub struct Cache {
    key_prefix: String,
    default_ttl: Duration,
    store: Mutex<HashMap<String, Entry>>,
    consecutive_errors: AtomicU32,
    unhealthy_after_errors: u32,
}

impl Cache {
    pub fn new(key_prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            default_ttl,
            store: Mutex::new(HashMap::new()),
            consecutive_errors: AtomicU32::new(0),
            unhealthy_after_errors: 5,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_errors.load(Ordering::SeqCst) < self.unhealthy_after_errors
    }

    fn full_key(&self, namespace: Namespace, key: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, namespace.key_prefix(), key)
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Option<serde_json::Value> {
        if !self.is_healthy() {
            return None;
        }
        let full_key = self.full_key(namespace, key);
        let store = self.store.lock().unwrap();
        store.get(&full_key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn set(&self, namespace: Namespace, key: &str, value: serde_json::Value) {
        self.set_with_ttl(namespace, key, value, self.default_ttl)
    }

    pub fn set_with_ttl(&self, namespace: Namespace, key: &str, value: serde_json::Value, ttl: Duration) {
        let full_key = self.full_key(namespace, key);
        let mut store = self.store.lock().unwrap();
        store.insert(
            full_key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Invalidates every key in a namespace; admin writes call this after
    /// mutating the corresponding table.
    pub fn invalidate_namespace(&self, namespace: Namespace) {
        let prefix = format!("{}:{}:", self.key_prefix, namespace.key_prefix());
        let mut store = self.store.lock().unwrap();
        store.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn record_error(&self) {
        self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    pub fn reset_health(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }
}
