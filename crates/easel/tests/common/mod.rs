//! Test harness for isolated pipeline execution.
//!
//! Wires an in-memory database, a notification hub, and a generation
//! queue over a mock provider into a full `ReviewService` + `BatchRunner`
//! pair, plus builders for the accounts every scenario needs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::Receiver;

use easel::broadcast::Notification;
use easel::config::GenerationConfig;
use easel::db::user_repo::{self, NewUser, Role, UserRow};
use easel::db::Database;
use easel::generate::ProviderError;
use easel::{
    BatchRunner, Event, GenerationQueue, ImageProvider, NotificationHub, ReviewService,
    SafetyClassifier, SafetyLevel,
};

/// Succeeds instantly with a stable URL per prompt.
pub struct StaticProvider;

#[async_trait]
impl ImageProvider for StaticProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        Ok(format!("https://images.example.com/{}.png", prompt.len()))
    }
}

/// Fails every call, counting attempts.
pub struct BrokenProvider {
    pub calls: AtomicUsize,
}

impl BrokenProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageProvider for BrokenProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Api {
            status: 500,
            message: "provider exploded".to_string(),
        })
    }
}

/// Succeeds after a fixed delay; lets tests act while a job is in flight.
pub struct SlowProvider {
    pub delay: Duration,
}

#[async_trait]
impl ImageProvider for SlowProvider {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("https://images.example.com/slow-{}.png", prompt.len()))
    }
}

/// Deterministic classifier for assertions on safety levels.
pub struct SafeClassifier;

impl SafetyClassifier for SafeClassifier {
    fn classify(&self, _image_ref: &str) -> SafetyLevel {
        SafetyLevel::Safe
    }
}

pub struct TestHarness {
    pub db: Database,
    pub hub: NotificationHub,
    pub service: ReviewService,
    pub batch: BatchRunner,
}

impl TestHarness {
    /// Harness with an instantly-succeeding provider.
    pub fn new() -> Self {
        Self::with_provider(Arc::new(StaticProvider))
    }

    /// Harness over a custom provider. The queue is configured for fast
    /// tests: wide rate limit, no fallback delay.
    pub fn with_provider(provider: Arc<dyn ImageProvider>) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let hub = NotificationHub::new(64);
        let config = GenerationConfig {
            max_concurrent_jobs: 3,
            rate_limit_per_minute: 60_000,
            max_attempts: 3,
            fallback_delay_ms: 0,
        };
        let queue = Arc::new(GenerationQueue::new(provider, &config));
        let service = ReviewService::new(
            db.clone(),
            hub.clone(),
            queue,
            Arc::new(SafeClassifier),
        );
        let batch = BatchRunner::new(service.clone());

        Self {
            db,
            hub,
            service,
            batch,
        }
    }

    pub fn teacher(&self, username: &str, credits: i64) -> UserRow {
        user_repo::create(
            &self.db,
            NewUser {
                username: username.to_string(),
                name: format!("Teacher {}", username),
                role: Role::Teacher,
                classroom: Some("3-2".to_string()),
                teacher_id: None,
                initial_credits: credits,
            },
        )
        .expect("Failed to create teacher")
    }

    pub fn admin(&self, username: &str) -> UserRow {
        user_repo::create(
            &self.db,
            NewUser {
                username: username.to_string(),
                name: format!("Admin {}", username),
                role: Role::Admin,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .expect("Failed to create admin")
    }

    pub fn student_of(&self, teacher_id: &str, username: &str) -> UserRow {
        user_repo::create(
            &self.db,
            NewUser {
                username: username.to_string(),
                name: format!("Student {}", username),
                role: Role::Student,
                classroom: Some("3-2".to_string()),
                teacher_id: Some(teacher_id.to_string()),
                initial_credits: 0,
            },
        )
        .expect("Failed to create student")
    }

    /// Student with no teacher assignment (notifications broadcast).
    pub fn orphan_student(&self, username: &str) -> UserRow {
        user_repo::create(
            &self.db,
            NewUser {
                username: username.to_string(),
                name: format!("Student {}", username),
                role: Role::Student,
                classroom: None,
                teacher_id: None,
                initial_credits: 0,
            },
        )
        .expect("Failed to create student")
    }

    pub fn credits(&self, user_id: &str) -> i64 {
        user_repo::balance(&self.db, user_id)
            .expect("Failed to read balance")
            .expect("User missing")
    }
}

/// Drains the subscription until a `batchProcessingCompleted` event
/// arrives. Panics after five seconds.
pub async fn wait_for_batch_completed(rx: &mut Receiver<Notification>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let notification = rx.recv().await.expect("Notification channel closed");
            if matches!(notification.event, Event::BatchProcessingCompleted { .. }) {
                return notification.event;
            }
        }
    })
    .await
    .expect("Timed out waiting for batch completion")
}

/// Collects everything currently buffered on the subscription.
pub fn drain(rx: &mut Receiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notifications.push(n);
    }
    notifications
}
