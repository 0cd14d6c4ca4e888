/*!
 * Append-only payment audit trail.
 *
 * Every payment-relevant outcome lands in `payment_logs`. Writes go through
 * [`PaymentAuditor`], which never propagates a storage failure to the caller.
 * Contact details must be passed through [`mask_email`] / [`mask_phone`] first.
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::payment_log::{ActiveModel as PaymentLogActiveModel, Entity as PaymentLogEntity};
use crate::repositories::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentEvent {
    PaymentCreated,
    PaymentFailed,
    WebhookReceived,
    WebhookDuplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLogEntry {
    pub id: Uuid,
    pub event: PaymentEvent,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentLogEntry {
    pub fn new(event: PaymentEvent, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            data,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait PaymentAuditLog: Send + Sync {
    async fn append(&self, entry: PaymentLogEntry) -> Result<(), RepositoryError>;
}

/// Audit log stored in the `payment_logs` table
#[derive(Debug, Clone)]
pub struct SeaOrmPaymentAuditLog {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmPaymentAuditLog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentAuditLog for SeaOrmPaymentAuditLog {
    async fn append(&self, entry: PaymentLogEntry) -> Result<(), RepositoryError> {
        let row = PaymentLogActiveModel {
            id: Set(entry.id),
            event: Set(entry.event.to_string()),
            data: Set(entry.data),
            created_at: Set(entry.created_at),
        };
        PaymentLogEntity::insert(row)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentAuditLog {
    entries: Arc<RwLock<Vec<PaymentLogEntry>>>,
}

impl InMemoryPaymentAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<PaymentLogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn events(&self, event: PaymentEvent) -> Vec<PaymentLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PaymentAuditLog for InMemoryPaymentAuditLog {
    async fn append(&self, entry: PaymentLogEntry) -> Result<(), RepositoryError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Fire-and-log front for a [`PaymentAuditLog`].
#[derive(Clone)]
pub struct PaymentAuditor {
    log: Arc<dyn PaymentAuditLog>,
}

impl PaymentAuditor {
    pub fn new(log: Arc<dyn PaymentAuditLog>) -> Self {
        Self { log }
    }

    pub async fn record(&self, event: PaymentEvent, data: Value) {
        counter!("checkout.payment_events", 1, "event" => event.to_string());
        info!(event = %event, data = %data, "payment event");

        if let Err(err) = self.log.append(PaymentLogEntry::new(event, data)).await {
            warn!(event = %event, error = %err, "failed to persist payment event");
        }
    }
}

/// Keeps the first character of the local part and the whole domain: `j***@example.com`.
pub fn mask_email(email: &str) -> String {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Replaces every character except the last four with `*`.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.trim().chars().collect();
    // Too short to reveal anything.
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let hidden = chars.len() - 4;
    let mut out = "*".repeat(hidden);
    out.extend(&chars[hidden..]);
    out
}
