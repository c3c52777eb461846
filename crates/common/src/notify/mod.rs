//! Notification fan-out to department staff
//!
//! Every active department admin and officer gets one in-app notification
//! per event, followed by an email attempt. Email failures are counted and
//! logged per recipient and never undo the in-app notification.

mod mailer;

pub use mailer::{create_mailer, DisabledMailer, HttpMailer, Mailer, MockMailer};

use crate::db::models::{Department, Document, Notification, Role};
use crate::db::{Directory, NotificationStore};
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum NotificationDeliveryError {
    #[error("email transport is not configured")]
    NotConfigured,

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("mail relay request failed: {0}")]
    Transport(String),

    #[error("mail relay rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// What happened to the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutEvent {
    /// Routing confirmed to the department
    Routed,
    /// Forwarded from another department
    Forwarded { from_department: Option<String> },
}

impl FanoutEvent {
    fn kind(&self) -> &'static str {
        match self {
            FanoutEvent::Routed => "document_routed",
            FanoutEvent::Forwarded { .. } => "document_forwarded",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    /// In-app notifications created
    pub notified: usize,
    pub emails_sent: usize,
    pub email_failures: usize,
    /// Emails not attempted because no transport is configured
    pub emails_skipped: usize,
}

pub struct NotificationFanout {
    directory: Arc<dyn Directory>,
    notifications: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
    retention: Duration,
}

impl NotificationFanout {
    pub fn new(
        directory: Arc<dyn Directory>,
        notifications: Arc<dyn NotificationStore>,
        mailer: Arc<dyn Mailer>,
        retention_days: i64,
    ) -> Self {
        Self {
            directory,
            notifications,
            mailer,
            retention: Duration::days(retention_days.max(1)),
        }
    }

    /// Notify every eligible member of `department`. No deduplication:
    /// callers run this once per event.
    #[instrument(skip(self, document, department), fields(document_id = %document.id, department = %department.name))]
    pub async fn dispatch(
        &self,
        document: &Document,
        department: &Department,
        actor_name: &str,
        event: FanoutEvent,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();

        let staff = match self
            .directory
            .list_active_staff(department.id, Role::notification_recipients())
            .await
        {
            Ok(staff) => staff,
            Err(e) => {
                warn!(error = %e, "Failed to load department staff, no notifications sent");
                return report;
            }
        };

        let template = self.template(document, department, actor_name, &event);

        let mut notified = Vec::with_capacity(staff.len());
        for member in staff {
            let notification = Notification {
                id: Uuid::new_v4(),
                recipient_id: member.id,
                ..template.clone()
            };

            if let Err(e) = self.notifications.create_notification(notification).await {
                warn!(recipient_id = %member.id, error = %e, "Failed to create notification");
                continue;
            }
            notified.push(member);
        }
        report.notified = notified.len();

        let deliveries = join_all(
            notified
                .iter()
                .map(|member| self.mailer.send(&member.email, &template.title, &template.message)),
        )
        .await;

        for (member, result) in notified.iter().zip(deliveries) {
            match result {
                Ok(()) => report.emails_sent += 1,
                Err(NotificationDeliveryError::NotConfigured) => report.emails_skipped += 1,
                Err(e) => {
                    warn!(recipient_id = %member.id, error = %e, "Email delivery failed");
                    report.email_failures += 1;
                }
            }
        }

        crate::metrics::record_fanout(report.notified, report.emails_sent, report.email_failures);
        info!(
            notified = report.notified,
            emails_sent = report.emails_sent,
            email_failures = report.email_failures,
            "Notification fan-out complete"
        );
        report
    }

    /// Shared content of one event's notifications; callers fill in the
    /// id and recipient
    fn template(
        &self,
        document: &Document,
        department: &Department,
        actor_name: &str,
        event: &FanoutEvent,
    ) -> Notification {
        let (title, message) = compose(document, department, actor_name, event);
        let now = Utc::now();
        let mut metadata = serde_json::json!({
            "event": event.kind(),
            "reference_number": document.reference_number,
            "department_id": department.id,
            "department": department.name,
            "actor": actor_name,
        });
        if let FanoutEvent::Forwarded { from_department: Some(from) } = event {
            metadata["from_department"] = serde_json::Value::String(from.clone());
        }

        Notification {
            id: Uuid::nil(),
            recipient_id: Uuid::nil(),
            kind: event.kind().to_string(),
            title,
            message,
            document_id: Some(document.id),
            priority: document.ai_priority.unwrap_or(document.urgency),
            is_read: false,
            metadata,
            created_at: now.into(),
            read_at: None,
            expires_at: (now + self.retention).into(),
        }
    }

    /// Drop notifications past their retention window
    pub async fn purge_expired(&self) -> u64 {
        match self.notifications.purge_expired_notifications(Utc::now().into()).await {
            Ok(removed) => {
                debug!(removed, "Purged expired notifications");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Failed to purge expired notifications");
                0
            }
        }
    }
}

fn compose(document: &Document, department: &Department, actor_name: &str, event: &FanoutEvent) -> (String, String) {
    match event {
        FanoutEvent::Routed => (
            format!("New document routed: {}", document.reference_number),
            format!(
                "\"{}\" ({}) has been routed to {} by {}.",
                document.title, document.reference_number, department.name, actor_name
            ),
        ),
        FanoutEvent::Forwarded { from_department } => (
            format!("Document forwarded: {}", document.reference_number),
            format!(
                "\"{}\" ({}) has been forwarded to {}{} by {}.",
                document.title,
                document.reference_number,
                department.name,
                from_department
                    .as_ref()
                    .map(|f| format!(" from {}", f))
                    .unwrap_or_default(),
                actor_name
            ),
        ),
    }
}
