//! Event descriptors handed to the outbound notification channel
//!
//! The core only decides *what* happened and *who* should hear about it.
//! Delivery belongs to whatever implements [`NotificationSink`].
use chrono::Utc;
use parking_lot::Mutex;

use crate::application::ApplicationStatus;
use crate::period::Period;
use crate::target::Target;
use crate::timestamp::TimeStamp;
use crate::user::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub role: Role,
}

impl Recipient {
    pub fn new(user_id: String, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub application_id: String,
    pub app_no: String,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor_id: String,
    pub note: String,
    pub at: TimeStamp<Utc>,
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetEvent {
    pub assigned_to: String,
    pub role: Role,
    pub period: Period,
    pub target_value: f64,
}

impl From<&Target> for TargetEvent {
    fn from(target: &Target) -> Self {
        Self {
            assigned_to: target.assigned_to.clone(),
            role: target.role,
            period: target.period,
            target_value: target.target_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StatusChanged(TransitionEvent),
    TargetAssigned(TargetEvent),
}

impl Notification {
    pub fn recipient_ids(&self) -> Vec<&str> {
        match self {
            Notification::StatusChanged(event) => event
                .recipients
                .iter()
                .map(|recipient| recipient.user_id.as_str())
                .collect(),
            Notification::TargetAssigned(event) => vec![event.assigned_to.as_str()],
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::StatusChanged(event) => format!(
                "Application {} moved from {} to {}",
                event.app_no, event.from, event.to
            ),
            Notification::TargetAssigned(event) => format!(
                "Your {} target for {} is {:.2}",
                event.role, event.period, event.target_value
            ),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes every notification to the tracing output.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            recipients = ?notification.recipient_ids(),
            message = %notification.message(),
            "notification"
        );
        Ok(())
    }
}

/// Keeps notifications in memory; handy for callers' tests.
#[derive(Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        self.delivered.lock().push(notification.clone());
        Ok(())
    }
}
