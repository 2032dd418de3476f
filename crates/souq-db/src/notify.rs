//! # Notification Port
//!
//! Fire-and-forget events emitted after a transaction commits.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  At-most-once, never transactional.                                    │
//! │                                                                         │
//! │  tx.commit().await?;          ← ledgers are final here                 │
//! │  notifier.notify(&event);     ← strictly after; a lost or failed       │
//! │                                 notification never rolls anything back │
//! │                                 and is never retried                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The delivery channel (push, SMS, webhook) is an external collaborator;
//! this crate only defines the port and two in-process implementations.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use souq_core::{OrderStatus, ReturnStatus};

/// Events the pipeline emits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    OrderCreated {
        order_id: i64,
        code: String,
        user_id: Option<String>,
    },
    OrderStatusChanged {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderCancelled {
        order_id: i64,
        points_refunded: i64,
        warning_issued: bool,
    },
    AccountBlocked {
        user_id: String,
    },
    TokenCreated {
        code: String,
        user_id: String,
        points_value: i64,
    },
    TokenUsed {
        code: String,
        order_id: i64,
    },
    TokenCancelled {
        code: String,
        points_refunded: i64,
    },
    ReturnRequested {
        return_id: i64,
        order_id: i64,
    },
    ReturnResolved {
        return_id: i64,
        order_id: i64,
        status: ReturnStatus,
    },
}

/// Post-commit event sink.
///
/// Implementations must not block the caller for long and must swallow
/// their own failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotifyEvent);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &NotifyEvent) {
        info!(?event, "Pipeline event");
    }
}

/// Test sink that records every event.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, in emission order.
    pub fn events(&self) -> Vec<NotifyEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &NotifyEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
