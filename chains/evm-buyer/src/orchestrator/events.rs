use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::watchdog::Heartbeat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Progress snapshot, republished after every sub-step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationStatus {
    pub is_running: bool,
    pub wallets_created: usize,
    pub eth_transferred: usize,
    pub swaps_completed: usize,
    pub tokens_transferred: usize,
    pub current_step: String,
    /// 0 to 100
    pub progress: f64,
}

#[derive(Debug, Clone)]
pub enum OperationEvent {
    Status(OperationStatus),
    Log(LogEvent),
}

/// Fan-out for operation events. Every log is mirrored to tracing under the
/// `operation` target; the channel is optional and bounded, so a slow
/// subscriber slows the run down instead of losing events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<OperationEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<OperationEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn tracing_only() -> Self {
        Self { tx: None }
    }

    async fn send(&self, event: OperationEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is listening
            let _ = tx.send(event).await;
        }
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>) {
        let message = message.into();
        let payload = data.as_ref().map(Value::to_string).unwrap_or_default();
        match level {
            LogLevel::Debug => debug!(target: "operation", data = %payload, "{}", message),
            LogLevel::Info => info!(target: "operation", data = %payload, "{}", message),
            LogLevel::Warn => warn!(target: "operation", data = %payload, "{}", message),
            LogLevel::Error => error!(target: "operation", data = %payload, "{}", message),
            LogLevel::Critical => {
                error!(target: "operation", critical = true, data = %payload, "{}", message)
            }
        }
        self.send(OperationEvent::Log(LogEvent {
            level,
            message,
            data,
        }))
        .await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, None).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message, None).await;
    }

    pub async fn error(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Error, message, data).await;
    }

    pub async fn critical(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Critical, message, data).await;
    }

    pub async fn status(&self, status: OperationStatus) {
        self.send(OperationEvent::Status(status)).await;
    }
}

/// Step accounting for one run. Owns the working status, mirrors it into the
/// shared snapshot and beats the watchdog on every step.
pub(crate) struct Progress {
    status: OperationStatus,
    total_steps: usize,
    done_steps: usize,
    shared: Arc<Mutex<OperationStatus>>,
    events: EventSink,
    heartbeat: Heartbeat,
}

impl Progress {
    /// Four counted steps per wallet: create, fund, swap, consolidate.
    pub const STEPS_PER_WALLET: usize = 4;

    pub fn new(
        wallet_count: usize,
        shared: Arc<Mutex<OperationStatus>>,
        events: EventSink,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            status: OperationStatus {
                is_running: true,
                ..Default::default()
            },
            total_steps: (wallet_count * Self::STEPS_PER_WALLET).max(1),
            done_steps: 0,
            shared,
            events,
            heartbeat,
        }
    }

    pub async fn begin(&mut self, step: impl Into<String>) {
        let step = step.into();
        self.heartbeat.beat(&step);
        self.status.current_step = step;
        self.publish().await;
    }

    pub async fn finish_step(&mut self) {
        self.done_steps = (self.done_steps + 1).min(self.total_steps);
        self.status.progress = self.done_steps as f64 / self.total_steps as f64 * 100.0;
        self.publish().await;
    }

    pub fn wallet_created(&mut self) {
        self.status.wallets_created += 1;
    }

    pub fn eth_transferred(&mut self) {
        self.status.eth_transferred += 1;
    }

    pub fn swap_completed(&mut self) {
        self.status.swaps_completed += 1;
    }

    pub fn tokens_transferred(&mut self) {
        self.status.tokens_transferred += 1;
    }

    /// Final snapshot with `is_running` cleared.
    pub async fn finish(&mut self, step: impl Into<String>) -> OperationStatus {
        self.status.is_running = false;
        self.status.current_step = step.into();
        self.publish().await;
        self.status.clone()
    }

    async fn publish(&self) {
        *self.shared.lock().unwrap_or_else(PoisonError::into_inner) = self.status.clone();
        self.events.status(self.status.clone()).await;
    }
}
