use core_logic::WatchdogConfig;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::events::{EventSink, LogLevel};

#[derive(Debug)]
struct Beat {
    step: String,
    at: Instant,
    seq: u64,
}

/// Last sign of life from the running operation.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    inner: Arc<Mutex<Beat>>,
}

impl Heartbeat {
    pub fn new(step: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Beat {
                step: step.to_string(),
                at: Instant::now(),
                seq: 0,
            })),
        }
    }

    pub fn beat(&self, step: &str) {
        let mut beat = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        beat.step.clear();
        beat.step.push_str(step);
        beat.at = Instant::now();
        beat.seq += 1;
    }

    fn snapshot(&self) -> (String, Duration, u64) {
        let beat = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        (beat.step.clone(), beat.at.elapsed(), beat.seq)
    }
}

/// Background stall detector. Warns once per stalled step and escalates once
/// past twice the threshold. Never cancels anything; the task is aborted when
/// the guard drops.
#[derive(Debug)]
pub struct Watchdog {
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub fn start(config: WatchdogConfig, heartbeat: Heartbeat, events: EventSink) -> Self {
        let handle = tokio::spawn(async move {
            let threshold = config.stall_threshold();
            let mut ticker = tokio::time::interval(config.check_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut warned: Option<u64> = None;
            let mut escalated: Option<u64> = None;

            loop {
                ticker.tick().await;
                let (step, elapsed, seq) = heartbeat.snapshot();

                if elapsed >= threshold && warned != Some(seq) {
                    warned = Some(seq);
                    events
                        .log(
                            LogLevel::Warn,
                            format!(
                                "No progress for {}s during '{}'",
                                elapsed.as_secs(),
                                step
                            ),
                            Some(json!({ "step": step, "elapsed_ms": elapsed.as_millis() as u64 })),
                        )
                        .await;
                }

                if elapsed >= threshold * 2 && escalated != Some(seq) {
                    escalated = Some(seq);
                    events
                        .critical(
                            format!(
                                "Operation appears stuck: no progress for {}s during '{}'",
                                elapsed.as_secs(),
                                step
                            ),
                            Some(json!({ "step": step, "elapsed_ms": elapsed.as_millis() as u64 })),
                        )
                        .await;
                }
            }
        });

        Self { handle }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::events::OperationEvent;
    use tokio::sync::mpsc;

    fn fast() -> WatchdogConfig {
        WatchdogConfig {
            check_interval_ms: 10,
            stall_threshold_ms: 50,
        }
    }

    async fn next_log(rx: &mut mpsc::Receiver<OperationEvent>) -> (LogLevel, String) {
        loop {
            match rx.recv().await {
                Some(OperationEvent::Log(log)) => return (log.level, log.message),
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_warns_then_escalates_once() {
        let (tx, mut rx) = mpsc::channel(16);
        let heartbeat = Heartbeat::new("Swapping wallet 1/3");
        let _watchdog = Watchdog::start(fast(), heartbeat, EventSink::new(tx));

        let (level, message) = next_log(&mut rx).await;
        assert_eq!(level, LogLevel::Warn);
        assert!(message.contains("Swapping wallet 1/3"));

        let (level, _) = next_log(&mut rx).await;
        assert_eq!(level, LogLevel::Critical);

        // Nothing more for the same stalled step
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_quiet_while_beating() {
        let (tx, mut rx) = mpsc::channel(16);
        let heartbeat = Heartbeat::new("start");
        let _watchdog = Watchdog::start(fast(), heartbeat.clone(), EventSink::new(tx));

        for i in 0..10 {
            heartbeat.beat(&format!("step {}", i));
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_stops_the_task() {
        let (tx, mut rx) = mpsc::channel(16);
        let watchdog = Watchdog::start(fast(), Heartbeat::new("start"), EventSink::new(tx));
        drop(watchdog);

        // Aborted task drops its sender, closing the channel
        assert!(rx.recv().await.is_none());
    }
}
