//! Auto-advance timer
//!
//! At most one wake-up is scheduled at a time, keyed by cell id and due
//! time. Each scheduled wake-up runs as its own task guarded by a
//! `CancellationToken`; a generation counter lets the actor discard a tick
//! that was already in flight when the schedule changed.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Wakeup;

/// Wake-up delivered to the actor when a scheduled delay elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub cell_id: String,
    pub generation: u64,
}

#[derive(Debug)]
struct Scheduled {
    cell_id: String,
    due: DateTime<Utc>,
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct AutoAdvanceTimer {
    tx: mpsc::Sender<Tick>,
    current: Option<Scheduled>,
    generation: u64,
}

impl AutoAdvanceTimer {
    /// Create the timer and the receiver its ticks arrive on.
    pub fn new() -> (Self, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel(16);
        let timer = Self {
            tx,
            current: None,
            generation: 0,
        };
        (timer, rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cell id and due time of the scheduled wake-up
    pub fn scheduled(&self) -> Option<(&str, DateTime<Utc>)> {
        self.current.as_ref().map(|s| (s.cell_id.as_str(), s.due))
    }

    /// Bring the timer in line with the engine's next wake-up. An unchanged
    /// wake-up keeps its running task.
    pub fn reconcile(&mut self, wakeup: Option<&Wakeup>) {
        match (wakeup, &self.current) {
            (Some(w), Some(s)) if s.cell_id == w.cell_id && s.due == w.due => {}
            (Some(w), _) => {
                self.cancel();
                self.schedule(w);
            }
            (None, Some(_)) => self.cancel(),
            (None, None) => {}
        }
    }

    fn schedule(&mut self, wakeup: &Wakeup) {
        self.generation += 1;
        let token = CancellationToken::new();
        let tick = Tick {
            cell_id: wakeup.cell_id.clone(),
            generation: self.generation,
        };

        let tx = self.tx.clone();
        let cancelled = token.clone();
        let delay = wakeup.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(tick).await;
                }
            }
        });

        debug!(
            cell = %wakeup.cell_id,
            generation = self.generation,
            delay_ms = delay.as_millis() as u64,
            "Auto-advance scheduled"
        );
        self.current = Some(Scheduled {
            cell_id: wakeup.cell_id.clone(),
            due: wakeup.due,
            generation: self.generation,
            token,
        });
    }

    /// Cancel the scheduled wake-up, if any.
    pub fn cancel(&mut self) {
        if let Some(scheduled) = self.current.take() {
            scheduled.token.cancel();
            debug!(cell = %scheduled.cell_id, generation = scheduled.generation, "Auto-advance cancelled");
        }
    }

    /// Accept a tick if it belongs to the current schedule. Consumes the
    /// schedule so the next reconcile arms a fresh wake-up.
    pub fn accept(&mut self, tick: &Tick) -> bool {
        match &self.current {
            Some(s) if s.generation == tick.generation && s.cell_id == tick.cell_id => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for AutoAdvanceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wakeup(cell: &str, secs: u64) -> Wakeup {
        Wakeup {
            cell_id: cell.to_string(),
            due: Utc::now() + chrono::Duration::seconds(secs as i64),
            delay: Duration::from_secs(secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_fires_after_delay() {
        let (mut timer, mut rx) = AutoAdvanceTimer::new();
        timer.reconcile(Some(&wakeup("B01-L01", 5)));
        let tick = rx.recv().await.expect("tick");
        assert_eq!(tick.cell_id, "B01-L01");
        assert!(timer.accept(&tick));
        assert!(timer.scheduled().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_tick() {
        let (mut timer, mut rx) = AutoAdvanceTimer::new();
        timer.reconcile(Some(&wakeup("B01-L01", 5)));
        timer.reconcile(None);
        let waited = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
        assert!(waited.is_err(), "cancelled wake-up must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_makes_old_tick_stale() {
        let (mut timer, _rx) = AutoAdvanceTimer::new();
        timer.reconcile(Some(&wakeup("B01-L01", 5)));
        let old = Tick { cell_id: "B01-L01".to_string(), generation: timer.generation() };
        timer.reconcile(Some(&wakeup("B01-L02", 5)));
        assert!(!timer.accept(&old));
        assert_eq!(timer.scheduled().map(|(id, _)| id), Some("B01-L02"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_wakeup_keeps_generation() {
        let (mut timer, _rx) = AutoAdvanceTimer::new();
        let w = wakeup("B01-L01", 5);
        timer.reconcile(Some(&w));
        let generation = timer.generation();
        timer.reconcile(Some(&w));
        assert_eq!(timer.generation(), generation);
    }
}
