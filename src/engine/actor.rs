//! Engine Actor - single writer for all engine state
//!
//! Every operator command goes through the actor's mailbox and is applied to
//! the [`Engine`] in arrival order. After each command the actor reconciles
//! the auto-advance timer with the engine's next wake-up and publishes the
//! new snapshot on a watch channel.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scheduler::{AutoAdvanceTimer, Tick};
use super::{Engine, EngineError, OperatorCommand, Wakeup};
use crate::config::defaults;
use crate::types::{EngineSnapshot, ImpactType, MetricsInput, RulePatch};

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

// ============================================================================
// Requests
// ============================================================================

/// Requests for EngineActor
#[derive(Debug)]
enum EngineRequest {
    /// Apply an operator command
    Execute {
        command: OperatorCommand,
        response_tx: Reply<EngineSnapshot>,
    },
    /// Report the next auto-advance wake-up
    PendingWakeup {
        response_tx: oneshot::Sender<Option<Wakeup>>,
    },
}

// ============================================================================
// Actor Handle
// ============================================================================

/// Cloneable handle to the engine actor
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    snapshots: watch::Receiver<EngineSnapshot>,
}

impl EngineHandle {
    /// Apply a command and wait for the resulting snapshot
    pub async fn execute(&self, command: OperatorCommand) -> Result<EngineSnapshot, EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Execute { command, response_tx })
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        response_rx.await.map_err(|_| EngineError::EngineStopped)?
    }

    pub async fn select_unit(&self, cell_id: &str) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::SelectUnit {
            cell_id: cell_id.to_string(),
        })
        .await
    }

    pub async fn approve(&self) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Approve).await
    }

    pub async fn reject(&self) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Reject).await
    }

    /// Rework the focused cell
    pub async fn rework(&self) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Rework { cell_id: None }).await
    }

    /// Rework a named rejected cell, wherever the focus is
    pub async fn rework_cell(&self, cell_id: &str) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Rework {
            cell_id: Some(cell_id.to_string()),
        })
        .await
    }

    pub async fn dismiss_alarm(&self, id: &str) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::DismissAlarm { id: id.to_string() })
            .await
    }

    pub async fn acknowledge_impact(
        &self,
        kind: ImpactType,
        id: &str,
    ) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::AcknowledgeImpact {
            kind,
            id: id.to_string(),
        })
        .await
    }

    pub async fn patch_rule(&self, rule_id: &str, patch: RulePatch) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::PatchRule {
            rule_id: rule_id.to_string(),
            patch,
        })
        .await
    }

    pub async fn toggle_auto_advance(&self, enabled: bool) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::ToggleAutoAdvance { enabled })
            .await
    }

    pub async fn evaluate(&self, metrics: MetricsInput) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Evaluate { metrics }).await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        self.execute(OperatorCommand::Snapshot).await
    }

    pub async fn pending_wakeup(&self) -> Result<Option<Wakeup>, EngineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::PendingWakeup { response_tx })
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        response_rx.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Receiver that sees every published snapshot, including automatic steps
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshots.clone()
    }
}

// ============================================================================
// Engine Actor
// ============================================================================

pub struct EngineActor {
    engine: Engine,
    rx: mpsc::Receiver<EngineRequest>,
    timer: AutoAdvanceTimer,
    ticks: mpsc::Receiver<Tick>,
    snapshots: watch::Sender<EngineSnapshot>,
}

impl EngineActor {
    /// Create a new actor and its handle
    pub fn new(engine: Engine) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(defaults::ENGINE_MAILBOX_CAPACITY);
        let (timer, ticks) = AutoAdvanceTimer::new();
        let (snapshots_tx, snapshots_rx) = watch::channel(engine.snapshot());

        let actor = Self {
            engine,
            rx,
            timer,
            ticks,
            snapshots: snapshots_tx,
        };
        let handle = EngineHandle {
            tx,
            snapshots: snapshots_rx,
        };
        (actor, handle)
    }

    /// Load the rule catalog, then start the actor on the runtime.
    ///
    /// Fails if the catalog cannot be loaded; no command is accepted before
    /// the catalog is available.
    pub async fn spawn(
        engine: Engine,
        cancel_token: CancellationToken,
    ) -> Result<(EngineHandle, JoinHandle<()>), EngineError> {
        engine.catalog().load().await?;
        let (actor, handle) = Self::new(engine);
        let join = tokio::spawn(actor.run(cancel_token));
        Ok((handle, join))
    }

    /// Run until cancelled or every handle is dropped
    pub async fn run(mut self, cancel_token: CancellationToken) {
        info!("EngineActor starting");
        self.reconcile_timer();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("EngineActor shutdown signal received");
                    break;
                }
                request = self.rx.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(tick) = self.ticks.recv() => self.handle_tick(tick),
            }
        }

        self.timer.cancel();
        info!("EngineActor stopped");
    }

    fn handle_request(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Execute { command, response_tx } => {
                let name = command.name();
                let read_only = command.is_read_only();
                let result = self.engine.apply(command);
                match &result {
                    Ok(snapshot) if !read_only => {
                        self.snapshots.send_replace(snapshot.clone());
                    }
                    Ok(_) => {}
                    Err(e) => warn!(command = name, error = %e, "Command rejected"),
                }
                self.reconcile_timer();
                let _ = response_tx.send(result);
            }
            EngineRequest::PendingWakeup { response_tx } => {
                let _ = response_tx.send(self.engine.pending_wakeup());
            }
        }
    }

    fn handle_tick(&mut self, tick: Tick) {
        if !self.timer.accept(&tick) {
            debug!(cell = %tick.cell_id, generation = tick.generation, "Stale auto-advance wake-up discarded");
            return;
        }

        match self.engine.auto_advance_tick(&tick.cell_id) {
            Ok(Some(snapshot)) => {
                self.snapshots.send_replace(snapshot);
            }
            Ok(None) => debug!(cell = %tick.cell_id, "Auto-advance step skipped"),
            Err(e) => warn!(cell = %tick.cell_id, error = %e, "Auto-advance step failed"),
        }
        self.reconcile_timer();
    }

    fn reconcile_timer(&mut self) {
        let wakeup = self.engine.pending_wakeup();
        self.timer.reconcile(wakeup.as_ref());
    }
}

// ============================================================================
// Tests
// ============================================================================
