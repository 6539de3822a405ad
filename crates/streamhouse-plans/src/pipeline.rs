//! Stage runner
//!
//! Runs a [`Plan`] as its own Tokio task between two channels. The task reads
//! batches from an inbound [`mpsc::Receiver`], applies the plan and forwards
//! whatever it emits to a bounded outbound channel, so a slow consumer applies
//! backpressure to the stage. The task is controlled via a
//! [`tokio::sync::watch`] channel owned by the returned [`StageHandle`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::context::StageContext;
use crate::error::PlanError;
use crate::plan::Plan;
use crate::types::Batch;
use crate::Result;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for one running stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Rule the stage belongs to; used as the logging span.
    pub rule_id: String,
    /// Capacity of the outbound channel.
    pub buffer_size: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            rule_id: "default".to_string(),
            buffer_size: 1024,
        }
    }
}

impl StageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rule_id.trim().is_empty() {
            return Err(PlanError::InvalidConfig(
                "rule_id must not be empty".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(PlanError::InvalidConfig(
                "buffer_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stage statistics
// ---------------------------------------------------------------------------

/// Runtime statistics for a running stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    /// Batches received from upstream.
    pub batches_in: u64,
    /// Batches forwarded downstream, error batches included.
    pub batches_out: u64,
    /// Error batches forwarded downstream.
    pub errors: u64,
    /// When the stage started (ms since epoch).
    pub started_at: i64,
    /// Timestamp of the most recent batch (ms since epoch).
    pub last_active: i64,
}

impl Default for StageStats {
    fn default() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            batches_in: 0,
            batches_out: 0,
            errors: 0,
            started_at: now,
            last_active: now,
        }
    }
}

// ---------------------------------------------------------------------------
// StageHandle (returned to the caller)
// ---------------------------------------------------------------------------

/// Handle for a running stage.
#[derive(Debug)]
pub struct StageHandle {
    /// Name of the plan being run.
    pub stage: String,
    /// Batches emitted by the stage.
    pub output: mpsc::Receiver<Batch>,
    cancel_tx: watch::Sender<bool>,
    shared_stats: Arc<Mutex<StageStats>>,
    task: JoinHandle<()>,
}

impl StageHandle {
    /// Stop the stage. A batch being filtered when the signal arrives is
    /// abandoned without output.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Retrieve a snapshot of the stage statistics.
    pub async fn stats(&self) -> StageStats {
        self.shared_stats.lock().await.clone()
    }

    /// Wait for the stage task to finish and return its final statistics.
    /// Output not yet received is discarded.
    pub async fn join(self) -> Result<StageStats> {
        let StageHandle {
            output,
            cancel_tx,
            shared_stats,
            task,
            ..
        } = self;
        drop(output);
        task.await
            .map_err(|e| PlanError::StreamProcessingError(format!("stage task failed: {e}")))?;
        drop(cancel_tx);
        let stats = shared_stats.lock().await.clone();
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// spawn_stage
// ---------------------------------------------------------------------------

/// Run `plan` as a task reading from `input`.
///
/// The task ends when `input` is closed, the output receiver is dropped, or
/// the handle is cancelled. Results of `None` are not forwarded.
pub fn spawn_stage(
    plan: Arc<dyn Plan>,
    config: StageConfig,
    mut input: mpsc::Receiver<Batch>,
) -> Result<StageHandle> {
    config.validate()?;

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    let (output_tx, output) = mpsc::channel(config.buffer_size);
    let shared_stats = Arc::new(Mutex::new(StageStats::default()));
    let stage = plan.name().to_string();

    let ctx = StageContext::new(&config.rule_id).with_cancellation(cancel_rx.clone());
    let task_stats = shared_stats.clone();
    let task_stage = stage.clone();
    let task = tokio::spawn(async move {
        info!(rule = %ctx.rule_id(), stage = %task_stage, "stage started");
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => {
                    info!(rule = %ctx.rule_id(), stage = %task_stage, "stage cancelled");
                    break;
                }
                batch = input.recv() => match batch {
                    Some(batch) => batch,
                    None => {
                        debug!(rule = %ctx.rule_id(), stage = %task_stage, "input closed");
                        break;
                    }
                },
            };

            {
                let mut stats = task_stats.lock().await;
                stats.batches_in += 1;
                stats.last_active = chrono::Utc::now().timestamp_millis();
            }

            let Some(out) = plan.apply(&ctx, batch) else {
                continue;
            };
            let is_error = out.is_error();

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => {
                    info!(rule = %ctx.rule_id(), stage = %task_stage, "stage cancelled");
                    break;
                }
                sent = output_tx.send(out) => {
                    if sent.is_err() {
                        debug!(rule = %ctx.rule_id(), stage = %task_stage, "output closed");
                        break;
                    }
                }
            }

            let mut stats = task_stats.lock().await;
            stats.batches_out += 1;
            if is_error {
                stats.errors += 1;
            }
        }
        info!(rule = %ctx.rule_id(), stage = %task_stage, "stage stopped");
    });

    info!(rule = %config.rule_id, stage = %stage, buffer_size = config.buffer_size, "stage spawned");

    Ok(StageHandle {
        stage,
        output,
        cancel_tx,
        shared_stats,
        task,
    })
}

/// Resolves once cancellation is signalled; never resolves if the sender is
/// gone without signalling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
