//! Plan stages and their composition
//!
//! A rule's processing pipeline is a sequence of [`Plan`] stages, each
//! consuming one [`Batch`] and emitting at most one. Stages are chained with
//! [`PlanChain`] or run as tasks via [`crate::pipeline::spawn_stage`].

use crate::context::StageContext;
use crate::types::Batch;

// ---------------------------------------------------------------------------
// Plan trait
// ---------------------------------------------------------------------------

/// A synchronous processing stage over batches.
pub trait Plan: Send + Sync {
    /// Stage name used in logs.
    fn name(&self) -> &str;

    /// Process one batch. `None` means nothing is emitted downstream.
    fn apply(&self, ctx: &StageContext, data: Batch) -> Option<Batch>;
}

// ---------------------------------------------------------------------------
// PlanChain
// ---------------------------------------------------------------------------

/// Chains multiple plans together into one stage.
#[derive(Default)]
pub struct PlanChain {
    plans: Vec<Box<dyn Plan>>,
}

impl PlanChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plan to the end of the chain.
    pub fn add(mut self, plan: Box<dyn Plan>) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl Plan for PlanChain {
    fn name(&self) -> &str {
        "chain"
    }

    /// Run the batch through every plan in order, stopping at the first plan
    /// that emits nothing.
    fn apply(&self, ctx: &StageContext, data: Batch) -> Option<Batch> {
        self.plans
            .iter()
            .try_fold(data, |current, plan| plan.apply(ctx, current))
    }
}
