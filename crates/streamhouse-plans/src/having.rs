//! HAVING plan stage
//!
//! Filters the batches produced by the window, join and group-by stages with
//! a post-aggregation predicate. The stage is stateless: every call is a pure
//! function of the condition and the input batch.
//!
//! | Input     | Aggregation scope            | Output                          |
//! |-----------|------------------------------|---------------------------------|
//! | `Window`  | every tuple of every source  | whole batch or nothing          |
//! | `Join`    | every join row               | rows satisfying the condition   |
//! | `Grouped` | one group at a time          | groups satisfying the condition |
//! | `Error`   | n/a                          | the same error                  |
//! | `Tuple`   | n/a                          | unsupported batch error         |
//!
//! When nothing survives, [`HavingPlan::apply`] returns `None` rather than an
//! empty container, so downstream stages treat it like "no input yet".

use tracing::{debug, warn};

use crate::context::StageContext;
use crate::error::PlanError;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::parser::parse_having;
use crate::plan::Plan;
use crate::types::{Batch, GroupedTuplesSet, JoinTupleSets, Row, WindowTuplesSet};
use crate::valuer::AggregateScope;
use crate::Result;

/// The HAVING operator.
#[derive(Debug, Clone, Default)]
pub struct HavingPlan {
    condition: Option<Expr>,
}

impl HavingPlan {
    /// A stage filtering by `condition`; `None` makes the stage a passthrough.
    pub fn new(condition: Option<Expr>) -> Self {
        Self { condition }
    }

    /// Build the stage from the HAVING clause of a SQL statement.
    pub fn from_sql(sql: &str) -> Result<Self> {
        Ok(Self::new(parse_having(sql)?))
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    /// Filter one batch.
    ///
    /// Returns the (possibly filtered) batch, `None` when nothing survived or
    /// the context was cancelled mid-batch, or `Batch::Error` wrapping the
    /// first evaluation failure as `run Having error: ...`. An input error
    /// batch is returned untouched.
    pub fn apply(&self, ctx: &StageContext, data: Batch) -> Option<Batch> {
        let Some(condition) = &self.condition else {
            return Some(data);
        };
        let _enter = ctx.span().enter();
        let kind = data.kind();
        let result = match data {
            Batch::Error(err) => return Some(Batch::Error(err)),
            Batch::Window(set) => filter_window(ctx, condition, set),
            Batch::Join(set) => filter_join(ctx, condition, set),
            Batch::Grouped(set) => filter_grouped(ctx, condition, set),
            Batch::Tuple(_) => Err(PlanError::UnsupportedBatch(kind.to_string())),
        };
        match result {
            Ok(output) => {
                debug!(kind, emitted = output.is_some(), "having applied");
                output
            }
            Err(err) => {
                warn!(kind, error = %err, condition = %condition, "having evaluation failed");
                Some(Batch::Error(PlanError::Having(Box::new(err))))
            }
        }
    }
}

impl Plan for HavingPlan {
    fn name(&self) -> &str {
        "having"
    }

    fn apply(&self, ctx: &StageContext, data: Batch) -> Option<Batch> {
        HavingPlan::apply(self, ctx, data)
    }
}

/// The whole window set is one scope; the condition is evaluated once.
fn filter_window(
    ctx: &StageContext,
    condition: &Expr,
    set: WindowTuplesSet,
) -> Result<Option<Batch>> {
    if ctx.is_cancelled() {
        return Ok(None);
    }
    let keep = {
        let scope = AggregateScope::new(set.tuples().collect());
        Evaluator::new(&scope).eval_condition(condition)?
    };
    Ok(keep.then_some(Batch::Window(set)))
}

/// Each join row is evaluated as the representative row, with aggregates
/// reduced over the whole join set.
fn filter_join(ctx: &StageContext, condition: &Expr, set: JoinTupleSets) -> Result<Option<Batch>> {
    let JoinTupleSets(mut rows) = set;
    let mut keep = Vec::with_capacity(rows.len());
    {
        let mut scope = AggregateScope::new(rows.iter().collect());
        for row in &rows {
            if ctx.is_cancelled() {
                return Ok(None);
            }
            scope.set_representative(row);
            keep.push(Evaluator::new(&scope).eval_condition(condition)?);
        }
    }
    let rows_in = rows.len();
    let mut flags = keep.into_iter();
    rows.retain(|_| flags.next().unwrap_or(false));
    debug!(rows_in, rows_out = rows.len(), "having filtered join rows");
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(Batch::Join(JoinTupleSets(rows))))
}

fn filter_grouped(
    ctx: &StageContext,
    condition: &Expr,
    set: GroupedTuplesSet,
) -> Result<Option<Batch>> {
    let groups_in = set.len();
    let filtered = match set {
        GroupedTuplesSet::Tuples(groups) => {
            filter_groups(ctx, condition, groups)?.map(GroupedTuplesSet::Tuples)
        }
        GroupedTuplesSet::Joined(groups) => {
            filter_groups(ctx, condition, groups)?.map(GroupedTuplesSet::Joined)
        }
    };
    let Some(filtered) = filtered else {
        return Ok(None);
    };
    debug!(groups_in, groups_out = filtered.len(), "having filtered groups");
    if filtered.is_empty() {
        return Ok(None);
    }
    Ok(Some(Batch::Grouped(filtered)))
}

/// Evaluate groups in order, each group being its own scope. The first
/// failure aborts the pass; later groups are not evaluated. `None` means the
/// context was cancelled.
fn filter_groups<R: Row>(
    ctx: &StageContext,
    condition: &Expr,
    groups: Vec<Vec<R>>,
) -> Result<Option<Vec<Vec<R>>>> {
    let mut kept = Vec::new();
    for group in groups {
        if ctx.is_cancelled() {
            return Ok(None);
        }
        let keep = {
            let scope = AggregateScope::new(group.iter().collect());
            Evaluator::new(&scope).eval_condition(condition)?
        };
        if keep {
            kept.push(group);
        }
    }
    Ok(Some(kept))
}
