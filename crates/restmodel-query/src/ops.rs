//! The deferred operation sequence and its composition into a plan.

use restmodel_core::{Cond, OrderKey, SelectPlan};

/// One queued pipeline operation.
///
/// Builders push these; nothing touches the engine until a terminal
/// composes the queue into a [`SelectPlan`] and replays it there.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    /// Explicit no-op marking "the full set".
    All,
    Filter(Vec<Cond>),
    Exclude(Vec<Cond>),
    OrderBy(Vec<OrderKey>),
    Distinct,
    /// Advisory hint: eager-load these to-one relations.
    SelectRelated(Vec<String>),
    /// Advisory hint: batch-load these to-many relations.
    PrefetchRelated(Vec<String>),
}

/// Fold a queued sequence into a plan, preserving left-to-right order of
/// the filtering steps. A later `OrderBy` replaces an earlier one.
#[must_use]
pub fn compose(ops: Vec<PendingOp>) -> SelectPlan {
    let mut plan = SelectPlan::new();
    for op in ops {
        match op {
            PendingOp::All => {}
            PendingOp::Filter(conds) => plan.steps.push(restmodel_core::PlanStep::Filter(conds)),
            PendingOp::Exclude(conds) => plan.steps.push(restmodel_core::PlanStep::Exclude(conds)),
            PendingOp::OrderBy(keys) => plan.order_by = keys,
            PendingOp::Distinct => plan.distinct = true,
            PendingOp::SelectRelated(fields) => plan.select_related.extend(fields),
            PendingOp::PrefetchRelated(fields) => plan.prefetch_related.extend(fields),
        }
    }
    plan
}
