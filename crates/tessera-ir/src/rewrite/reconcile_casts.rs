//! Reconciliation of `core.unrealized_conversion_cast` operations.
//!
//! Conversion leaves casts behind wherever a converted producer met an
//! unconverted consumer (or the reverse). Once everything is converted most
//! of them are redundant:
//! 1. identity casts (`T -> T`) are replaced by their input
//! 2. round trips (`A -> B -> A`) are replaced by the original value
//! 3. casts without uses are erased
//!
//! Casts that still bridge two different types survive.

use crate::context::IrContext;
use crate::dialect::core;
use crate::refs::OpRef;
use crate::walk;

/// Counts of what reconciliation removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Casts whose uses were forwarded to an earlier value.
    pub folded: usize,
    /// Casts erased because nothing used them.
    pub erased: usize,
}

/// Reconcile every cast nested under `root`, repeating until nothing changes.
pub fn reconcile_unrealized_casts(ctx: &mut IrContext, root: OpRef) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    loop {
        let casts: Vec<OpRef> = walk::nested_ops_pre_order(ctx, root)
            .into_iter()
            .filter(|&op| core::is_cast(ctx, op))
            .collect();

        let mut changed = false;
        for cast in casts {
            if ctx.is_erased(cast) {
                continue;
            }
            let input = ctx.op_operands(cast)[0];
            let result = ctx.op_result(cast, 0);
            let result_ty = ctx.value_ty(result);

            let forward_to = if ctx.value_ty(input) == result_ty {
                Some(input)
            } else {
                ctx.defining_op(input)
                    .filter(|&def| !ctx.is_erased(def) && core::is_cast(ctx, def))
                    .map(|def| ctx.op_operands(def)[0])
                    .filter(|&origin| ctx.value_ty(origin) == result_ty)
            };

            if let Some(value) = forward_to {
                ctx.replace_all_uses(result, value);
                ctx.erase_op(cast);
                summary.folded += 1;
                changed = true;
            } else if !ctx.has_uses(result) {
                ctx.erase_op(cast);
                summary.erased += 1;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
    tracing::debug!(
        folded = summary.folded,
        erased = summary.erased,
        "reconciled unrealized casts"
    );
    summary
}
