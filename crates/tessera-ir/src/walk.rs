//! Recursive operation traversal utilities.
//!
//! Provides `walk_*` functions for traversing nested operations in an
//! `IrContext`, plus helpers that collect operations in a fixed order.

use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into nested regions.
    Advance,
    /// Skip the nested regions of the current operation.
    Skip,
}

/// Walk all operations in a region recursively (pre-order).
pub fn walk_region<B>(
    ctx: &IrContext,
    region: RegionRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &block in &ctx.region(region).blocks {
        walk_block(ctx, block, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk all operations in a block recursively (pre-order).
pub fn walk_block<B>(
    ctx: &IrContext,
    block: BlockRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &op in &ctx.block(block).ops {
        walk_op(ctx, op, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk an operation and its nested regions recursively (pre-order).
pub fn walk_op<B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(op) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &region in &ctx.op(op).regions {
        walk_region(ctx, region, f)?;
    }
    ControlFlow::Continue(())
}

/// Collect every operation nested under `root` in post-order: children
/// before their parent, siblings in block order. `root` itself is excluded.
pub fn nested_ops_post_order(ctx: &IrContext, root: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    for &region in &ctx.op(root).regions {
        collect_region_post_order(ctx, region, &mut out);
    }
    out
}

fn collect_region_post_order(ctx: &IrContext, region: RegionRef, out: &mut Vec<OpRef>) {
    for &block in &ctx.region(region).blocks {
        for &op in &ctx.block(block).ops {
            for &nested in &ctx.op(op).regions {
                collect_region_post_order(ctx, nested, out);
            }
            out.push(op);
        }
    }
}

/// Collect every operation nested under `root` in pre-order, excluding `root`.
pub fn nested_ops_pre_order(ctx: &IrContext, root: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    for &region in &ctx.op(root).regions {
        let _ = walk_region::<()>(ctx, region, &mut |op| {
            out.push(op);
            ControlFlow::Continue(WalkAction::Advance)
        });
    }
    out
}
