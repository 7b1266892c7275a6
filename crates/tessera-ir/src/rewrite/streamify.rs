//! Region wrapping ("streamify").
//!
//! Before general legalization, every maximal run of consecutive operations
//! selected by a wrap target is moved into the single block of a new wrapper
//! operation:
//!
//! ```text
//! %r = stream.streamify %ext0, %ext1 : T {
//!   ^bb0(%chain: stream.chain, %stream: stream.stream, %a: A, %b: B):
//!     ... wrapped ops, in their original order ...
//!     stream.yield %chain, %escaping
//! }
//! ```
//!
//! The block receives an ordering token and a stream handle as leading
//! arguments, followed by one argument per external value the run uses.
//! Values defined in the run and used after it leave through the
//! terminator and become the wrapper's results.

use std::collections::HashSet;

use smallvec::smallvec;

use super::conversion_target::{ConversionTarget, Legality};
use crate::context::{BlockArgData, BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueDef, ValueRef};
use crate::symbol::{OpName, Symbol};
use crate::walk;

/// Names used by the region wrapper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamifyConfig {
    /// Kind of the wrapper operation.
    pub wrapper: OpName,
    /// Kind of the block terminator.
    pub terminator: OpName,
    /// `(dialect, name)` of the ordering token type.
    pub chain_type: (Symbol, Symbol),
    /// `(dialect, name)` of the execution stream type.
    pub stream_type: (Symbol, Symbol),
}

impl Default for StreamifyConfig {
    fn default() -> Self {
        Self {
            wrapper: OpName::from_static("stream", "streamify"),
            terminator: OpName::from_static("stream", "yield"),
            chain_type: (Symbol::new("stream"), Symbol::new("chain")),
            stream_type: (Symbol::new("stream"), Symbol::new("stream")),
        }
    }
}

/// Outcome of a wrapping pre-pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WrapSummary {
    /// Wrapper operations created, in program order.
    pub wrappers: Vec<OpRef>,
    /// Total number of operations moved into wrappers.
    pub wrapped_ops: usize,
}

/// Wraps runs of operations into new single-block wrapper operations.
///
/// An operation is wrapped when the wrap target classifies it as
/// [`Legality::Legal`]; the target's legal set is the "needs wrapping" set.
pub struct RegionWrapper {
    wrap_target: ConversionTarget,
    config: StreamifyConfig,
}

impl RegionWrapper {
    pub fn new(wrap_target: ConversionTarget) -> Self {
        Self {
            wrap_target,
            config: StreamifyConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StreamifyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &StreamifyConfig {
        &self.config
    }

    /// Whether `op` belongs to the wrap set.
    pub fn should_wrap(&self, ctx: &IrContext, op: OpRef) -> bool {
        let name = ctx.op_name(op);
        name != self.config.wrapper
            && name != self.config.terminator
            && self.wrap_target.legality(ctx, op) == Legality::Legal
    }

    /// Wrap every run under `root`. Regions of existing wrapper operations
    /// are left alone.
    #[tracing::instrument(level = "debug", skip_all, fields(root = %root))]
    pub fn run(&self, ctx: &mut IrContext, root: OpRef) -> WrapSummary {
        let mut summary = WrapSummary::default();
        let regions: Vec<RegionRef> = ctx.op(root).regions.to_vec();
        for region in regions {
            self.wrap_region(ctx, region, &mut summary);
        }
        tracing::debug!(
            wrappers = summary.wrappers.len(),
            wrapped_ops = summary.wrapped_ops,
            "streamify finished"
        );
        summary
    }

    fn wrap_region(&self, ctx: &mut IrContext, region: RegionRef, summary: &mut WrapSummary) {
        let blocks: Vec<BlockRef> = ctx.region(region).blocks.to_vec();
        for block in blocks {
            self.wrap_block(ctx, block, summary);
        }
    }

    fn wrap_block(&self, ctx: &mut IrContext, block: BlockRef, summary: &mut WrapSummary) {
        // Single linear scan; runs never reorder anything.
        let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();
        let mut run: Vec<OpRef> = Vec::new();
        for op in ops {
            if self.should_wrap(ctx, op) {
                run.push(op);
                continue;
            }
            if !run.is_empty() {
                self.wrap_run(ctx, block, std::mem::take(&mut run), summary);
            }
            if ctx.op_name(op) != self.config.wrapper {
                let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
                for region in regions {
                    self.wrap_region(ctx, region, summary);
                }
            }
        }
        if !run.is_empty() {
            self.wrap_run(ctx, block, run, summary);
        }
    }

    fn wrap_run(
        &self,
        ctx: &mut IrContext,
        block: BlockRef,
        run: Vec<OpRef>,
        summary: &mut WrapSummary,
    ) {
        // The run's ops and everything nested in them.
        let mut inside_order: Vec<OpRef> = Vec::new();
        for &op in &run {
            inside_order.push(op);
            inside_order.extend(walk::nested_ops_pre_order(ctx, op));
        }
        let inside: HashSet<OpRef> = inside_order.iter().copied().collect();

        // External values, in first-use order.
        let mut externals: Vec<ValueRef> = Vec::new();
        for &user in &inside_order {
            for &v in ctx.op_operands(user) {
                let defined_inside = match ctx.value_def(v) {
                    ValueDef::OpResult(def, _) => inside.contains(&def),
                    ValueDef::BlockArg(b, _) => ctx
                        .block_parent_op(b)
                        .is_some_and(|owner| inside.contains(&owner)),
                };
                if !defined_inside && !externals.contains(&v) {
                    externals.push(v);
                }
            }
        }

        // Values defined in the run that are used after it.
        let mut escaping: Vec<ValueRef> = Vec::new();
        for &op in &run {
            for &v in ctx.op_results(op) {
                if ctx.uses(v).iter().any(|u| !inside.contains(&u.user)) {
                    escaping.push(v);
                }
            }
        }

        let location = ctx.op(run[0]).location;
        let chain_ty = ctx
            .types
            .simple(self.config.chain_type.0, self.config.chain_type.1);
        let stream_ty = ctx
            .types
            .simple(self.config.stream_type.0, self.config.stream_type.1);

        let mut args = vec![BlockArgData::new(chain_ty), BlockArgData::new(stream_ty)];
        args.extend(externals.iter().map(|&v| BlockArgData::new(ctx.value_ty(v))));
        let body = ctx.create_block(BlockData {
            location,
            args,
            ops: smallvec![],
            parent_region: None,
        });
        let region = ctx.create_region(RegionData {
            location,
            blocks: smallvec![body],
            parent_op: None,
        });
        let result_types: Vec<TypeRef> = escaping.iter().map(|&v| ctx.value_ty(v)).collect();
        let wrapper = OperationDataBuilder::named(location, self.config.wrapper)
            .operands(externals.iter().copied())
            .results(result_types)
            .region(region)
            .create(ctx);
        ctx.insert_op_before(block, run[0], wrapper);

        for &op in &run {
            ctx.remove_op_from_block(block, op);
            ctx.push_op(body, op);
        }

        // Inside the run, external values now arrive as block arguments.
        for (i, &external) in externals.iter().enumerate() {
            let arg = ctx.block_arg(body, (i + 2) as u32);
            ctx.replace_uses_where(external, arg, |user| inside.contains(&user));
        }

        // Outside the run, escaping values now come from the wrapper.
        for (i, &value) in escaping.iter().enumerate() {
            let result = ctx.op_result(wrapper, i as u32);
            ctx.replace_uses_where(value, result, |user| !inside.contains(&user));
        }

        let chain = ctx.block_arg(body, 0);
        let terminator = OperationDataBuilder::named(location, self.config.terminator)
            .operand(chain)
            .operands(escaping.iter().copied())
            .create(ctx);
        ctx.push_op(body, terminator);

        tracing::trace!(
            wrapper = %wrapper,
            ops = run.len(),
            externals = externals.len(),
            escaping = escaping.len(),
            "wrapped run"
        );
        summary.wrapped_ops += run.len();
        summary.wrappers.push(wrapper);
    }
}
