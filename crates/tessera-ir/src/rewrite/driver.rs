//! The conversion driver: worklist-based partial/full legalization.
//!
//! One call to [`ConversionDriver::apply`] runs inside a single outer
//! transaction. Every pattern attempt runs inside an inner one, so a pattern
//! declining to match leaves no trace. On failure the outer transaction is
//! rolled back and the caller sees the graph exactly as it was.
//!
//! Each pass visits the pending operations under the root in post-order
//! (nested operations before their parents):
//! - a converged operation leaves the worklist;
//! - an illegal one is offered to the matching patterns, highest benefit
//!   first, and the first one that applies wins;
//! - operations introduced by a rewrite, and the ancestors of the rewritten
//!   operation, are (re)queued.
//!
//! A pass that neither rewrites nor retires anything is a stall.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::conversion_target::ConversionTarget;
use super::error::{ConversionError, ConversionResult};
use super::pattern::{PatternSet, RewriteResult};
use super::reconcile_casts::reconcile_unrealized_casts;
use super::rewriter::{PatternRewriter, apply_mutations};
use super::streamify::RegionWrapper;
use super::type_converter::TypeConverter;
use crate::context::IrContext;
use crate::dialect::func;
use crate::printer::{print_op, print_type};
use crate::refs::{OpRef, TypeRef};
use crate::types::Attribute;
use crate::walk;

/// Failure policy of a conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversionMode {
    /// Operations the target has no rule for are legal.
    #[default]
    Partial,
    /// Every operation must be explicitly legal.
    Full,
}

/// Tuning knobs for a conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionConfig {
    /// Upper bound on worklist passes before giving up.
    ///
    /// The pass that only retires the last rewritten operations counts, so a
    /// graph needing `d` rounds of rewrites takes `d + 1` passes.
    pub max_passes: usize,
    /// Fold redundant unrealized casts before committing.
    pub reconcile_casts: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_passes: 32,
            reconcile_casts: true,
        }
    }
}

impl ConversionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_reconcile_casts(mut self, reconcile_casts: bool) -> Self {
        self.reconcile_casts = reconcile_casts;
        self
    }
}

/// What a successful conversion did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Worklist passes run, including the final pass that only confirms
    /// legality.
    pub passes: usize,
    /// Successful pattern applications.
    pub rewrites: usize,
    /// Operations moved into wrapper regions by the pre-pass.
    pub wrapped_ops: usize,
    /// Adapter operations created by materialization.
    pub materializations: usize,
    /// Unrealized casts folded or erased during reconciliation.
    pub folded_casts: usize,
}

/// Where an operation stands in the current pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    /// Legal, and everything nested in it is legal.
    Converged,
    /// Legal itself, but something nested is still pending.
    Waiting,
    /// Needs a rewrite.
    Illegal,
}

/// Per-invocation bookkeeping. Dropped when `apply` returns.
#[derive(Default)]
struct ConversionState {
    pending: HashSet<OpRef>,
    materialized: HashSet<OpRef>,
    summary: ConversionSummary,
}

/// Drives patterns over a graph until every operation is legal.
pub struct ConversionDriver {
    target: ConversionTarget,
    patterns: PatternSet,
    converter: Rc<TypeConverter>,
    mode: ConversionMode,
    wrapper: Option<RegionWrapper>,
    config: ConversionConfig,
}

impl ConversionDriver {
    pub fn new(target: ConversionTarget, patterns: PatternSet, converter: Rc<TypeConverter>) -> Self {
        Self {
            target,
            patterns,
            converter,
            mode: ConversionMode::default(),
            wrapper: None,
            config: ConversionConfig::default(),
        }
    }

    pub fn with_mode(mut self, mode: ConversionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `wrapper` over the root before legalization.
    pub fn with_region_wrapper(mut self, wrapper: RegionWrapper) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    pub fn with_config(mut self, config: ConversionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn target(&self) -> &ConversionTarget {
        &self.target
    }

    pub fn type_converter(&self) -> &Rc<TypeConverter> {
        &self.converter
    }

    /// Legalize everything nested under `root` (the root itself is not
    /// converted). All or nothing: on error the graph is unchanged.
    pub fn apply(&self, ctx: &mut IrContext, root: OpRef) -> ConversionResult<ConversionSummary> {
        if ctx.is_erased(root) {
            return Err(ConversionError::invalid_root(format_args!(
                "{root} has been erased"
            )));
        }
        if ctx.op(root).regions.is_empty() {
            return Err(ConversionError::invalid_root(format_args!(
                "`{}` has no regions",
                ctx.op_name(root)
            )));
        }

        let span = tracing::info_span!("conversion", root = %ctx.op_name(root), mode = ?self.mode);
        let _enter = span.enter();

        let tx = ctx.begin_transaction();
        match self.run(ctx, root) {
            Ok(summary) => {
                ctx.commit(tx);
                debug!(?summary, "conversion succeeded");
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "conversion failed, rolling back");
                ctx.rollback(tx);
                Err(err)
            }
        }
    }

    fn run(&self, ctx: &mut IrContext, root: OpRef) -> ConversionResult<ConversionSummary> {
        let mut state = ConversionState::default();

        if let Some(wrapper) = &self.wrapper {
            let _span = tracing::info_span!("streamify").entered();
            state.summary.wrapped_ops = wrapper.run(ctx, root).wrapped_ops;
        }

        state.pending.extend(walk::nested_ops_post_order(ctx, root));

        let mut pass = 0;
        loop {
            let order: Vec<OpRef> = walk::nested_ops_post_order(ctx, root)
                .into_iter()
                .filter(|op| state.pending.contains(op))
                .collect();
            // Pending ops that are no longer reachable were replaced or erased.
            state.pending = order.iter().copied().collect();
            if order.is_empty() {
                break;
            }
            if pass == self.config.max_passes {
                return Err(ConversionError::iteration_limit(
                    pass,
                    state.pending.len(),
                ));
            }
            pass += 1;
            state.summary.passes = pass;

            let pending_before = state.pending.len();
            let mut rewrites = 0;
            let mut first_unmatched = None;
            for op in order {
                if !state.pending.contains(&op) || !ctx.is_live_under(root, op) {
                    state.pending.remove(&op);
                    continue;
                }
                match self.status(ctx, op, &state) {
                    Status::Converged => {
                        trace!(op = %ctx.op_name(op), "legal");
                        state.pending.remove(&op);
                    }
                    Status::Waiting => {
                        trace!(op = %ctx.op_name(op), "waiting on nested operations");
                    }
                    Status::Illegal => {
                        if self.legalize(ctx, root, op, &mut state)? {
                            rewrites += 1;
                        } else {
                            trace!(op = %ctx.op_name(op), "no pattern applied");
                            first_unmatched.get_or_insert(op);
                        }
                    }
                }
            }

            debug!(
                pass,
                rewrites,
                pending = state.pending.len(),
                "conversion pass finished"
            );

            if rewrites == 0 && state.pending.len() >= pending_before && !state.pending.is_empty() {
                let culprit = first_unmatched
                    .or_else(|| {
                        walk::nested_ops_post_order(ctx, root)
                            .into_iter()
                            .find(|op| state.pending.contains(op))
                    })
                    .unwrap_or(root);
                return Err(ConversionError::stalled(
                    ctx.op_name(culprit),
                    state.pending.len(),
                    print_op(ctx, culprit),
                ));
            }
        }

        if self.config.reconcile_casts {
            let reconciled = reconcile_unrealized_casts(ctx, root);
            state.summary.folded_casts = reconciled.folded + reconciled.erased;
        }
        Ok(state.summary)
    }

    fn is_legal(&self, ctx: &IrContext, op: OpRef) -> bool {
        match self.mode {
            ConversionMode::Partial => self.target.is_legal(ctx, op),
            ConversionMode::Full => self.target.is_legal_strict(ctx, op),
        }
    }

    fn status(&self, ctx: &IrContext, op: OpRef, state: &ConversionState) -> Status {
        if state.materialized.contains(&op) {
            return Status::Converged;
        }
        if !self.is_legal(ctx, op) {
            return Status::Illegal;
        }
        if let Some(fn_ty) = signature_type(ctx, op) {
            if !self.converter.is_signature_legal(ctx, fn_ty) {
                return Status::Illegal;
            }
        }
        if ctx.op(op).regions.is_empty() {
            return Status::Converged;
        }
        let nested_pending = walk::nested_ops_pre_order(ctx, op)
            .iter()
            .any(|nested| state.pending.contains(nested));
        if nested_pending {
            Status::Waiting
        } else {
            Status::Converged
        }
    }

    /// Try the candidate patterns on `op`. Returns whether one applied.
    fn legalize(
        &self,
        ctx: &mut IrContext,
        root: OpRef,
        op: OpRef,
        state: &mut ConversionState,
    ) -> ConversionResult<bool> {
        let name = ctx.op_name(op);
        let location = ctx.op(op).location;

        for pattern in self.patterns.candidates(name) {
            let attempt = ctx.begin_transaction();
            let mut rewriter = PatternRewriter::new(&self.converter, location);

            match pattern.match_and_rewrite(ctx, op, &mut rewriter) {
                RewriteResult::NoMatch => {
                    ctx.rollback(attempt);
                }
                RewriteResult::Failed(reason) => {
                    ctx.rollback(attempt);
                    let rendered = print_op(ctx, op);
                    return Err(match rewriter.unconvertible_type() {
                        Some(ty) => {
                            ConversionError::unconvertible_type(name, print_type(ctx, ty), rendered)
                        }
                        None => ConversionError::pattern_failure(
                            pattern.name(),
                            name,
                            reason,
                            rendered,
                        ),
                    });
                }
                RewriteResult::Applied => {
                    if !rewriter.has_mutations() && ctx.edits_since(&attempt) == 0 {
                        trace!(pattern = pattern.name(), op = %name, "applied without changes");
                        ctx.rollback(attempt);
                        continue;
                    }

                    if let Err(ty) = rewriter.adapt_replaced_results(ctx, op) {
                        ctx.rollback(attempt);
                        return Err(ConversionError::unconvertible_type(
                            name,
                            print_type(ctx, ty),
                            print_op(ctx, op),
                        ));
                    }

                    let ancestors = ancestors_below(ctx, root, op);
                    let materialized: Vec<OpRef> = rewriter.materialized_ops().to_vec();
                    let introduced = apply_mutations(ctx, op, rewriter.take_mutations());
                    ctx.commit(attempt);

                    trace!(
                        pattern = pattern.name(),
                        op = %name,
                        introduced = introduced.len(),
                        "pattern applied"
                    );
                    state.summary.rewrites += 1;
                    state.summary.materializations += materialized.len();
                    state.materialized.extend(materialized);
                    for new_op in introduced {
                        if !state.materialized.contains(&new_op) {
                            state.pending.insert(new_op);
                        }
                    }
                    // Modified in place: look at it again.
                    if !ctx.is_erased(op) {
                        state.pending.insert(op);
                    }
                    state.pending.extend(ancestors);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// The `func.fn` type of a function-like operation.
fn signature_type(ctx: &IrContext, op: OpRef) -> Option<TypeRef> {
    func::op_signature(ctx, op)?;
    match ctx.op_attr(op, func::ATTR_TYPE()) {
        Some(Attribute::Type(ty)) => Some(*ty),
        _ => None,
    }
}

/// Enclosing operations of `op`, innermost first, stopping below `root`.
fn ancestors_below(ctx: &IrContext, root: OpRef, op: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    let mut current = ctx.parent_op(op);
    while let Some(parent) = current {
        if parent == root {
            break;
        }
        out.push(parent);
        current = ctx.parent_op(parent);
    }
    out
}

/// Run a partial conversion: operations without a rule are left alone.
pub fn apply_partial_conversion(
    ctx: &mut IrContext,
    root: OpRef,
    target: ConversionTarget,
    patterns: PatternSet,
    converter: Rc<TypeConverter>,
) -> ConversionResult<ConversionSummary> {
    ConversionDriver::new(target, patterns, converter)
        .with_mode(ConversionMode::Partial)
        .apply(ctx, root)
}

/// Run a full conversion: every operation must end explicitly legal.
pub fn apply_full_conversion(
    ctx: &mut IrContext,
    root: OpRef,
    target: ConversionTarget,
    patterns: PatternSet,
    converter: Rc<TypeConverter>,
) -> ConversionResult<ConversionSummary> {
    ConversionDriver::new(target, patterns, converter)
        .with_mode(ConversionMode::Full)
        .apply(ctx, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationDataBuilder;
    use crate::dialect::core;
    use crate::location::Span;
    use crate::ops::DialectOp;
    use crate::refs::PathRef;
    use crate::rewrite::error::ConversionErrorKind;
    use crate::rewrite::pattern::RewritePattern;
    use crate::rewrite::rewriter::PatternRewriter;
    use crate::rewrite::signature_conversion::{
        FuncSignatureConversionPattern, ReturnConversionPattern,
    };
    use crate::rewrite::type_converter::MaterializeResult;
    use crate::symbol::{OpName, Symbol};
    use crate::types::Location;
    use insta::assert_snapshot;

    /// Replaces `from` with a `to` op over remapped operands and converted
    /// result types.
    struct Rename {
        from: OpName,
        to: OpName,
    }

    impl RewritePattern for Rename {
        fn match_and_rewrite(
            &self,
            ctx: &mut IrContext,
            op: OpRef,
            rewriter: &mut PatternRewriter<'_>,
        ) -> RewriteResult {
            let Some(operands) = rewriter.remapped_operands(ctx, op) else {
                return RewriteResult::failed("operand has no conversion");
            };
            let Some(results) = rewriter.convert_result_types(ctx, op) else {
                return RewriteResult::failed("result has no conversion");
            };
            let new_op = OperationDataBuilder::named(rewriter.location(), self.to)
                .operands(operands)
                .results(results)
                .create(ctx);
            rewriter.replace_op(new_op);
            RewriteResult::Applied
        }

        fn root(&self) -> Option<OpName> {
            Some(self.from)
        }

        fn name(&self) -> &'static str {
            "Rename"
        }
    }

    struct Reject;

    impl RewritePattern for Reject {
        fn match_and_rewrite(
            &self,
            _ctx: &mut IrContext,
            _op: OpRef,
            _rewriter: &mut PatternRewriter<'_>,
        ) -> RewriteResult {
            RewriteResult::failed("unsupported operand layout")
        }

        fn root(&self) -> Option<OpName> {
            Some(OpName::from_static("src", "bad"))
        }

        fn name(&self) -> &'static str {
            "Reject"
        }
    }

    fn rename(from: &'static str, to: &'static str) -> Rename {
        Rename {
            from: OpName::parse(from).unwrap(),
            to: OpName::parse(to).unwrap(),
        }
    }

    struct Fixture {
        ctx: IrContext,
        module: OpRef,
        src_ty: TypeRef,
        dst_ty: TypeRef,
    }

    /// `core.module @m { func.func @f(%0: ty) -> ty { ops chained on %0; func.return } }`
    fn fixture(ty_is_src: bool, body: &[&'static str]) -> Fixture {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("driver.mlir".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        let src_ty = ctx.types.simple(Symbol::new("src"), Symbol::new("t"));
        let dst_ty = ctx.types.simple(Symbol::new("dst"), Symbol::new("t"));
        let i32_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("i32"));
        let ty = if ty_is_src { src_ty } else { i32_ty };

        let module = core::module(&mut ctx, loc, Symbol::new("m"));
        let f = func::func(&mut ctx, loc, Symbol::new("f"), &[ty], ty);
        let entry = f.entry_block(&ctx);
        let mut value = ctx.block_arg(entry, 0);
        for name in body {
            let op = OperationDataBuilder::named(loc, OpName::parse(name).unwrap())
                .operand(value)
                .result(ty)
                .create(&mut ctx);
            ctx.push_op(entry, op);
            value = ctx.op_result(op, 0);
        }
        let ret = func::r#return(&mut ctx, loc, &[value]);
        ctx.push_op(entry, ret.op_ref());
        module.push(&mut ctx, f.op_ref());

        Fixture {
            ctx,
            module: module.op_ref(),
            src_ty,
            dst_ty,
        }
    }

    fn target() -> ConversionTarget {
        let mut target = ConversionTarget::new();
        target
            .add_legal_dialect("dst")
            .add_legal_dialect("func")
            .add_illegal_dialect("src")
            .add_dynamically_legal_op("func", "return", |ctx, op| {
                ctx.op_operands(op)
                    .iter()
                    .all(|&v| ctx.types.get(ctx.value_ty(v)).dialect != "src")
            });
        target
    }

    fn converter(src: TypeRef, dst: TypeRef) -> Rc<TypeConverter> {
        let mut converter = TypeConverter::new().with_unrealized_casts();
        converter
            .add_conversion(move |_, ty| (ty == src).then_some(dst))
            .add_identity_fallback();
        Rc::new(converter)
    }

    fn src_to_dst_patterns() -> PatternSet {
        PatternSet::new()
            .with(rename("src.op", "dst.op"))
            .with(FuncSignatureConversionPattern)
            .with(ReturnConversionPattern)
    }

    #[test]
    fn converts_body_and_signature_then_folds_casts() {
        let mut f = fixture(true, &["src.op"]);
        let driver = ConversionDriver::new(
            target(),
            src_to_dst_patterns(),
            converter(f.src_ty, f.dst_ty),
        );

        let summary = driver.apply(&mut f.ctx, f.module).unwrap();

        assert_eq!(
            summary,
            ConversionSummary {
                passes: 2,
                rewrites: 3,
                wrapped_ops: 0,
                materializations: 4,
                folded_casts: 4,
            }
        );
        assert!(!f.ctx.in_transaction());
        assert_snapshot!(print_op(&f.ctx, f.module), @r"
        core.module {sym_name = @m} {
          func.func {sym_name = @f, type = func.fn(dst.t, dst.t)} {
            ^bb0(%0: dst.t):
              %1 = dst.op %0 : dst.t
              func.return %1
          }
        }
        ");
    }

    #[test]
    fn casts_survive_without_reconciliation() {
        let mut f = fixture(true, &["src.op"]);
        let driver = ConversionDriver::new(
            target(),
            src_to_dst_patterns(),
            converter(f.src_ty, f.dst_ty),
        )
        .with_config(ConversionConfig::new().with_reconcile_casts(false));

        let summary = driver.apply(&mut f.ctx, f.module).unwrap();

        assert_eq!(summary.folded_casts, 0);
        let casts = walk::nested_ops_pre_order(&f.ctx, f.module)
            .into_iter()
            .filter(|&op| core::is_cast(&f.ctx, op))
            .count();
        assert_eq!(casts, 4);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut f = fixture(true, &["src.op", "src.op"]);
        let driver = ConversionDriver::new(
            target(),
            src_to_dst_patterns(),
            converter(f.src_ty, f.dst_ty),
        );
        driver.apply(&mut f.ctx, f.module).unwrap();
        let first = print_op(&f.ctx, f.module);

        let summary = driver.apply(&mut f.ctx, f.module).unwrap();

        assert_eq!(summary.rewrites, 0);
        assert_eq!(summary.passes, 1);
        assert_eq!(print_op(&f.ctx, f.module), first);
    }

    #[test]
    fn stall_leaves_graph_untouched() {
        let mut f = fixture(false, &["src.weird"]);
        let before = print_op(&f.ctx, f.module);
        let driver = ConversionDriver::new(
            target(),
            src_to_dst_patterns(),
            converter(f.src_ty, f.dst_ty),
        );

        let err = driver.apply(&mut f.ctx, f.module).unwrap_err();

        assert_eq!(
            err.kind(),
            &ConversionErrorKind::StalledLegalization {
                op: OpName::from_static("src", "weird"),
                pending: 2,
                rendered: "%0 = src.weird %? : core.i32\n".to_owned(),
            }
        );
        assert_eq!(print_op(&f.ctx, f.module), before);
        assert!(!f.ctx.in_transaction());
    }

    #[test]
    fn pattern_failure_rolls_back_earlier_rewrites() {
        let mut f = fixture(true, &["src.op", "src.bad"]);
        let before = print_op(&f.ctx, f.module);
        let driver = ConversionDriver::new(
            target(),
            src_to_dst_patterns().with(Reject),
            converter(f.src_ty, f.dst_ty),
        );

        let err = driver.apply(&mut f.ctx, f.module).unwrap_err();

        match err.kind() {
            ConversionErrorKind::PatternFailure {
                pattern, op, reason, ..
            } => {
                assert_eq!(*pattern, "Reject");
                assert_eq!(op.to_string(), "src.bad");
                assert_eq!(reason, "unsupported operand layout");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(print_op(&f.ctx, f.module), before);
    }

    #[test]
    fn unconvertible_result_type_is_reported() {
        let mut f = fixture(true, &["src.op"]);
        let before = print_op(&f.ctx, f.module);
        // Only `core` types convert; `src.t` has no rule.
        let mut strict = TypeConverter::new().with_unrealized_casts();
        strict.add_conversion(|ctx, ty| (ctx.types.get(ty).dialect == "core").then_some(ty));
        let driver = ConversionDriver::new(target(), src_to_dst_patterns(), Rc::new(strict));

        let err = driver.apply(&mut f.ctx, f.module).unwrap_err();

        match err.kind() {
            ConversionErrorKind::UnconvertibleType { op, ty, .. } => {
                assert_eq!(op.to_string(), "src.op");
                assert_eq!(ty, "src.t");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(print_op(&f.ctx, f.module), before);
    }

    #[test]
    fn result_that_cannot_be_bridged_back_is_unconvertible() {
        let mut f = fixture(true, &["src.op"]);
        let before = print_op(&f.ctx, f.module);
        // Casts only go from `src.t` to `dst.t`.
        let (src, dst) = (f.src_ty, f.dst_ty);
        let mut one_way = TypeConverter::new();
        one_way
            .add_conversion(move |_, ty| (ty == src).then_some(dst))
            .add_identity_fallback()
            .add_materialization(move |ctx, loc, value, from, to| {
                if from != src || to != dst {
                    return MaterializeResult::Skip;
                }
                let cast = core::unrealized_conversion_cast(ctx, loc, value, to);
                MaterializeResult::single(ctx, cast.op_ref())
            });
        let driver = ConversionDriver::new(target(), src_to_dst_patterns(), Rc::new(one_way));

        let err = driver.apply(&mut f.ctx, f.module).unwrap_err();

        match err.kind() {
            ConversionErrorKind::UnconvertibleType { op, ty, .. } => {
                assert_eq!(op.to_string(), "src.op");
                assert_eq!(ty, "dst.t");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(print_op(&f.ctx, f.module), before);
        assert!(!f.ctx.in_transaction());
    }

    #[test]
    fn unknown_ops_pass_in_partial_mode_only() {
        let mut f = fixture(false, &["other.thing"]);
        let before = print_op(&f.ctx, f.module);
        let make = || {
            ConversionDriver::new(
                target(),
                src_to_dst_patterns(),
                converter(f.src_ty, f.dst_ty),
            )
        };

        let summary = make().apply(&mut f.ctx, f.module).unwrap();
        assert_eq!(summary.rewrites, 0);
        assert_eq!(print_op(&f.ctx, f.module), before);

        let err = make()
            .with_mode(ConversionMode::Full)
            .apply(&mut f.ctx, f.module)
            .unwrap_err();
        match err.kind() {
            ConversionErrorKind::StalledLegalization { op, .. } => {
                assert_eq!(op.to_string(), "other.thing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(print_op(&f.ctx, f.module), before);
    }

    #[test]
    fn cycling_patterns_hit_the_pass_limit() {
        let mut f = fixture(false, &["src.a"]);
        let before = print_op(&f.ctx, f.module);
        let patterns = PatternSet::new()
            .with(rename("src.a", "src.b"))
            .with(rename("src.b", "src.a"));
        let driver = ConversionDriver::new(target(), patterns, Rc::new(TypeConverter::new()))
            .with_config(ConversionConfig::new().with_max_passes(4));

        let err = driver.apply(&mut f.ctx, f.module).unwrap_err();

        assert_eq!(
            err.kind(),
            &ConversionErrorKind::IterationLimit {
                passes: 4,
                pending: 2,
            }
        );
        assert_eq!(print_op(&f.ctx, f.module), before);
    }

    #[test]
    fn root_without_regions_is_rejected() {
        let mut f = fixture(false, &[]);
        let loc = f.ctx.op(f.module).location;
        let leaf = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("leaf"))
            .create(&mut f.ctx);
        let err = apply_partial_conversion(
            &mut f.ctx,
            leaf,
            target(),
            PatternSet::new(),
            Rc::new(TypeConverter::new()),
        )
        .unwrap_err();
        assert!(matches!(err.kind(), ConversionErrorKind::InvalidRoot { .. }));
    }

    #[test]
    fn full_conversion_of_a_clean_graph_succeeds() {
        let mut f = fixture(true, &["src.op"]);
        let summary = apply_full_conversion(
            &mut f.ctx,
            f.module,
            target(),
            src_to_dst_patterns(),
            converter(f.src_ty, f.dst_ty),
        )
        .unwrap();
        assert_eq!(summary.rewrites, 3);
        let leftovers = target().find_illegal_ops(&f.ctx, f.ctx.op(f.module).regions[0]);
        assert!(leftovers.is_empty());
    }
}
