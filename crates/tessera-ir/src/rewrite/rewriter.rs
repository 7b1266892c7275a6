//! PatternRewriter: accumulates mutations from pattern rewrites.
//!
//! Patterns may also mutate the context directly (in-place rewrites); every
//! mutation is journaled, so the driver can discard an attempt either way.

use super::type_converter::{MaterializeResult, TypeConverter};
use crate::context::IrContext;
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::types::Location;
use crate::walk;

/// Accumulated mutations from a pattern rewrite.
pub(crate) struct Mutations {
    /// Operations to insert before the current op's position.
    pub(crate) prefix_ops: Vec<OpRef>,
    /// Operations to insert after the current op's position.
    pub(crate) suffix_ops: Vec<OpRef>,
    /// The replacement operation (if any).
    pub(crate) replacement: Option<OpRef>,
    /// If set, the operation is erased and its results mapped to these values.
    pub(crate) erase_values: Option<Vec<ValueRef>>,
    /// Result indices whose old uses go to an adapter instead of the
    /// replacement value.
    pub(crate) adapted_results: Vec<(usize, ValueRef)>,
}

/// Rewriter interface for patterns.
///
/// Patterns use this to record mutations which are applied by the
/// conversion driver after the pattern returns.
pub struct PatternRewriter<'a> {
    type_converter: &'a TypeConverter,
    location: Location,
    prefix_ops: Vec<OpRef>,
    suffix_ops: Vec<OpRef>,
    replacement: Option<OpRef>,
    erase_values: Option<Vec<ValueRef>>,
    adapted_results: Vec<(usize, ValueRef)>,
    materialized: Vec<OpRef>,
    unconvertible: Option<TypeRef>,
}

impl<'a> PatternRewriter<'a> {
    /// Create a new empty rewriter for the operation at `location`.
    pub fn new(type_converter: &'a TypeConverter, location: Location) -> Self {
        Self {
            type_converter,
            location,
            prefix_ops: Vec::new(),
            suffix_ops: Vec::new(),
            replacement: None,
            erase_values: None,
            adapted_results: Vec::new(),
            materialized: Vec::new(),
            unconvertible: None,
        }
    }

    /// Get a reference to the type converter.
    pub fn type_converter(&self) -> &'a TypeConverter {
        self.type_converter
    }

    /// Location of the operation being rewritten.
    pub fn location(&self) -> Location {
        self.location
    }

    // === Type conversion ===

    /// Convert a type, remembering it if no rule accepts it so that a
    /// subsequent `Failed` is reported as an unconvertible type.
    pub fn convert_type(&mut self, ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
        let converted = self.type_converter.convert_type(ctx, ty);
        if converted.is_none() && self.unconvertible.is_none() {
            self.unconvertible = Some(ty);
        }
        converted
    }

    /// Converted result types of `op`.
    pub fn convert_result_types(&mut self, ctx: &IrContext, op: OpRef) -> Option<Vec<TypeRef>> {
        let tys: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
        tys.into_iter().map(|ty| self.convert_type(ctx, ty)).collect()
    }

    /// Materialize `value` as type `to`. Created adapter ops are detached;
    /// the caller decides where they go. They are reported to the driver as
    /// materializations.
    pub fn materialize(
        &mut self,
        ctx: &mut IrContext,
        value: ValueRef,
        to: TypeRef,
    ) -> Option<MaterializeResult> {
        let from = ctx.value_ty(value);
        let result = self
            .type_converter
            .materialize(ctx, self.location, value, from, to)?;
        if let MaterializeResult::Adapted { ops, .. } = &result {
            self.materialized.extend(ops.iter().copied());
        }
        Some(result)
    }

    /// The value of operand `index` of `op`, adapted to its converted type.
    ///
    /// Adapter ops are queued before the current operation. Returns `None`
    /// if the operand's type is unconvertible or cannot be materialized.
    pub fn remap_operand(&mut self, ctx: &mut IrContext, op: OpRef, index: usize) -> Option<ValueRef> {
        let value = ctx.op_operands(op)[index];
        let from = ctx.value_ty(value);
        let to = self.convert_type(ctx, from)?;
        match self.materialize(ctx, value, to)? {
            MaterializeResult::Skip | MaterializeResult::NoOp => Some(value),
            MaterializeResult::Adapted { value, ops } => {
                self.prefix_ops.extend(ops);
                Some(value)
            }
        }
    }

    /// All operands of `op` adapted to their converted types.
    pub fn remapped_operands(&mut self, ctx: &mut IrContext, op: OpRef) -> Option<Vec<ValueRef>> {
        let count = ctx.op_operands(op).len();
        (0..count)
            .map(|index| self.remap_operand(ctx, op, index))
            .collect()
    }

    // === Mutations ===

    /// Insert an operation before the current operation.
    ///
    /// The op must already be created via `ctx.create_op()` but not yet
    /// attached to a block. Multiple calls accumulate operations in order.
    pub fn insert_op(&mut self, op: OpRef) {
        self.prefix_ops.push(op);
    }

    /// Insert an operation after the current operation (or its replacement).
    pub fn insert_op_after(&mut self, op: OpRef) {
        self.suffix_ops.push(op);
    }

    /// Replace the current operation with a new one.
    ///
    /// The driver will RAUW old results → new results (1:1 by index),
    /// then remove the old op from its block and insert the new one.
    pub fn replace_op(&mut self, new_op: OpRef) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "replace_op called after replace_op or erase_op"
        );
        self.replacement = Some(new_op);
    }

    /// Erase the current operation, mapping its results to the given values.
    ///
    /// The replacement values must match the original result count.
    pub fn erase_op(&mut self, replacement_values: Vec<ValueRef>) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "erase_op called after replace_op or erase_op"
        );
        self.erase_values = Some(replacement_values);
    }

    /// Bridge every replaced result whose type changed back to its old type,
    /// so users that are never converted keep seeing the type they consume.
    ///
    /// Adapters are queued after the suffix ops. On failure returns the new
    /// type that could not be materialized back.
    pub(crate) fn adapt_replaced_results(
        &mut self,
        ctx: &mut IrContext,
        op: OpRef,
    ) -> Result<(), TypeRef> {
        let new_values: Vec<ValueRef> = match (self.replacement, &self.erase_values) {
            (Some(new_op), _) => ctx.op_results(new_op).to_vec(),
            (None, Some(values)) => values.clone(),
            (None, None) => return Ok(()),
        };
        let old_values: Vec<ValueRef> = ctx.op_results(op).to_vec();
        for (index, (&old_v, &new_v)) in old_values.iter().zip(&new_values).enumerate() {
            let old_ty = ctx.value_ty(old_v);
            if ctx.value_ty(new_v) == old_ty || !ctx.has_uses(old_v) {
                continue;
            }
            match self.materialize(ctx, new_v, old_ty) {
                None => return Err(ctx.value_ty(new_v)),
                Some(MaterializeResult::Skip | MaterializeResult::NoOp) => {}
                Some(MaterializeResult::Adapted { value, ops }) => {
                    self.suffix_ops.extend(ops);
                    self.adapted_results.push((index, value));
                }
            }
        }
        Ok(())
    }

    // === Query ===

    /// Check if any mutation was recorded.
    pub(crate) fn has_mutations(&self) -> bool {
        !self.prefix_ops.is_empty()
            || !self.suffix_ops.is_empty()
            || self.replacement.is_some()
            || self.erase_values.is_some()
    }

    pub(crate) fn materialized_ops(&self) -> &[OpRef] {
        &self.materialized
    }

    pub(crate) fn unconvertible_type(&self) -> Option<TypeRef> {
        self.unconvertible
    }

    /// Consume the rewriter and return accumulated mutations.
    pub(crate) fn take_mutations(self) -> Mutations {
        Mutations {
            prefix_ops: self.prefix_ops,
            suffix_ops: self.suffix_ops,
            replacement: self.replacement,
            erase_values: self.erase_values,
            adapted_results: self.adapted_results,
        }
    }
}

/// Apply mutations to the IR context.
///
/// Returns every operation the mutations introduced into the IR, including
/// operations nested inside them, children first.
pub(crate) fn apply_mutations(
    ctx: &mut IrContext,
    original_op: OpRef,
    mutations: Mutations,
) -> Vec<OpRef> {
    let mut introduced = Vec::new();
    let Some(block) = ctx.op(original_op).parent_block else {
        panic!("apply_mutations: operation {original_op} is not attached to a block");
    };

    // 1. Insert prefix ops before the original op
    for &prefix_op in &mutations.prefix_ops {
        ctx.insert_op_before(block, original_op, prefix_op);
        introduced.push(prefix_op);
    }

    // 2. Insert suffix ops after the original op, in order
    let mut anchor = original_op;
    for &suffix_op in &mutations.suffix_ops {
        ctx.insert_op_after(block, anchor, suffix_op);
        anchor = suffix_op;
        introduced.push(suffix_op);
    }

    // 3. Handle replacement or erasure
    let target_of = |index: usize, new_v: ValueRef| {
        mutations
            .adapted_results
            .iter()
            .find(|(i, _)| *i == index)
            .map_or(new_v, |&(_, adapted)| adapted)
    };
    if let Some(new_op) = mutations.replacement {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        let new_results: Vec<ValueRef> = ctx.op_results(new_op).to_vec();
        assert_eq!(
            old_results.len(),
            new_results.len(),
            "replace_op: result count mismatch ({} vs {})",
            old_results.len(),
            new_results.len()
        );
        for (index, (&old_v, &new_v)) in old_results.iter().zip(&new_results).enumerate() {
            ctx.replace_all_uses(old_v, target_of(index, new_v));
        }

        ctx.insert_op_before(block, original_op, new_op);
        ctx.erase_op(original_op);
        introduced.push(new_op);
    } else if let Some(erase_values) = &mutations.erase_values {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        assert_eq!(
            old_results.len(),
            erase_values.len(),
            "erase_op: replacement value count mismatch ({} vs {})",
            old_results.len(),
            erase_values.len()
        );
        for (index, (&old_v, &new_v)) in old_results.iter().zip(erase_values).enumerate() {
            ctx.replace_all_uses(old_v, target_of(index, new_v));
        }
        ctx.erase_op(original_op);
    }

    let mut with_nested = Vec::with_capacity(introduced.len());
    for op in introduced {
        with_nested.extend(walk::nested_ops_post_order(ctx, op));
        with_nested.push(op);
    }
    with_nested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BlockData, OperationDataBuilder};
    use crate::dialect::core;
    use crate::location::Span;
    use crate::refs::{BlockRef, PathRef};
    use crate::symbol::Symbol;
    use smallvec::smallvec;

    struct Fixture {
        ctx: IrContext,
        loc: Location,
        block: BlockRef,
        src_ty: TypeRef,
        dst_ty: TypeRef,
        producer: OpRef,
        target: OpRef,
        user: OpRef,
    }

    /// `%0 = test.producer : src.t; %1 = src.op %0 : src.t; test.user %1`
    fn fixture() -> Fixture {
        let mut ctx = IrContext::new();
        let loc = Location::new(PathRef::from_u32(0), Span::default());
        let src_ty = ctx.types.simple(Symbol::new("src"), Symbol::new("t"));
        let dst_ty = ctx.types.simple(Symbol::new("dst"), Symbol::new("t"));
        let producer = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("producer"))
            .result(src_ty)
            .create(&mut ctx);
        let v0 = ctx.op_result(producer, 0);
        let target = OperationDataBuilder::new(loc, Symbol::new("src"), Symbol::new("op"))
            .operand(v0)
            .result(src_ty)
            .create(&mut ctx);
        let v1 = ctx.op_result(target, 0);
        let user = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("user"))
            .operand(v1)
            .create(&mut ctx);
        let block = ctx.create_block(BlockData {
            location: loc,
            args: vec![],
            ops: smallvec![producer, target, user],
            parent_region: None,
        });
        Fixture {
            ctx,
            loc,
            block,
            src_ty,
            dst_ty,
            producer,
            target,
            user,
        }
    }

    fn converter(src: TypeRef, dst: TypeRef) -> TypeConverter {
        let mut converter = TypeConverter::new().with_unrealized_casts();
        converter
            .add_conversion(move |_, ty| (ty == src).then_some(dst))
            .add_identity_fallback();
        converter
    }

    #[test]
    fn remap_operand_queues_adapter() {
        let mut f = fixture();
        let converter = converter(f.src_ty, f.dst_ty);
        let mut rw = PatternRewriter::new(&converter, f.loc);

        let remapped = rw.remapped_operands(&mut f.ctx, f.target).unwrap();
        assert_eq!(f.ctx.value_ty(remapped[0]), f.dst_ty);
        assert_eq!(rw.materialized_ops().len(), 1);
        assert!(rw.has_mutations());
        assert!(core::is_cast(&f.ctx, rw.materialized_ops()[0]));
    }

    #[test]
    fn unconvertible_type_is_remembered() {
        let mut f = fixture();
        let mut converter = TypeConverter::new();
        let dst = f.dst_ty;
        converter.add_conversion(move |_, ty| (ty == dst).then_some(dst));
        let mut rw = PatternRewriter::new(&converter, f.loc);

        assert!(rw.remap_operand(&mut f.ctx, f.target, 0).is_none());
        assert_eq!(rw.unconvertible_type(), Some(f.src_ty));
    }

    #[test]
    fn replace_rewires_uses_and_keeps_position() {
        let mut f = fixture();
        let converter = converter(f.src_ty, f.dst_ty);
        let mut rw = PatternRewriter::new(&converter, f.loc);

        let operands = rw.remapped_operands(&mut f.ctx, f.target).unwrap();
        let new_op = OperationDataBuilder::new(f.loc, Symbol::new("dst"), Symbol::new("op"))
            .operands(operands)
            .result(f.dst_ty)
            .create(&mut f.ctx);
        rw.replace_op(new_op);
        let cast = rw.materialized_ops()[0];

        let introduced = apply_mutations(&mut f.ctx, f.target, rw.take_mutations());
        assert_eq!(introduced, vec![cast, new_op]);
        assert_eq!(
            f.ctx.block(f.block).ops.as_slice(),
            &[f.producer, cast, new_op, f.user]
        );
        assert!(f.ctx.is_erased(f.target));
        assert_eq!(f.ctx.op_operands(f.user), &[f.ctx.op_result(new_op, 0)]);
    }

    #[test]
    fn changed_result_type_is_bridged_for_existing_users() {
        let mut f = fixture();
        let converter = converter(f.src_ty, f.dst_ty);
        let mut rw = PatternRewriter::new(&converter, f.loc);

        let operands = rw.remapped_operands(&mut f.ctx, f.target).unwrap();
        let new_op = OperationDataBuilder::new(f.loc, Symbol::new("dst"), Symbol::new("op"))
            .operands(operands)
            .result(f.dst_ty)
            .create(&mut f.ctx);
        rw.replace_op(new_op);
        rw.adapt_replaced_results(&mut f.ctx, f.target).unwrap();
        let [cast_in, cast_back] = rw.materialized_ops() else {
            panic!("expected two adapters, got {:?}", rw.materialized_ops());
        };
        let (cast_in, cast_back) = (*cast_in, *cast_back);

        apply_mutations(&mut f.ctx, f.target, rw.take_mutations());
        assert_eq!(
            f.ctx.block(f.block).ops.as_slice(),
            &[f.producer, cast_in, new_op, cast_back, f.user]
        );
        assert_eq!(f.ctx.op_operands(cast_back), &[f.ctx.op_result(new_op, 0)]);
        let seen = f.ctx.op_operands(f.user)[0];
        assert_eq!(seen, f.ctx.op_result(cast_back, 0));
        assert_eq!(f.ctx.value_ty(seen), f.src_ty);
    }

    #[test]
    fn result_without_back_materialization_is_reported() {
        let mut f = fixture();
        let mut converter = TypeConverter::new();
        let (src, dst) = (f.src_ty, f.dst_ty);
        converter.add_conversion(move |_, ty| (ty == src).then_some(dst));
        let mut rw = PatternRewriter::new(&converter, f.loc);

        let v0 = f.ctx.op_result(f.producer, 0);
        let new_op = OperationDataBuilder::new(f.loc, Symbol::new("dst"), Symbol::new("op"))
            .operand(v0)
            .result(f.dst_ty)
            .create(&mut f.ctx);
        rw.replace_op(new_op);

        assert_eq!(rw.adapt_replaced_results(&mut f.ctx, f.target), Err(f.dst_ty));
        assert!(rw.materialized_ops().is_empty());
    }

    #[test]
    fn erase_with_values_and_suffix_ops() {
        let mut f = fixture();
        let converter = TypeConverter::new();
        let mut rw = PatternRewriter::new(&converter, f.loc);

        let v0 = f.ctx.op_result(f.producer, 0);
        let marker = OperationDataBuilder::new(f.loc, Symbol::new("test"), Symbol::new("marker"))
            .create(&mut f.ctx);
        rw.insert_op_after(marker);
        rw.erase_op(vec![v0]);

        apply_mutations(&mut f.ctx, f.target, rw.take_mutations());
        assert_eq!(
            f.ctx.block(f.block).ops.as_slice(),
            &[f.producer, marker, f.user]
        );
        assert_eq!(f.ctx.op_operands(f.user), &[v0]);
    }
}
