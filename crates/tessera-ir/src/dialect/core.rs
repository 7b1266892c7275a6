//! Core dialect: modules, unrealized conversion casts and basic types.

use smallvec::smallvec;

use crate::context::{BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::ops::DialectOp;
use crate::refs::{BlockRef, OpRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location};
use crate::{dialect_op, symbols};

symbols! {
    DIALECT_NAME => "core",
    ATTR_SYM_NAME => "sym_name",
}

dialect_op! {
    /// `core.module`: single-region container of top-level operations.
    Module => "core", "module",
    /// `core.unrealized_conversion_cast`: placeholder conversion between a
    /// value's original and converted type, reconciled at the end of a
    /// conversion.
    UnrealizedConversionCast => "core", "unrealized_conversion_cast",
}

/// Create a detached `core.module` with one empty body block.
pub fn module(ctx: &mut IrContext, loc: Location, name: Symbol) -> Module {
    let block = ctx.create_block(BlockData {
        location: loc,
        args: vec![],
        ops: smallvec![],
        parent_region: None,
    });
    let region = ctx.create_region(RegionData {
        location: loc,
        blocks: smallvec![block],
        parent_op: None,
    });
    let op = OperationDataBuilder::new(loc, DIALECT_NAME(), Symbol::new("module"))
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .region(region)
        .create(ctx);
    Module(op)
}

impl Module {
    /// The block holding the module's top-level operations.
    pub fn body_block(&self, ctx: &IrContext) -> BlockRef {
        let region = ctx.op(self.0).regions[0];
        ctx.region(region).blocks[0]
    }

    /// Append a top-level operation.
    pub fn push(&self, ctx: &mut IrContext, op: OpRef) {
        let block = self.body_block(ctx);
        ctx.push_op(block, op);
    }
}

/// Create a detached cast of `value` to `ty`.
pub fn unrealized_conversion_cast(
    ctx: &mut IrContext,
    loc: Location,
    value: ValueRef,
    ty: TypeRef,
) -> UnrealizedConversionCast {
    let op = OperationDataBuilder::new(
        loc,
        DIALECT_NAME(),
        Symbol::new("unrealized_conversion_cast"),
    )
    .operand(value)
    .result(ty)
    .create(ctx);
    UnrealizedConversionCast(op)
}

impl UnrealizedConversionCast {
    pub fn input(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

/// `core.nil`, the result type of functions returning nothing.
pub fn nil_type(ctx: &mut IrContext) -> TypeRef {
    ctx.types.simple(DIALECT_NAME(), Symbol::new("nil"))
}

/// Whether `op` is an unrealized conversion cast.
pub fn is_cast(ctx: &IrContext, op: OpRef) -> bool {
    UnrealizedConversionCast::matches(ctx, op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Span;
    use crate::refs::PathRef;

    fn dummy_location() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    #[test]
    fn module_holds_ops() {
        let mut ctx = IrContext::new();
        let loc = dummy_location();
        let m = module(&mut ctx, loc, Symbol::new("m"));
        let op = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("x"))
            .create(&mut ctx);
        m.push(&mut ctx, op);

        assert!(Module::from_op(&ctx, m.op_ref()).is_some());
        assert_eq!(ctx.parent_op(op), Some(m.op_ref()));
    }

    #[test]
    fn cast_round_trip() {
        let mut ctx = IrContext::new();
        let loc = dummy_location();
        let i32_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("i32"));
        let i64_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("i64"));
        let src = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("src"))
            .result(i32_ty)
            .create(&mut ctx);
        let v = ctx.op_result(src, 0);

        let cast = unrealized_conversion_cast(&mut ctx, loc, v, i64_ty);
        assert!(is_cast(&ctx, cast.op_ref()));
        assert!(!is_cast(&ctx, src));
        assert_eq!(cast.input(&ctx), v);
        assert_eq!(ctx.value_ty(cast.result(&ctx)), i64_ty);
        assert_eq!(
            UnrealizedConversionCast::op_name().to_string(),
            "core.unrealized_conversion_cast"
        );
    }
}
