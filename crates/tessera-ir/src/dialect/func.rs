//! Func dialect: function-like operations and the `func.fn` type.
//!
//! `func.fn` type layout: `params[0]` = return type, `params[1..]` = param
//! types. A function's entry block arguments mirror its param types.

use smallvec::smallvec;

use crate::context::{BlockArgData, BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location, TypeDataBuilder};
use crate::{dialect_op, symbols};

symbols! {
    DIALECT_NAME => "func",
    FN_TYPE => "fn",
    ATTR_SYM_NAME => "sym_name",
    ATTR_TYPE => "type",
    ATTR_CALLEE => "callee",
}

dialect_op! {
    /// `func.func`
    Func => "func", "func",
    /// `func.return`
    Return => "func", "return",
    /// `func.call`
    Call => "func", "call",
}

/// Decoded `func.fn` type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnSignature {
    pub params: Vec<TypeRef>,
    pub result: TypeRef,
}

/// Intern a `func.fn` type.
pub fn fn_type(ctx: &mut IrContext, params: &[TypeRef], result: TypeRef) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(DIALECT_NAME(), FN_TYPE())
            .param(result)
            .params(params.iter().copied())
            .build(),
    )
}

/// Decode a `func.fn` type, or `None` if `ty` is not one.
pub fn signature(ctx: &IrContext, ty: TypeRef) -> Option<FnSignature> {
    let data = ctx.types.get(ty);
    if data.dialect != DIALECT_NAME() || data.name != FN_TYPE() || data.params.is_empty() {
        return None;
    }
    Some(FnSignature {
        result: data.params[0],
        params: data.params[1..].to_vec(),
    })
}

/// The signature of a function-like operation: an operation with at least
/// one region whose `type` attribute is a `func.fn` type.
pub fn op_signature(ctx: &IrContext, op: OpRef) -> Option<FnSignature> {
    if ctx.op(op).regions.is_empty() {
        return None;
    }
    match ctx.op_attr(op, ATTR_TYPE()) {
        Some(Attribute::Type(ty)) => signature(ctx, *ty),
        _ => None,
    }
}

/// Create a detached `func.func` whose entry block arguments match `params`.
pub fn func(
    ctx: &mut IrContext,
    loc: Location,
    name: Symbol,
    params: &[TypeRef],
    result: TypeRef,
) -> Func {
    let ty = fn_type(ctx, params, result);
    let entry = ctx.create_block(BlockData {
        location: loc,
        args: params.iter().map(|&t| BlockArgData::new(t)).collect(),
        ops: smallvec![],
        parent_region: None,
    });
    let body = ctx.create_region(RegionData {
        location: loc,
        blocks: smallvec![entry],
        parent_op: None,
    });
    let op = OperationDataBuilder::new(loc, DIALECT_NAME(), Symbol::new("func"))
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .attr(ATTR_TYPE(), Attribute::Type(ty))
        .region(body)
        .create(ctx);
    Func(op)
}

impl Func {
    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn entry_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }

    pub fn r#type(&self, ctx: &IrContext) -> Option<TypeRef> {
        match ctx.op_attr(self.0, ATTR_TYPE()) {
            Some(Attribute::Type(ty)) => Some(*ty),
            _ => None,
        }
    }

    pub fn sym_name(&self, ctx: &IrContext) -> Option<Symbol> {
        match ctx.op_attr(self.0, ATTR_SYM_NAME()) {
            Some(Attribute::Symbol(s)) => Some(*s),
            _ => None,
        }
    }
}

/// Create a detached `func.return`.
pub fn r#return(ctx: &mut IrContext, loc: Location, values: &[ValueRef]) -> Return {
    let op = OperationDataBuilder::new(loc, DIALECT_NAME(), Symbol::new("return"))
        .operands(values.iter().copied())
        .create(ctx);
    Return(op)
}

/// Create a detached `func.call`.
pub fn call(
    ctx: &mut IrContext,
    loc: Location,
    callee: Symbol,
    args: &[ValueRef],
    result: TypeRef,
) -> Call {
    let op = OperationDataBuilder::new(loc, DIALECT_NAME(), Symbol::new("call"))
        .operands(args.iter().copied())
        .attr(ATTR_CALLEE(), Attribute::Symbol(callee))
        .result(result)
        .create(ctx);
    Call(op)
}
