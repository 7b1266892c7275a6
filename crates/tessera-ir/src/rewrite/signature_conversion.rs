//! Function signature conversion.
//!
//! [`FuncSignatureConversionPattern`] converts the signature of any
//! function-like operation (an op with a region and a `func.fn` `type`
//! attribute) in place, using the rewriter's type converter.
//! [`ReturnConversionPattern`] converts what the function returns.

use super::pattern::{RewritePattern, RewriteResult};
use super::rewriter::PatternRewriter;
use super::type_converter::MaterializeResult;
use crate::context::IrContext;
use crate::dialect::func;
use crate::ops::DialectOp;
use crate::printer::print_type;
use crate::refs::{BlockRef, OpRef, TypeRef};
use crate::symbol::OpName;
use crate::types::Attribute;

/// Converts the `type` attribute and entry-block argument types of a
/// function-like operation.
///
/// Uses of a converted argument are routed through an argument
/// materialization (new type → old type) inserted at the top of the entry
/// block, so no existing user observes a type change. Those adapters usually
/// fold away once the users themselves have been converted.
pub struct FuncSignatureConversionPattern;

impl RewritePattern for FuncSignatureConversionPattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult {
        let Some(sig) = func::op_signature(ctx, op) else {
            return RewriteResult::NoMatch;
        };

        let Some(new_result) = rewriter.convert_type(ctx, sig.result) else {
            return unconvertible(ctx, sig.result);
        };
        let mut new_params = Vec::with_capacity(sig.params.len());
        for &param in &sig.params {
            let Some(converted) = rewriter.convert_type(ctx, param) else {
                return unconvertible(ctx, param);
            };
            new_params.push(converted);
        }

        let region = ctx.op(op).regions[0];
        let entry = ctx.entry_block(region);
        let arg_changes: Vec<(u32, TypeRef)> = match entry {
            Some(block) => ctx
                .block(block)
                .args
                .iter()
                .zip(new_params.iter())
                .enumerate()
                .filter(|(_, (arg, new))| arg.ty != **new)
                .map(|(i, (_, &new))| (i as u32, new))
                .collect(),
            None => Vec::new(),
        };

        if new_result == sig.result && new_params == sig.params && arg_changes.is_empty() {
            return RewriteResult::NoMatch;
        }

        let new_type = func::fn_type(ctx, &new_params, new_result);
        ctx.set_attr(op, func::ATTR_TYPE(), Attribute::Type(new_type));

        let Some(entry) = entry else {
            return RewriteResult::Applied;
        };
        for (index, new_ty) in arg_changes {
            let old_ty = ctx.value_ty(ctx.block_arg(entry, index));
            if !convert_block_arg(ctx, rewriter, entry, index, new_ty) {
                return RewriteResult::failed(format_args!(
                    "cannot materialize argument {index} from `{}` back to `{}`",
                    print_type(ctx, new_ty),
                    print_type(ctx, old_ty)
                ));
            }
        }

        RewriteResult::Applied
    }

    fn name(&self) -> &'static str {
        "FuncSignatureConversionPattern"
    }
}

/// Converts the operands of `func.return` in place.
pub struct ReturnConversionPattern;

impl RewritePattern for ReturnConversionPattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult {
        let old: Vec<_> = ctx.op_operands(op).to_vec();
        let Some(new) = rewriter.remapped_operands(ctx, op) else {
            return RewriteResult::failed("returned value has no conversion");
        };
        let mut changed = false;
        for (index, (&old, &new)) in old.iter().zip(&new).enumerate() {
            if old != new {
                ctx.set_operand(op, index as u32, new);
                changed = true;
            }
        }
        if changed {
            RewriteResult::Applied
        } else {
            RewriteResult::NoMatch
        }
    }

    fn root(&self) -> Option<OpName> {
        Some(func::Return::op_name())
    }

    fn name(&self) -> &'static str {
        "ReturnConversionPattern"
    }
}

/// Retype argument `index` of `block` to `new_ty`.
///
/// Existing uses are routed through a materialization back to the old type,
/// placed at the top of the block. Returns `false` when no materializer can
/// bridge the two types; the argument has been retyped by then, so the
/// caller must fail the rewrite.
pub fn convert_block_arg(
    ctx: &mut IrContext,
    rewriter: &mut PatternRewriter<'_>,
    block: BlockRef,
    index: u32,
    new_ty: TypeRef,
) -> bool {
    let arg = ctx.block_arg(block, index);
    let old_ty = ctx.value_ty(arg);
    ctx.set_block_arg_type(block, index, new_ty);
    if !ctx.has_uses(arg) {
        return true;
    }
    match rewriter.materialize(ctx, arg, old_ty) {
        None => false,
        Some(MaterializeResult::Skip | MaterializeResult::NoOp) => true,
        Some(MaterializeResult::Adapted { value, ops }) => {
            match ctx.block(block).ops.first().copied() {
                Some(first) => {
                    for &adapter in &ops {
                        ctx.insert_op_before(block, first, adapter);
                    }
                }
                None => {
                    for &adapter in &ops {
                        ctx.push_op(block, adapter);
                    }
                }
            }
            ctx.replace_uses_where(arg, value, |user| !ops.contains(&user));
            true
        }
    }
}

fn unconvertible(ctx: &IrContext, ty: TypeRef) -> RewriteResult {
    RewriteResult::failed(format_args!(
        "signature type `{}` has no conversion",
        print_type(ctx, ty)
    ))
}
