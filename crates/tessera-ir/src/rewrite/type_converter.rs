//! Type converter for dialect conversion.
//!
//! Maps source types to target types and synthesizes adapter operations
//! ("materializations") where a value's type and the type its consumer
//! expects disagree after conversion.

use crate::context::IrContext;
use crate::dialect::{core, func};
use crate::ops::DialectOp;
use crate::refs::{OpRef, RegionRef, TypeRef, ValueRef};
use crate::types::Location;

/// Result of one materialization rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaterializeResult {
    /// This rule does not handle the conversion; try the next one.
    Skip,
    /// The value can be used as is.
    NoOp,
    /// Adapter operations were created (detached) and `value` carries the
    /// converted type.
    Adapted { value: ValueRef, ops: Vec<OpRef> },
}

impl MaterializeResult {
    /// An adapter consisting of a single operation whose first result is
    /// the converted value.
    pub fn single(ctx: &IrContext, op: OpRef) -> Self {
        MaterializeResult::Adapted {
            value: ctx.op_result(op, 0),
            ops: vec![op],
        }
    }
}

/// Type conversion function signature.
type ConversionFn = dyn Fn(&IrContext, TypeRef) -> Option<TypeRef>;

/// Materialization function signature: `(ctx, location, value, from, to)`.
type MaterializerFn =
    dyn Fn(&mut IrContext, Location, ValueRef, TypeRef, TypeRef) -> MaterializeResult;

/// Maps types during dialect conversion.
///
/// Conversion rules are tried in registration order; the first rule that
/// returns `Some` wins. A type no rule accepts is unconvertible. A
/// converter without any rule is the identity.
pub struct TypeConverter {
    conversions: Vec<Box<ConversionFn>>,
    materializers: Vec<Box<MaterializerFn>>,
}

impl TypeConverter {
    /// Create a new empty type converter.
    pub fn new() -> Self {
        Self {
            conversions: Vec::new(),
            materializers: Vec::new(),
        }
    }

    /// Add a type conversion rule. Return `None` to defer to later rules.
    pub fn add_conversion(
        &mut self,
        f: impl Fn(&IrContext, TypeRef) -> Option<TypeRef> + 'static,
    ) -> &mut Self {
        self.conversions.push(Box::new(f));
        self
    }

    /// Add a rule mapping every type to itself. Register it last.
    pub fn add_identity_fallback(&mut self) -> &mut Self {
        self.add_conversion(|_, ty| Some(ty))
    }

    /// Add a materialization rule.
    pub fn add_materialization(
        &mut self,
        f: impl Fn(&mut IrContext, Location, ValueRef, TypeRef, TypeRef) -> MaterializeResult
        + 'static,
    ) -> &mut Self {
        self.materializers.push(Box::new(f));
        self
    }

    /// Register the built-in materializer that bridges any two types with a
    /// `core.unrealized_conversion_cast`.
    pub fn with_unrealized_casts(mut self) -> Self {
        self.add_materialization(|ctx, loc, value, _from, to| {
            let cast = core::unrealized_conversion_cast(ctx, loc, value, to);
            MaterializeResult::single(ctx, cast.op_ref())
        });
        self
    }

    /// Convert a type. `None` means no rule accepts it.
    pub fn convert_type(&self, ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
        if self.conversions.is_empty() {
            return Some(ty);
        }
        self.conversions.iter().find_map(|conv| conv(ctx, ty))
    }

    /// Convert every type in `tys`, failing on the first unconvertible one.
    pub fn convert_types(&self, ctx: &IrContext, tys: &[TypeRef]) -> Result<Vec<TypeRef>, TypeRef> {
        tys.iter()
            .map(|&ty| self.convert_type(ctx, ty).ok_or(ty))
            .collect()
    }

    /// A type is legal when it converts to itself.
    pub fn is_legal_type(&self, ctx: &IrContext, ty: TypeRef) -> bool {
        self.convert_type(ctx, ty) == Some(ty)
    }

    /// Whether every input and the result of a `func.fn` type are legal.
    /// Types that are not `func.fn` are checked as a whole.
    pub fn is_signature_legal(&self, ctx: &IrContext, fn_type: TypeRef) -> bool {
        match func::signature(ctx, fn_type) {
            Some(sig) => {
                self.is_legal_type(ctx, sig.result)
                    && sig.params.iter().all(|&ty| self.is_legal_type(ctx, ty))
            }
            None => self.is_legal_type(ctx, fn_type),
        }
    }

    /// Whether every block argument of every block in `region` is legal.
    pub fn is_region_legal(&self, ctx: &IrContext, region: RegionRef) -> bool {
        ctx.region(region).blocks.iter().all(|&block| {
            ctx.block(block)
                .args
                .iter()
                .all(|arg| self.is_legal_type(ctx, arg.ty))
        })
    }

    /// Whether every operand and result type of `op` is legal.
    pub fn is_op_legal(&self, ctx: &IrContext, op: OpRef) -> bool {
        ctx.op_operands(op)
            .iter()
            .all(|&v| self.is_legal_type(ctx, ctx.value_ty(v)))
            && ctx
                .op_result_types(op)
                .iter()
                .all(|&ty| self.is_legal_type(ctx, ty))
    }

    /// Materialize `value` (of type `from`) as type `to`.
    ///
    /// Returns `None` when no rule can perform the conversion. Never returns
    /// [`MaterializeResult::Skip`].
    pub fn materialize(
        &self,
        ctx: &mut IrContext,
        location: Location,
        value: ValueRef,
        from: TypeRef,
        to: TypeRef,
    ) -> Option<MaterializeResult> {
        if from == to {
            return Some(MaterializeResult::NoOp);
        }
        for materializer in &self.materializers {
            match materializer(ctx, location, value, from, to) {
                MaterializeResult::Skip => continue,
                other => return Some(other),
            }
        }
        None
    }

    /// Check if this converter has any conversion rules.
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}
