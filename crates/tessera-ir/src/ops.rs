//! Typed operation wrappers.
//!
//! Provides the `DialectOp` trait and the `dialect_op!` macro for declaring
//! thin `Copy` handles over an `OpRef` of a known kind.

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::OpName;

/// Trait for typed operation wrappers.
pub trait DialectOp: Sized + Copy {
    const DIALECT_NAME: &'static str;
    const OP_NAME: &'static str;

    /// Wrap `op` if it has this wrapper's kind.
    fn from_op(ctx: &IrContext, op: OpRef) -> Option<Self>;

    fn op_ref(&self) -> OpRef;

    fn matches(ctx: &IrContext, op: OpRef) -> bool {
        ctx.op_is(op, Self::DIALECT_NAME, Self::OP_NAME)
    }

    fn op_name() -> OpName {
        OpName::from_static(Self::DIALECT_NAME, Self::OP_NAME)
    }
}

/// Declare a typed wrapper struct implementing [`DialectOp`].
///
/// # Example
/// ```
/// use tessera_ir::{dialect_op, DialectOp};
///
/// dialect_op! {
///     /// `gpu.launch`
///     Launch => "gpu", "launch"
/// }
///
/// assert_eq!(Launch::op_name().to_string(), "gpu.launch");
/// ```
#[macro_export]
macro_rules! dialect_op {
    ($($(#[$attr:meta])* $name:ident => $dialect:literal, $op:literal),* $(,)?) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name($crate::OpRef);

            impl $crate::DialectOp for $name {
                const DIALECT_NAME: &'static str = $dialect;
                const OP_NAME: &'static str = $op;

                fn from_op(ctx: &$crate::IrContext, op: $crate::OpRef) -> Option<Self> {
                    <Self as $crate::DialectOp>::matches(ctx, op).then_some(Self(op))
                }

                fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }
            }
        )*
    };
}
