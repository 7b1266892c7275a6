//! Dialect conversion infrastructure.
//!
//! Patterns mutate the arena in place; the [`ConversionDriver`] wraps every
//! conversion in a journaled transaction so a failed conversion leaves the
//! graph exactly as it found it.

pub mod conversion_target;
pub mod driver;
pub mod error;
pub mod pattern;
pub mod reconcile_casts;
pub mod rewriter;
pub mod signature_conversion;
pub mod streamify;
pub mod type_converter;

pub use conversion_target::{ConversionTarget, IllegalOp, Legality};
pub use driver::{
    ConversionConfig, ConversionDriver, ConversionMode, ConversionSummary,
    apply_full_conversion, apply_partial_conversion,
};
pub use error::{ConversionError, ConversionErrorKind, ConversionResult};
pub use pattern::{PatternSet, RewritePattern, RewriteResult};
pub use reconcile_casts::{ReconcileSummary, reconcile_unrealized_casts};
pub use rewriter::PatternRewriter;
pub use signature_conversion::{
    FuncSignatureConversionPattern, ReturnConversionPattern, convert_block_arg,
};
pub use streamify::{RegionWrapper, StreamifyConfig, WrapSummary};
pub use type_converter::{MaterializeResult, TypeConverter};
