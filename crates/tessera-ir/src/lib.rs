//! Tessera IR crate.
//!
//! An arena-allocated, mutable multi-dialect IR (`cranelift-entity`) with
//! use-chains, RAUW and an undo journal, plus a partial dialect-conversion
//! engine built on top of it.

// === Arena IR ===
pub mod context;
pub mod journal;
pub mod refs;
pub mod types;

// === Dialect modules ===
pub mod dialect;

// === IR infrastructure ===
pub mod location;
pub mod ops;
pub mod printer;
pub mod rewrite;
pub mod symbol;
pub mod walk;

// Re-export smallvec for use in macros and external crates
pub use smallvec;

pub use context::{
    BlockArgData, BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use,
    ValueData,
};
pub use journal::Transaction;
pub use location::{Span, Spanned};
pub use ops::DialectOp;
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::{OpName, Symbol};
pub use types::{Attribute, Location, PathInterner, TypeData, TypeDataBuilder, TypeInterner};
pub use walk::WalkAction;
