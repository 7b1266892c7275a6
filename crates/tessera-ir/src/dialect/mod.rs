//! Built-in dialects the conversion engine relies on.
//!
//! `core` provides the module container and the unrealized conversion cast
//! used for materializations; `func` provides the function-like operation
//! whose signature the engine knows how to convert.

pub mod core;
pub mod func;
