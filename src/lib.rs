//! Tessera: `lmhlo` to `gpu` lowering on top of the `tessera-ir` conversion
//! engine.

pub mod dialect;
pub mod gpu_lowering;
pub mod sample;

pub use gpu_lowering::{
    GpuLowering, GpuLoweringError, GpuLoweringOptions, OneToOneLowering, PatternFamily,
    StreamifyConversionPattern,
};
