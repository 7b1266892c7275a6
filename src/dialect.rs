//! Names of the dialects the GPU lowering pass reads and writes.
//!
//! Only names live here. Operation semantics belong to the patterns that
//! callers register per [`PatternFamily`](crate::gpu_lowering::PatternFamily).

pub mod lmhlo {
    //! Buffer-level HLO operations.

    pub const DIALECT: &str = "lmhlo";

    pub const ALL_GATHER: &str = "all_gather";
    pub const ALL_REDUCE: &str = "all_reduce";
    pub const REDUCE_SCATTER: &str = "reduce_scatter";
    pub const ALL_TO_ALL: &str = "all_to_all";
    pub const COLLECTIVE_PERMUTE: &str = "collective_permute";
    pub const CUSTOM_CALL: &str = "custom_call";
    pub const TRIANGULAR_SOLVE: &str = "triangular_solve";
    pub const REPLICA_ID: &str = "replica_id";
    pub const PARTITION_ID: &str = "partition_id";
    pub const INFEED: &str = "infeed";
    pub const OUTFEED: &str = "outfeed";
    pub const FFT: &str = "fft";

    /// Ops that lower directly to stream-based GPU operations and therefore
    /// need a chain and a stream from an enclosing wrapper.
    pub const STREAM_OPS: &[&str] = &[
        ALL_GATHER,
        ALL_REDUCE,
        REDUCE_SCATTER,
        ALL_TO_ALL,
        COLLECTIVE_PERMUTE,
        CUSTOM_CALL,
        TRIANGULAR_SOLVE,
        REPLICA_ID,
        PARTITION_ID,
        INFEED,
        OUTFEED,
        FFT,
    ];
}

pub mod lmhlo_gpu {
    //! GPU-specific buffer-level operations. Every op of this dialect needs
    //! wrapping.

    pub const DIALECT: &str = "lmhlo_gpu";

    pub const CONV_FORWARD: &str = "conv_forward";
    pub const CONV_BACKWARD_INPUT: &str = "conv_backward_input";
    pub const CONV_BACKWARD_FILTER: &str = "conv_backward_filter";
    pub const CONV_FORWARD_FUSED: &str = "conv_forward_fused";
    pub const CONV_FORWARD_FUSED_SIDE_INPUT: &str = "conv_forward_fused_with_side_input";
    pub const GEMM: &str = "gemm";
    pub const GEMM_BIAS: &str = "gemm_bias";
    pub const CHOLESKY: &str = "cholesky";
}

pub mod memref {
    //! Memory references.

    use tessera_ir::{Attribute, IrContext, Symbol, TypeDataBuilder, TypeRef};

    pub const DIALECT: &str = "memref";

    pub const ALLOC: &str = "alloc";
    pub const ALLOCA: &str = "alloca";
    pub const DEALLOC: &str = "dealloc";
    pub const VIEW: &str = "view";
    pub const REINTERPRET_CAST: &str = "reinterpret_cast";
    pub const LOAD: &str = "load";

    /// Ops the lowering must remove.
    pub const ILLEGAL_OPS: &[&str] = &[REINTERPRET_CAST, VIEW, ALLOCA, ALLOC, DEALLOC];

    /// Intern `memref.memref(element) {shape = [...]}`.
    pub fn memref_type(ctx: &mut IrContext, element: TypeRef, shape: &[u64]) -> TypeRef {
        ctx.types.intern(
            TypeDataBuilder::new(Symbol::new(DIALECT), Symbol::new("memref"))
                .param(element)
                .attr(
                    "shape",
                    Attribute::List(shape.iter().map(|&d| Attribute::IntBits(d)).collect()),
                )
                .build(),
        )
    }
}

pub mod gpu {
    //! Target-side GPU operations and types.

    use tessera_ir::{IrContext, Symbol, TypeRef};

    pub const DIALECT: &str = "gpu";

    /// `gpu.buffer`, the lowered form of every memref.
    pub fn buffer_type(ctx: &mut IrContext) -> TypeRef {
        ctx.types.simple(Symbol::new(DIALECT), Symbol::new("buffer"))
    }
}

pub mod stream {
    //! The wrapper produced by the streamify pre-pass.

    pub const DIALECT: &str = "stream";
    pub const STREAMIFY: &str = "streamify";
    pub const YIELD: &str = "yield";

    /// Leading block arguments of a wrapper body (chain, stream).
    pub const LEADING_ARGS: usize = 2;
}
