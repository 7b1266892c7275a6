//! `lmhlo` to `gpu` lowering.
//!
//! The pass has three parts:
//! - the streamify pre-pass wraps every run of stream operations (see
//!   [`wrap_target`]) into a `stream.streamify` op that provides a chain and
//!   a stream as block arguments;
//! - a partial conversion lowers everything the [`conversion_target`]
//!   rejects, using the patterns registered per [`PatternFamily`];
//! - memrefs become `gpu.buffer`s along the way (see [`type_converter`]).
//!
//! Either the whole module is lowered, or it is left exactly as it was and a
//! [`GpuLoweringError`] is returned.

use std::collections::BTreeMap;
use std::rc::Rc;

use derive_more::Display;
use tessera_ir::dialect::{core, func};
use tessera_ir::rewrite::{
    ConversionConfig, ConversionDriver, ConversionError, ConversionMode, ConversionSummary,
    ConversionTarget, FuncSignatureConversionPattern, Legality, PatternRewriter, PatternSet,
    RegionWrapper, ReturnConversionPattern, RewritePattern, RewriteResult, TypeConverter,
    convert_block_arg,
};
use tessera_ir::{DialectOp, IrContext, OpName, OpRef, OperationDataBuilder, Symbol};
use tracing::info;

use crate::dialect::{gpu, lmhlo, lmhlo_gpu, memref, stream};

// ============================================================================
// Pattern families
// ============================================================================

/// A group of source operations whose lowering patterns are registered
/// together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum PatternFamily {
    Collectives,
    Cholesky,
    Convolution,
    CustomCall,
    Gemm,
    InfeedOutfeed,
    ReplicaPartition,
    TriangularSolve,
    Fft,
}

impl PatternFamily {
    /// Every family, in registration order.
    pub const ALL: [PatternFamily; 9] = [
        PatternFamily::Collectives,
        PatternFamily::Cholesky,
        PatternFamily::Convolution,
        PatternFamily::CustomCall,
        PatternFamily::Gemm,
        PatternFamily::InfeedOutfeed,
        PatternFamily::ReplicaPartition,
        PatternFamily::TriangularSolve,
        PatternFamily::Fft,
    ];

    /// `(dialect, op)` pairs of the source operations in this family.
    pub fn ops(self) -> &'static [(&'static str, &'static str)] {
        match self {
            PatternFamily::Collectives => &[
                (lmhlo::DIALECT, lmhlo::ALL_GATHER),
                (lmhlo::DIALECT, lmhlo::ALL_REDUCE),
                (lmhlo::DIALECT, lmhlo::REDUCE_SCATTER),
                (lmhlo::DIALECT, lmhlo::ALL_TO_ALL),
                (lmhlo::DIALECT, lmhlo::COLLECTIVE_PERMUTE),
            ],
            PatternFamily::Cholesky => &[(lmhlo_gpu::DIALECT, lmhlo_gpu::CHOLESKY)],
            PatternFamily::Convolution => &[
                (lmhlo_gpu::DIALECT, lmhlo_gpu::CONV_FORWARD),
                (lmhlo_gpu::DIALECT, lmhlo_gpu::CONV_BACKWARD_INPUT),
                (lmhlo_gpu::DIALECT, lmhlo_gpu::CONV_BACKWARD_FILTER),
                (lmhlo_gpu::DIALECT, lmhlo_gpu::CONV_FORWARD_FUSED),
                (lmhlo_gpu::DIALECT, lmhlo_gpu::CONV_FORWARD_FUSED_SIDE_INPUT),
            ],
            PatternFamily::CustomCall => &[(lmhlo::DIALECT, lmhlo::CUSTOM_CALL)],
            PatternFamily::Gemm => &[
                (lmhlo_gpu::DIALECT, lmhlo_gpu::GEMM),
                (lmhlo_gpu::DIALECT, lmhlo_gpu::GEMM_BIAS),
            ],
            PatternFamily::InfeedOutfeed => &[
                (lmhlo::DIALECT, lmhlo::INFEED),
                (lmhlo::DIALECT, lmhlo::OUTFEED),
            ],
            PatternFamily::ReplicaPartition => &[
                (lmhlo::DIALECT, lmhlo::REPLICA_ID),
                (lmhlo::DIALECT, lmhlo::PARTITION_ID),
            ],
            PatternFamily::TriangularSolve => &[(lmhlo::DIALECT, lmhlo::TRIANGULAR_SOLVE)],
            PatternFamily::Fft => &[(lmhlo::DIALECT, lmhlo::FFT)],
        }
    }
}

/// Adds the patterns of one family to a pattern set.
pub type Populator = Box<dyn Fn(&mut PatternSet, &Rc<TypeConverter>)>;

// ============================================================================
// Options and errors
// ============================================================================

#[derive(Clone, Debug)]
pub struct GpuLoweringOptions {
    /// Run the streamify pre-pass.
    pub streamify: bool,
    /// Families whose populators run.
    pub families: Vec<PatternFamily>,
    pub mode: ConversionMode,
    pub config: ConversionConfig,
}

impl Default for GpuLoweringOptions {
    fn default() -> Self {
        Self {
            streamify: true,
            families: PatternFamily::ALL.to_vec(),
            mode: ConversionMode::Partial,
            config: ConversionConfig::default(),
        }
    }
}

#[derive(Debug, Display)]
pub enum GpuLoweringError {
    #[display("expected a `core.module`, found `{_0}`")]
    NotAModule(OpName),
    #[display("lmhlo to gpu lowering failed: {_0}")]
    Conversion(ConversionError),
}

impl From<ConversionError> for GpuLoweringError {
    fn from(error: ConversionError) -> Self {
        GpuLoweringError::Conversion(error)
    }
}

impl std::error::Error for GpuLoweringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuLoweringError::Conversion(error) => Some(error),
            GpuLoweringError::NotAModule(_) => None,
        }
    }
}

// ============================================================================
// Converter and targets
// ============================================================================

/// Every `memref.*` type becomes `gpu.buffer`; everything else is kept.
/// Mismatches are bridged with unrealized casts.
pub fn type_converter(ctx: &mut IrContext) -> TypeConverter {
    let buffer = gpu::buffer_type(ctx);
    let mut converter = TypeConverter::new().with_unrealized_casts();
    converter
        .add_conversion(move |ctx, ty| (ctx.types.get(ty).dialect == memref::DIALECT).then_some(buffer))
        .add_identity_fallback();
    converter
}

/// The ops the streamify pre-pass wraps: its *legal* set.
pub fn wrap_target() -> ConversionTarget {
    let mut target = ConversionTarget::new();
    target.add_legal_dialect(lmhlo_gpu::DIALECT);
    for &op in lmhlo::STREAM_OPS {
        target.add_legal_op(lmhlo::DIALECT, op);
    }
    target
}

/// What the lowered module may contain.
pub fn conversion_target(converter: Rc<TypeConverter>) -> ConversionTarget {
    let mut target = ConversionTarget::new();
    for &op in memref::ILLEGAL_OPS {
        target.add_illegal_op(memref::DIALECT, op);
    }

    let c = converter.clone();
    target.add_dynamically_legal_op("func", "func", move |ctx, op| {
        let signature_legal = func::Func::from_op(ctx, op)
            .and_then(|f| f.r#type(ctx))
            .is_some_and(|ty| c.is_signature_legal(ctx, ty));
        signature_legal
            && ctx
                .op(op)
                .regions
                .iter()
                .all(|&region| c.is_region_legal(ctx, region))
    });

    let c = converter.clone();
    target.add_dynamically_legal_op(stream::DIALECT, stream::STREAMIFY, move |ctx, op| {
        ctx.op(op)
            .regions
            .iter()
            .all(|&region| c.is_region_legal(ctx, region))
    });

    for name in ["call", "return"] {
        let c = converter.clone();
        target.add_dynamically_legal_op("func", name, move |ctx, op| c.is_op_legal(ctx, op));
    }

    target.add_dynamically_legal_op(memref::DIALECT, memref::LOAD, |ctx, op| {
        ctx.parent_op(op)
            .is_some_and(|parent| ctx.op_is(parent, stream::DIALECT, stream::STREAMIFY))
    });

    // Wrapped ops must be lowered right away.
    let wrap = wrap_target();
    target.mark_unknown_op_dynamically_legal(move |ctx, op| {
        wrap.legality(ctx, op) != Legality::Legal
    });

    target
}

// ============================================================================
// Patterns
// ============================================================================

/// Converts the operands of a `stream.streamify` op together with the body
/// arguments that mirror them.
pub struct StreamifyConversionPattern;

impl RewritePattern for StreamifyConversionPattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult {
        let Some(&body) = ctx.op(op).regions.first() else {
            return RewriteResult::NoMatch;
        };
        let Some(entry) = ctx.entry_block(body) else {
            return RewriteResult::NoMatch;
        };

        let operands = ctx.op_operands(op).len();
        let args = ctx.block_args(entry).len();
        if args < stream::LEADING_ARGS + operands {
            return RewriteResult::failed(format_args!(
                "body has {args} arguments, expected {} for {operands} operands",
                stream::LEADING_ARGS + operands
            ));
        }

        let mut changed = false;
        for index in 0..operands {
            let arg_index = (index + stream::LEADING_ARGS) as u32;
            let arg_ty = ctx.value_ty(ctx.block_arg(entry, arg_index));
            let Some(new_ty) = rewriter.convert_type(ctx, arg_ty) else {
                return RewriteResult::failed(format_args!(
                    "body argument {arg_index} has no conversion"
                ));
            };
            if new_ty == arg_ty {
                continue;
            }
            let Some(value) = rewriter.remap_operand(ctx, op, index) else {
                return RewriteResult::failed(format_args!("operand {index} has no conversion"));
            };
            ctx.set_operand(op, index as u32, value);
            if !convert_block_arg(ctx, rewriter, entry, arg_index, new_ty) {
                return RewriteResult::failed(format_args!(
                    "cannot materialize body argument {arg_index}"
                ));
            }
            changed = true;
        }

        if changed {
            RewriteResult::Applied
        } else {
            RewriteResult::NoMatch
        }
    }

    fn root(&self) -> Option<OpName> {
        Some(OpName::from_static(stream::DIALECT, stream::STREAMIFY))
    }

    fn name(&self) -> &'static str {
        "StreamifyConversionPattern"
    }
}

/// Replaces one op kind with another of the same shape, converting operand
/// and result types.
pub struct OneToOneLowering {
    from: OpName,
    to: OpName,
}

impl OneToOneLowering {
    pub fn new(from: OpName, to: OpName) -> Self {
        Self { from, to }
    }

    /// Lower `dialect.op` to `gpu.op`.
    pub fn to_gpu(dialect: &'static str, op: &'static str) -> Self {
        Self::new(
            OpName::from_static(dialect, op),
            OpName::new(Symbol::new(gpu::DIALECT), Symbol::new(op)),
        )
    }
}

impl RewritePattern for OneToOneLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult {
        let Some(operands) = rewriter.remapped_operands(ctx, op) else {
            return RewriteResult::failed("operand type has no conversion");
        };
        let Some(results) = rewriter.convert_result_types(ctx, op) else {
            return RewriteResult::failed("result type has no conversion");
        };
        let attrs: Vec<_> = ctx
            .op(op)
            .attributes
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        let new_op = OperationDataBuilder::named(rewriter.location(), self.to)
            .operands(operands)
            .results(results)
            .attrs(attrs)
            .create(ctx);
        rewriter.replace_op(new_op);
        RewriteResult::Applied
    }

    fn root(&self) -> Option<OpName> {
        Some(self.from)
    }

    fn name(&self) -> &'static str {
        "OneToOneLowering"
    }
}

/// Populator lowering every op of `family` one-to-one into the `gpu` dialect.
pub fn one_to_one_populator(family: PatternFamily) -> Populator {
    Box::new(move |patterns, _converter| {
        for &(dialect, op) in family.ops() {
            patterns.add(OneToOneLowering::to_gpu(dialect, op));
        }
    })
}

// ============================================================================
// Pass
// ============================================================================

/// The lowering pass. Family patterns are supplied by the caller.
pub struct GpuLowering {
    options: GpuLoweringOptions,
    populators: BTreeMap<PatternFamily, Vec<Populator>>,
}

impl GpuLowering {
    pub fn new(options: GpuLoweringOptions) -> Self {
        Self {
            options,
            populators: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &GpuLoweringOptions {
        &self.options
    }

    /// Register a populator for `family`. Populators of one family run in
    /// registration order.
    pub fn with_populator(
        mut self,
        family: PatternFamily,
        populator: impl Fn(&mut PatternSet, &Rc<TypeConverter>) + 'static,
    ) -> Self {
        self.add_populator(family, Box::new(populator));
        self
    }

    pub fn add_populator(&mut self, family: PatternFamily, populator: Populator) -> &mut Self {
        self.populators.entry(family).or_default().push(populator);
        self
    }

    /// The structural patterns followed by the enabled families' patterns.
    pub fn patterns(&self, converter: &Rc<TypeConverter>) -> PatternSet {
        let mut patterns = PatternSet::new()
            .with(FuncSignatureConversionPattern)
            .with(StreamifyConversionPattern)
            .with(ReturnConversionPattern);
        for family in PatternFamily::ALL {
            if !self.options.families.contains(&family) {
                continue;
            }
            for populate in self.populators.get(&family).into_iter().flatten() {
                populate(&mut patterns, converter);
            }
        }
        patterns
    }

    /// Lower `module` in place.
    #[tracing::instrument(level = "debug", skip_all, fields(module = %module))]
    pub fn run(
        &self,
        ctx: &mut IrContext,
        module: OpRef,
    ) -> Result<ConversionSummary, GpuLoweringError> {
        if core::Module::from_op(ctx, module).is_none() {
            return Err(GpuLoweringError::NotAModule(ctx.op_name(module)));
        }

        let converter = Rc::new(type_converter(ctx));
        let patterns = self.patterns(&converter);
        let target = conversion_target(converter.clone());
        let mut driver = ConversionDriver::new(target, patterns, converter)
            .with_mode(self.options.mode)
            .with_config(self.options.config.clone());
        if self.options.streamify {
            driver = driver.with_region_wrapper(RegionWrapper::new(wrap_target()));
        }

        let summary = driver.apply(ctx, module)?;
        info!(
            rewrites = summary.rewrites,
            wrapped_ops = summary.wrapped_ops,
            "lowered lmhlo to gpu"
        );
        Ok(summary)
    }
}

impl Default for GpuLowering {
    fn default() -> Self {
        Self::new(GpuLoweringOptions::default())
    }
}
