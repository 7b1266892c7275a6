//! A small `lmhlo` module for trying the lowering from the command line.

use tessera_ir::dialect::{core, func};
use tessera_ir::{DialectOp, IrContext, Location, OpRef, OperationDataBuilder, Span, Symbol};

use crate::dialect::{lmhlo, memref};

/// Build and return a `core.module` holding:
///
/// ```text
/// func.func @main(%input: memref, %output: memref) {
///   lmhlo.fft %input, %output
///   lmhlo.all_reduce %output, %output
///   lmhlo.add %output, %output, %output
///   lmhlo.replica_id %output
///   func.return
/// }
/// ```
pub fn sample_module(ctx: &mut IrContext) -> OpRef {
    let path = ctx.paths.intern("sample.mlir".to_owned());
    let loc = Location::new(path, Span::new(0, 0));
    let f32_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("f32"));
    let buffer = memref::memref_type(ctx, f32_ty, &[16]);
    let nil = core::nil_type(ctx);

    let module = core::module(ctx, loc, Symbol::new("sample"));
    let main = func::func(ctx, loc, Symbol::new("main"), &[buffer, buffer], nil);
    let entry = main.entry_block(ctx);
    let input = ctx.block_arg(entry, 0);
    let output = ctx.block_arg(entry, 1);

    let body: [(&str, Vec<_>); 4] = [
        (lmhlo::FFT, vec![input, output]),
        (lmhlo::ALL_REDUCE, vec![output, output]),
        ("add", vec![output, output, output]),
        (lmhlo::REPLICA_ID, vec![output]),
    ];
    for (name, operands) in body {
        let op = OperationDataBuilder::new(loc, Symbol::new(lmhlo::DIALECT), Symbol::from_dynamic(name))
            .operands(operands)
            .create(ctx);
        ctx.push_op(entry, op);
    }
    let ret = func::r#return(ctx, loc, &[]);
    ctx.push_op(entry, ret.op_ref());
    module.push(ctx, main.op_ref());
    module.op_ref()
}
