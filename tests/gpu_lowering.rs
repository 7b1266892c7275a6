//! End-to-end tests for the `lmhlo` to `gpu` lowering.

use insta::assert_snapshot;
use tessera::dialect::{lmhlo, memref};
use tessera::gpu_lowering::one_to_one_populator;
use tessera::sample::sample_module;
use tessera::{GpuLowering, GpuLoweringError, GpuLoweringOptions, PatternFamily};
use tessera_ir::dialect::{core, func};
use tessera_ir::printer::print_op;
use tessera_ir::rewrite::ConversionErrorKind;
use tessera_ir::walk::nested_ops_pre_order;
use tessera_ir::{
    DialectOp, IrContext, Location, OpName, OpRef, OperationDataBuilder, Span, Symbol, TypeRef,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

struct Module {
    ctx: IrContext,
    module: OpRef,
    func: func::Func,
    memref_ty: TypeRef,
}

/// `core.module @m { func.func @main(%0: memref) { <body>; func.return } }`
fn module_with(body: impl FnOnce(&mut IrContext, Location, &func::Func, TypeRef)) -> Module {
    let mut ctx = IrContext::new();
    let path = ctx.paths.intern("lowering.mlir".to_owned());
    let loc = Location::new(path, Span::new(0, 0));
    let f32_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("f32"));
    let memref_ty = memref::memref_type(&mut ctx, f32_ty, &[4]);
    let nil = core::nil_type(&mut ctx);

    let module = core::module(&mut ctx, loc, Symbol::new("m"));
    let f = func::func(&mut ctx, loc, Symbol::new("main"), &[memref_ty], nil);
    body(&mut ctx, loc, &f, memref_ty);
    let entry = f.entry_block(&ctx);
    let ret = func::r#return(&mut ctx, loc, &[]);
    ctx.push_op(entry, ret.op_ref());
    module.push(&mut ctx, f.op_ref());

    Module {
        ctx,
        module: module.op_ref(),
        func: f,
        memref_ty,
    }
}

/// Body consisting of `lmhlo.fft %0`.
fn fft_module() -> Module {
    module_with(|ctx, loc, f, _| {
        let entry = f.entry_block(ctx);
        let arg = ctx.block_arg(entry, 0);
        let fft = OperationDataBuilder::new(loc, Symbol::new(lmhlo::DIALECT), Symbol::new(lmhlo::FFT))
            .operand(arg)
            .create(ctx);
        ctx.push_op(entry, fft);
    })
}

fn with_fft_patterns(options: GpuLoweringOptions) -> GpuLowering {
    GpuLowering::new(options).with_populator(PatternFamily::Fft, one_to_one_populator(PatternFamily::Fft))
}

#[test]
fn wrapped_fft_is_lowered_and_casts_fold() {
    init_tracing();
    let mut m = fft_module();

    let summary = with_fft_patterns(GpuLoweringOptions::default())
        .run(&mut m.ctx, m.module)
        .unwrap();

    assert_eq!(summary.wrapped_ops, 1);
    assert_eq!(summary.rewrites, 3);
    assert_eq!(summary.passes, 2);
    assert_eq!(summary.materializations, 4);
    assert_eq!(summary.folded_casts, 4);
    assert_snapshot!(print_op(&m.ctx, m.module), @r"
    core.module {sym_name = @m} {
      func.func {sym_name = @main, type = func.fn(core.nil, gpu.buffer)} {
        ^bb0(%0: gpu.buffer):
          stream.streamify %0 {
            ^bb1(%1: stream.chain, %2: stream.stream, %3: gpu.buffer):
              gpu.fft %3
              stream.yield %1
          }
          func.return
      }
    }
    ");
}

#[test]
fn lowering_without_streamify_keeps_ops_in_place() {
    let mut m = fft_module();
    let options = GpuLoweringOptions {
        streamify: false,
        ..Default::default()
    };

    let summary = with_fft_patterns(options).run(&mut m.ctx, m.module).unwrap();

    assert_eq!(summary.wrapped_ops, 0);
    assert_snapshot!(print_op(&m.ctx, m.func.op_ref()), @r"
    func.func {sym_name = @main, type = func.fn(core.nil, gpu.buffer)} {
      ^bb0(%0: gpu.buffer):
        gpu.fft %0
        func.return
    }
    ");
}

#[test]
fn wrapped_op_without_patterns_stalls_and_rolls_back() {
    init_tracing();
    let mut m = fft_module();
    let before = print_op(&m.ctx, m.module);

    let err = GpuLowering::default().run(&mut m.ctx, m.module).unwrap_err();

    let GpuLoweringError::Conversion(err) = &err else {
        panic!("expected a conversion error, got {err}");
    };
    assert!(matches!(
        err.kind(),
        ConversionErrorKind::StalledLegalization { op, pending: 3, .. }
            if *op == OpName::from_static(lmhlo::DIALECT, lmhlo::FFT)
    ));
    assert_eq!(print_op(&m.ctx, m.module), before);
}

#[test]
fn disabled_family_contributes_nothing() {
    let mut m = fft_module();
    let before = print_op(&m.ctx, m.module);
    let options = GpuLoweringOptions {
        families: vec![PatternFamily::Gemm],
        ..Default::default()
    };

    let err = with_fft_patterns(options).run(&mut m.ctx, m.module).unwrap_err();

    assert!(matches!(err, GpuLoweringError::Conversion(_)));
    assert_eq!(print_op(&m.ctx, m.module), before);
}

#[test]
fn allocation_without_pattern_is_reported() {
    let mut m = module_with(|ctx, loc, f, memref_ty| {
        let alloc =
            OperationDataBuilder::new(loc, Symbol::new(memref::DIALECT), Symbol::new(memref::ALLOC))
                .result(memref_ty)
                .create(ctx);
        ctx.push_op(f.entry_block(ctx), alloc);
    });
    let before = print_op(&m.ctx, m.module);

    let err = GpuLowering::default().run(&mut m.ctx, m.module).unwrap_err();

    let GpuLoweringError::Conversion(err) = &err else {
        panic!("expected a conversion error, got {err}");
    };
    assert!(matches!(
        err.kind(),
        ConversionErrorKind::StalledLegalization { op, pending: 2, rendered }
            if *op == OpName::from_static(memref::DIALECT, memref::ALLOC)
                && rendered.contains("memref.alloc")
    ));
    assert!(err.to_string().starts_with("failed to legalize `memref.alloc`"));
    assert_eq!(print_op(&m.ctx, m.module), before);
    assert_eq!(m.ctx.value_ty(m.ctx.block_arg(m.func.entry_block(&m.ctx), 0)), m.memref_ty);
}

#[test]
fn root_must_be_a_module() {
    let mut m = fft_module();
    let func_op = m.func.op_ref();

    let err = GpuLowering::default().run(&mut m.ctx, func_op).unwrap_err();

    assert!(matches!(err, GpuLoweringError::NotAModule(name) if name == func::Func::op_name()));
    assert_eq!(err.to_string(), "expected a `core.module`, found `func.func`");
}

#[test]
fn sample_module_lowers_with_every_family() {
    let mut ctx = IrContext::new();
    let module = sample_module(&mut ctx);
    let mut lowering = GpuLowering::default();
    for family in PatternFamily::ALL {
        lowering.add_populator(family, one_to_one_populator(family));
    }

    let summary = lowering.run(&mut ctx, module).unwrap();

    assert_eq!(summary.wrapped_ops, 3);
    let names: Vec<String> = nested_ops_pre_order(&ctx, module)
        .into_iter()
        .map(|op| ctx.op_name(op).to_string())
        .collect();
    assert_eq!(
        names,
        [
            "func.func",
            "core.unrealized_conversion_cast",
            "stream.streamify",
            "gpu.fft",
            "gpu.all_reduce",
            "stream.yield",
            "lmhlo.add",
            "stream.streamify",
            "gpu.replica_id",
            "stream.yield",
            "func.return",
        ]
    );
}

proptest::proptest! {
    #[test]
    fn only_enabled_families_add_patterns(
        families in proptest::sample::subsequence(PatternFamily::ALL.to_vec(), 0..=PatternFamily::ALL.len())
    ) {
        let mut ctx = IrContext::new();
        let converter = std::rc::Rc::new(tessera::gpu_lowering::type_converter(&mut ctx));
        let mut lowering = GpuLowering::new(GpuLoweringOptions {
            families: families.clone(),
            ..Default::default()
        });
        for family in PatternFamily::ALL {
            lowering.add_populator(family, one_to_one_populator(family));
        }

        let patterns = lowering.patterns(&converter);

        let expected: usize = families.iter().map(|family| family.ops().len()).sum();
        proptest::prop_assert_eq!(patterns.len(), 3 + expected);
    }
}
