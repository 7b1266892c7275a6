//! Shared fixtures for the conversion integration tests.

use std::rc::Rc;

use tessera_ir::dialect::{core, func};
use tessera_ir::rewrite::{
    ConversionTarget, PatternRewriter, RewritePattern, RewriteResult, TypeConverter,
};
use tessera_ir::{DialectOp, IrContext, Location, OpName, OpRef, OperationDataBuilder, Span, Symbol, TypeRef};

/// Install a test-writer subscriber so `tracing` output shows up in failing
/// tests. Safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

pub struct Graph {
    pub ctx: IrContext,
    pub loc: Location,
    pub module: OpRef,
    pub func: OpRef,
    pub src_ty: TypeRef,
    pub dst_ty: TypeRef,
}

/// A module holding `func.func @f(%0: ty) -> ty` whose body chains `ops`
/// on `%0` (each op takes the previous value and yields `ty`) and returns
/// the last value.
#[allow(dead_code)]
pub fn chain(ty_is_src: bool, ops: &[String]) -> Graph {
    let mut ctx = IrContext::new();
    let path = ctx.paths.intern("conversion.mlir".to_owned());
    let loc = Location::new(path, Span::new(0, 0));
    let src_ty = ctx.types.simple(Symbol::new("src"), Symbol::new("t"));
    let dst_ty = ctx.types.simple(Symbol::new("dst"), Symbol::new("t"));
    let i32_ty = ctx.types.simple(Symbol::new("core"), Symbol::new("i32"));
    let ty = if ty_is_src { src_ty } else { i32_ty };

    let module = core::module(&mut ctx, loc, Symbol::new("m"));
    let f = func::func(&mut ctx, loc, Symbol::new("f"), &[ty], ty);
    let entry = f.entry_block(&ctx);
    let mut value = ctx.block_arg(entry, 0);
    for name in ops {
        let name = OpName::parse(name).expect("qualified op name");
        let op = OperationDataBuilder::named(loc, name)
            .operand(value)
            .result(ty)
            .create(&mut ctx);
        ctx.push_op(entry, op);
        value = ctx.op_result(op, 0);
    }
    let ret = func::r#return(&mut ctx, loc, &[value]);
    ctx.push_op(entry, ret.op_ref());
    module.push(&mut ctx, f.op_ref());

    Graph {
        ctx,
        loc,
        module: module.op_ref(),
        func: f.op_ref(),
        src_ty,
        dst_ty,
    }
}

/// `src.*` illegal, `dst.*` and `func.*` legal, except a `func.return` of a
/// `src` value.
#[allow(dead_code)]
pub fn src_to_dst_target() -> ConversionTarget {
    let mut target = ConversionTarget::new();
    target
        .add_legal_dialect("dst")
        .add_legal_dialect("func")
        .add_illegal_dialect("src")
        .add_dynamically_legal_op("func", "return", |ctx, op| {
            ctx.op_operands(op)
                .iter()
                .all(|&v| ctx.types.get(ctx.value_ty(v)).dialect != "src")
        });
    target
}

/// Maps `src` to `dst`, everything else to itself, bridging with casts.
#[allow(dead_code)]
pub fn src_to_dst_converter(src: TypeRef, dst: TypeRef) -> Rc<TypeConverter> {
    let mut converter = TypeConverter::new().with_unrealized_casts();
    converter
        .add_conversion(move |_, ty| (ty == src).then_some(dst))
        .add_identity_fallback();
    Rc::new(converter)
}

/// Replaces `from` with `to`, remapping operands and converting results.
pub struct Rename {
    pub from: OpName,
    pub to: OpName,
}

impl Rename {
    #[allow(dead_code)]
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: OpName::parse(from).expect("qualified op name"),
            to: OpName::parse(to).expect("qualified op name"),
        }
    }
}

impl RewritePattern for Rename {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult {
        let Some(operands) = rewriter.remapped_operands(ctx, op) else {
            return RewriteResult::failed("operand has no conversion");
        };
        let Some(results) = rewriter.convert_result_types(ctx, op) else {
            return RewriteResult::failed("result has no conversion");
        };
        let new_op = OperationDataBuilder::named(rewriter.location(), self.to)
            .operands(operands)
            .results(results)
            .create(ctx);
        rewriter.replace_op(new_op);
        RewriteResult::Applied
    }

    fn root(&self) -> Option<OpName> {
        Some(self.from)
    }

    fn name(&self) -> &'static str {
        "Rename"
    }
}
