//! Text format printer for the IR.
//!
//! ```text
//! func.func {sym_name = @main, type = func.fn(core.i32, src.t)} {
//!   ^bb0(%0: src.t):
//!     %1 = src.op %0 : src.t
//!     func.return %1
//! }
//! ```
//!
//! Values and blocks are numbered in print order, so two structurally
//! identical trees print identically regardless of their arena indices.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fmt::Write;

use crate::context::IrContext;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

/// Print state for value numbering and block labeling.
struct PrintState<'a> {
    ctx: &'a IrContext,
    value_names: HashMap<ValueRef, String>,
    next_value_num: usize,
    next_block_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(ctx: &'a IrContext) -> Self {
        Self {
            ctx,
            value_names: HashMap::new(),
            next_value_num: 0,
            next_block_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: ValueRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    fn get_value_name(&self, v: ValueRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn next_block_label(&mut self) -> String {
        let label = format!("^bb{}", self.next_block_num);
        self.next_block_num += 1;
        label
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print an operation (and everything nested in it) as IR text.
pub fn print_op(ctx: &IrContext, op: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, op, 0).expect("fmt::Write to String never fails");
    out
}

/// Print a type as IR text.
pub fn print_type(ctx: &IrContext, ty: TypeRef) -> String {
    let mut out = String::new();
    write_type(ctx, &mut out, ty).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type printing
// ============================================================================

fn write_type(ctx: &IrContext, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    let data = ctx.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        for (i, &param) in data.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(ctx, f, param)?;
        }
        f.write_char(')')?;
    } else if !data.attrs.is_empty() {
        // Empty parens signal that attrs follow
        f.write_str("()")?;
    }
    if !data.attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in sorted_attrs(&data.attrs).into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = ", key)?;
            write_attribute(ctx, f, val)?;
        }
        f.write_char('}')?;
    }
    Ok(())
}

// ============================================================================
// Attribute printing
// ============================================================================

fn write_attribute(ctx: &IrContext, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => f.write_str("unit"),
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::IntBits(v) => write!(f, "{v}"),
        Attribute::FloatBits(bits) => {
            let v = f64::from_bits(*bits);
            let s = format!("{v}");
            f.write_str(&s)?;
            if v.is_finite() && !s.contains('.') && !s.contains('e') && !s.contains('E') {
                f.write_str(".0")?;
            }
            Ok(())
        }
        Attribute::String(s) => {
            f.write_char('"')?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        }
        Attribute::Symbol(sym) => write_symbol(f, *sym),
        Attribute::Type(ty) => write_type(ctx, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(ctx, f, item)?;
            }
            f.write_char(']')
        }
    }
}

/// Attributes in name order. Map order follows interning order, which is
/// not stable across runs.
fn sorted_attrs(attrs: &BTreeMap<Symbol, Attribute>) -> Vec<(String, &Attribute)> {
    let mut sorted: Vec<(String, &Attribute)> =
        attrs.iter().map(|(k, v)| (k.to_string(), v)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_symbol(f: &mut impl Write, sym: Symbol) -> fmt::Result {
    sym.with_str(|s| {
        let needs_quoting = s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_');
        if needs_quoting {
            f.write_str("@\"")?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        } else {
            write!(f, "@{s}")
        }
    })
}

// ============================================================================
// Operation printing
// ============================================================================

fn print_operation(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    write!(f, "{indent_str}")?;

    // Results
    let results = state.ctx.op_results(op);
    if !results.is_empty() {
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(v);
            f.write_str(&name)?;
        }
        f.write_str(" = ")?;
    }

    let data = state.ctx.op(op);
    write!(f, "{}.{}", data.dialect, data.name)?;

    // Operands
    let operands = state.ctx.op_operands(op);
    if !operands.is_empty() {
        f.write_char(' ')?;
        for (i, &v) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_value_name(v))?;
        }
    }

    // Attributes
    let attrs = &state.ctx.op(op).attributes;
    if !attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in sorted_attrs(attrs).into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(state.ctx, f, val)?;
        }
        f.write_char('}')?;
    }

    // Result types
    let result_types = state.ctx.op_result_types(op);
    if !result_types.is_empty() {
        f.write_str(" : ")?;
        for (i, &ty) in result_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(state.ctx, f, ty)?;
        }
    }

    // Regions
    let regions = state.ctx.op(op).regions.clone();
    for region in regions {
        f.write_str(" {\n")?;
        print_region(state, f, region, indent + 2)?;
        write!(f, "{indent_str}}}")?;
    }

    f.write_char('\n')
}

fn print_region(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    region: RegionRef,
    indent: usize,
) -> fmt::Result {
    let blocks: Vec<BlockRef> = state.ctx.region(region).blocks.iter().copied().collect();
    let can_elide_label = blocks.len() == 1 && state.ctx.block_args(blocks[0]).is_empty();

    for block in blocks {
        let body_indent = if can_elide_label {
            indent
        } else {
            let label = state.next_block_label();
            write!(f, "{}{label}", " ".repeat(indent))?;
            let args: Vec<ValueRef> = state.ctx.block_args(block).to_vec();
            if !args.is_empty() {
                f.write_char('(')?;
                for (j, arg) in args.into_iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    let arg_name = state.assign_value_name(arg);
                    write!(f, "{arg_name}: ")?;
                    write_type(state.ctx, f, state.ctx.value_ty(arg))?;
                }
                f.write_char(')')?;
            }
            f.write_str(":\n")?;
            indent + 2
        };

        let ops: Vec<OpRef> = state.ctx.block(block).ops.iter().copied().collect();
        for op in ops {
            print_operation(state, f, op, body_indent)?;
        }
    }

    Ok(())
}
