//! Conversion target.
//!
//! Defines legality rules for dialect conversion: which operations/dialects
//! are legal, illegal, or dynamically checked.

use std::collections::HashMap;
use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::refs::{OpRef, RegionRef};
use crate::symbol::{OpName, Symbol};
use crate::walk;

/// Result of a legality query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    /// The operation is legal (no conversion needed).
    Legal,
    /// The operation is illegal (must be converted).
    Illegal,
    /// No rule covers the operation.
    Unknown,
}

/// Dynamic legality predicate. Must be a pure function of the operation's
/// current state.
type DynamicLegalityFn = dyn Fn(&IrContext, OpRef) -> bool;

enum Rule {
    Legal,
    Illegal,
    Dynamic(Box<DynamicLegalityFn>),
}

impl Rule {
    fn evaluate(&self, ctx: &IrContext, op: OpRef) -> Legality {
        match self {
            Rule::Legal => Legality::Legal,
            Rule::Illegal => Legality::Illegal,
            Rule::Dynamic(pred) => {
                if pred(ctx, op) {
                    Legality::Legal
                } else {
                    Legality::Illegal
                }
            }
        }
    }
}

/// Conversion target: defines which ops/dialects are legal or illegal.
///
/// Rules are never cached; every query re-evaluates against the current IR.
/// Registering a second rule for the same op or dialect replaces the first.
#[derive(Default)]
pub struct ConversionTarget {
    op_rules: HashMap<OpName, Rule>,
    dialect_rules: HashMap<Symbol, Rule>,
    fallback: Option<Box<DynamicLegalityFn>>,
}

impl ConversionTarget {
    /// Create a new empty conversion target (every operation is `Unknown`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an entire dialect as legal.
    pub fn add_legal_dialect(&mut self, dialect: &str) -> &mut Self {
        self.dialect_rules
            .insert(Symbol::from_dynamic(dialect), Rule::Legal);
        self
    }

    /// Mark an entire dialect as illegal.
    pub fn add_illegal_dialect(&mut self, dialect: &str) -> &mut Self {
        self.dialect_rules
            .insert(Symbol::from_dynamic(dialect), Rule::Illegal);
        self
    }

    /// Decide legality of every op in a dialect with a predicate.
    pub fn add_dynamically_legal_dialect(
        &mut self,
        dialect: &str,
        f: impl Fn(&IrContext, OpRef) -> bool + 'static,
    ) -> &mut Self {
        self.dialect_rules
            .insert(Symbol::from_dynamic(dialect), Rule::Dynamic(Box::new(f)));
        self
    }

    /// Mark a specific operation as legal.
    pub fn add_legal_op(&mut self, dialect: &str, op_name: &str) -> &mut Self {
        self.op_rules.insert(op_key(dialect, op_name), Rule::Legal);
        self
    }

    /// Mark a specific operation as illegal.
    pub fn add_illegal_op(&mut self, dialect: &str, op_name: &str) -> &mut Self {
        self.op_rules.insert(op_key(dialect, op_name), Rule::Illegal);
        self
    }

    /// Decide legality of a specific operation with a predicate.
    pub fn add_dynamically_legal_op(
        &mut self,
        dialect: &str,
        op_name: &str,
        f: impl Fn(&IrContext, OpRef) -> bool + 'static,
    ) -> &mut Self {
        self.op_rules
            .insert(op_key(dialect, op_name), Rule::Dynamic(Box::new(f)));
        self
    }

    /// Decide legality of operations no op or dialect rule covers.
    pub fn mark_unknown_op_dynamically_legal(
        &mut self,
        f: impl Fn(&IrContext, OpRef) -> bool + 'static,
    ) -> &mut Self {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Classify an operation.
    ///
    /// Resolution order:
    /// 1. Specific op rule
    /// 2. Dialect rule
    /// 3. Unknown-op predicate
    /// 4. `Unknown`
    pub fn legality(&self, ctx: &IrContext, op: OpRef) -> Legality {
        let name = ctx.op_name(op);
        if let Some(rule) = self.op_rules.get(&name) {
            return rule.evaluate(ctx, op);
        }
        if let Some(rule) = self.dialect_rules.get(&name.dialect) {
            return rule.evaluate(ctx, op);
        }
        match &self.fallback {
            Some(pred) if pred(ctx, op) => Legality::Legal,
            Some(_) => Legality::Illegal,
            None => Legality::Unknown,
        }
    }

    /// Partial-conversion legality: `Unknown` operations are legal.
    pub fn is_legal(&self, ctx: &IrContext, op: OpRef) -> bool {
        self.legality(ctx, op) != Legality::Illegal
    }

    /// Full-conversion legality: only explicitly legal operations are legal.
    pub fn is_legal_strict(&self, ctx: &IrContext, op: OpRef) -> bool {
        self.legality(ctx, op) == Legality::Legal
    }

    /// Walk `region` and report every operation classified as illegal.
    pub fn find_illegal_ops(&self, ctx: &IrContext, region: RegionRef) -> Vec<IllegalOp> {
        let mut illegal = Vec::new();

        let _ = walk::walk_region::<()>(ctx, region, &mut |op| {
            if self.legality(ctx, op) == Legality::Illegal {
                illegal.push(IllegalOp {
                    op,
                    name: ctx.op_name(op),
                });
            }
            ControlFlow::Continue(walk::WalkAction::Advance)
        });

        illegal
    }
}

fn op_key(dialect: &str, op_name: &str) -> OpName {
    OpName::new(Symbol::from_dynamic(dialect), Symbol::from_dynamic(op_name))
}

/// An illegal operation found during verification.
#[derive(Debug)]
pub struct IllegalOp {
    pub op: OpRef,
    pub name: OpName,
}

impl std::fmt::Display for IllegalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BlockData, OperationDataBuilder, RegionData};
    use crate::location::Span;
    use crate::refs::PathRef;
    use crate::types::{Attribute, Location};
    use smallvec::smallvec;

    fn make_op(ctx: &mut IrContext, dialect: &'static str, name: &'static str) -> OpRef {
        let loc = Location::new(PathRef::from_u32(0), Span::default());
        OperationDataBuilder::new(loc, Symbol::new(dialect), Symbol::new(name)).create(ctx)
    }

    #[test]
    fn op_rule_beats_dialect_rule() {
        let mut ctx = IrContext::new();
        let alloc = make_op(&mut ctx, "memref", "alloc");
        let load = make_op(&mut ctx, "memref", "load");

        let mut target = ConversionTarget::new();
        target
            .add_legal_dialect("memref")
            .add_illegal_op("memref", "alloc");

        assert_eq!(target.legality(&ctx, alloc), Legality::Illegal);
        assert_eq!(target.legality(&ctx, load), Legality::Legal);
    }

    #[test]
    fn op_rules_override_a_dynamic_dialect_rule() {
        let mut ctx = IrContext::new();
        let alloc = make_op(&mut ctx, "memref", "alloc");
        let load = make_op(&mut ctx, "memref", "load");
        let store = make_op(&mut ctx, "memref", "store");
        let copy = make_op(&mut ctx, "memref", "copy");

        let mut target = ConversionTarget::new();
        target
            .add_dynamically_legal_dialect("memref", |ctx, op| {
                ctx.op_attr(op, Symbol::new("lowered")).is_some()
            })
            .add_illegal_op("memref", "alloc")
            .add_legal_op("memref", "load");
        for op in [alloc, load, store] {
            ctx.set_attr(op, Symbol::new("lowered"), Attribute::Unit);
        }

        assert_eq!(target.legality(&ctx, alloc), Legality::Illegal);
        assert_eq!(target.legality(&ctx, load), Legality::Legal);
        assert_eq!(target.legality(&ctx, store), Legality::Legal);
        assert_eq!(target.legality(&ctx, copy), Legality::Illegal);
    }

    #[test]
    fn dynamic_rule_sees_current_state() {
        let mut ctx = IrContext::new();
        let op = make_op(&mut ctx, "test", "flagged");

        let mut target = ConversionTarget::new();
        target.add_dynamically_legal_op("test", "flagged", |ctx, op| {
            ctx.op_attr(op, Symbol::new("done")).is_some()
        });
        assert!(!target.is_legal(&ctx, op));

        ctx.set_attr(op, Symbol::new("done"), Attribute::Unit);
        assert!(target.is_legal(&ctx, op));
    }

    #[test]
    fn unknown_ops_depend_on_mode_and_fallback() {
        let mut ctx = IrContext::new();
        let op = make_op(&mut ctx, "other", "thing");

        let mut target = ConversionTarget::new();
        assert_eq!(target.legality(&ctx, op), Legality::Unknown);
        assert!(target.is_legal(&ctx, op));
        assert!(!target.is_legal_strict(&ctx, op));

        target.mark_unknown_op_dynamically_legal(|ctx, op| ctx.op_name(op).name != "thing");
        assert_eq!(target.legality(&ctx, op), Legality::Illegal);
    }

    #[test]
    fn find_illegal_ops_walks_nested_regions() {
        let mut ctx = IrContext::new();
        let loc = Location::new(PathRef::from_u32(0), Span::default());
        let bad = make_op(&mut ctx, "src", "op");
        let good = make_op(&mut ctx, "dst", "op");
        let block = ctx.create_block(BlockData {
            location: loc,
            args: vec![],
            ops: smallvec![good, bad],
            parent_region: None,
        });
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });

        let mut target = ConversionTarget::new();
        target.add_illegal_dialect("src").add_legal_dialect("dst");

        let illegal = target.find_illegal_ops(&ctx, region);
        assert_eq!(illegal.len(), 1);
        assert_eq!(illegal[0].op, bad);
        assert_eq!(illegal[0].to_string(), format!("src.op ({bad})"));
    }
}
