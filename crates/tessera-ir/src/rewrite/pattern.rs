//! Rewrite pattern trait and ordered pattern sets.

use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::OpName;

/// Outcome of one pattern attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RewriteResult {
    /// The pattern does not apply. Any IR it created is discarded.
    NoMatch,
    /// The pattern rewrote the operation (through the rewriter or in place).
    Applied,
    /// The pattern started rewriting and cannot finish. Aborts the whole
    /// conversion.
    Failed(String),
}

impl RewriteResult {
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        RewriteResult::Failed(reason.to_string())
    }
}

/// A pattern that can match and transform one operation.
///
/// # Arguments
///
/// - `ctx`: Mutable reference to the IR context for querying and mutation.
/// - `op`: The operation to match against.
/// - `rewriter`: Accumulates mutations (replace, insert, erase) and gives
///   access to the type converter.
pub trait RewritePattern {
    /// Attempt to match and rewrite an operation.
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter<'_>,
    ) -> RewriteResult;

    /// The operation kind this pattern is rooted at; `None` matches any kind.
    fn root(&self) -> Option<OpName> {
        None
    }

    /// Higher benefit patterns are tried first.
    fn benefit(&self) -> u16 {
        1
    }

    /// Optional: return a human-readable name for debugging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An ordered collection of rewrite patterns.
///
/// Patterns are kept sorted by descending benefit; patterns with equal
/// benefit keep their registration order.
#[derive(Default)]
pub struct PatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern.
    pub fn add(&mut self, pattern: impl RewritePattern + 'static) -> &mut Self {
        self.add_boxed(Box::new(pattern))
    }

    /// Add an already boxed pattern.
    pub fn add_boxed(&mut self, pattern: Box<dyn RewritePattern>) -> &mut Self {
        let benefit = pattern.benefit();
        let pos = self
            .patterns
            .iter()
            .position(|p| p.benefit() < benefit)
            .unwrap_or(self.patterns.len());
        self.patterns.insert(pos, pattern);
        self
    }

    /// Builder-style variant of [`PatternSet::add`].
    pub fn with(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.add(pattern);
        self
    }

    /// Patterns applicable to an operation of kind `name`, in the order they
    /// must be tried.
    pub fn candidates(&self, name: OpName) -> impl Iterator<Item = &dyn RewritePattern> + '_ {
        self.patterns
            .iter()
            .map(|p| p.as_ref())
            .filter(move |p| p.root().is_none_or(|root| root == name))
    }

    /// All patterns in application order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn RewritePattern> + '_ {
        self.patterns.iter().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
