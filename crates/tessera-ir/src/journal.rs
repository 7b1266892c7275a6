//! Undo journal backing [`IrContext`](crate::IrContext) transactions.
//!
//! While at least one transaction is open, every structural mutation pushes
//! an [`Edit`] describing how to restore the previous state. Rolling back a
//! transaction replays the edits recorded after its mark in reverse order.
//!
//! Entities created inside a rolled-back transaction are not reclaimed: the
//! arena cannot shrink, so they stay behind as detached orphans that no walk
//! starting from a live operation can reach.

use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

/// The inverse of one mutation.
#[derive(Debug)]
pub(crate) enum Edit {
    CreateOp(OpRef),
    CreateBlock(BlockRef),
    CreateRegion(RegionRef),
    EraseOp(OpRef),
    InsertOp {
        block: BlockRef,
        op: OpRef,
        index: usize,
    },
    RemoveOp {
        block: BlockRef,
        op: OpRef,
        index: usize,
    },
    SetOperand {
        op: OpRef,
        index: u32,
        old: ValueRef,
    },
    SetAttr {
        op: OpRef,
        key: Symbol,
        old: Option<Attribute>,
    },
    SetBlockArgType {
        block: BlockRef,
        index: u32,
        old: TypeRef,
    },
    AddBlockArg {
        block: BlockRef,
    },
    DetachRegion {
        op: OpRef,
        index: usize,
        region: RegionRef,
    },
    AttachRegion {
        op: OpRef,
        region: RegionRef,
    },
}

/// Handle for an open transaction.
///
/// Transactions nest and must be closed in LIFO order, either through
/// [`IrContext::commit`](crate::IrContext::commit) or
/// [`IrContext::rollback`](crate::IrContext::rollback).
#[must_use = "an open transaction must be committed or rolled back"]
#[derive(Debug)]
pub struct Transaction {
    mark: usize,
    depth: usize,
}

impl Transaction {
    /// Nesting depth of this transaction, starting at 1 for the outermost.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    edits: Vec<Edit>,
    open: usize,
}

impl Journal {
    pub(crate) fn begin(&mut self) -> Transaction {
        self.open += 1;
        Transaction {
            mark: self.edits.len(),
            depth: self.open,
        }
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.open > 0
    }

    pub(crate) fn record(&mut self, edit: Edit) {
        if self.open > 0 {
            self.edits.push(edit);
        }
    }

    pub(crate) fn len_since(&self, tx: &Transaction) -> usize {
        self.edits.len().saturating_sub(tx.mark)
    }

    /// Remove and return the edits recorded after `tx`'s mark, oldest first.
    pub(crate) fn drain_to(&mut self, tx: &Transaction) -> Vec<Edit> {
        self.check_innermost(tx);
        self.edits.split_off(tx.mark)
    }

    /// Close `tx`. Once the outermost transaction closes the journal is
    /// discarded.
    pub(crate) fn close(&mut self, tx: Transaction) {
        self.check_innermost(&tx);
        self.open -= 1;
        if self.open == 0 {
            self.edits.clear();
        }
    }

    fn check_innermost(&self, tx: &Transaction) {
        assert_eq!(
            tx.depth, self.open,
            "transactions must be closed innermost first (closing depth {}, {} open)",
            tx.depth, self.open
        );
    }
}
