//! IrContext: arena-based mutable IR storage.
//!
//! All IR entities (operations, values, blocks, regions) are stored in
//! `PrimaryMap`s owned by `IrContext`. Operand and result lists use
//! `EntityList + ListPool` for compact 4-byte per-field storage.
//!
//! Every structural mutation goes through a method on `IrContext` so the
//! use-chains stay in sync and, while a transaction is open, the inverse of
//! the mutation is recorded in the journal (see [`crate::journal`]).

use std::collections::BTreeMap;

use cranelift_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::journal::{Edit, Journal, Transaction};
use crate::refs::*;
use crate::symbol::{OpName, Symbol};
use crate::types::*;

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: which operation uses it, at which operand index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: OpRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single operation in the arena.
pub struct OperationData {
    pub location: Location,
    pub dialect: Symbol,
    pub name: Symbol,
    pub operands: EntityList<ValueRef>,
    pub results: EntityList<TypeRef>,
    pub attributes: BTreeMap<Symbol, Attribute>,
    pub regions: SmallVec<[RegionRef; 4]>,
    pub parent_block: Option<BlockRef>,
}

/// Data for a single SSA value.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
}

/// Data for a block argument (type + optional attributes).
#[derive(Clone, Debug)]
pub struct BlockArgData {
    pub ty: TypeRef,
    pub attrs: BTreeMap<Symbol, Attribute>,
}

impl BlockArgData {
    pub fn new(ty: TypeRef) -> Self {
        Self {
            ty,
            attrs: BTreeMap::new(),
        }
    }
}

/// Data for a basic block.
pub struct BlockData {
    pub location: Location,
    pub args: Vec<BlockArgData>,
    pub ops: SmallVec<[OpRef; 4]>,
    pub parent_region: Option<RegionRef>,
}

/// Data for a region (list of blocks).
pub struct RegionData {
    pub location: Location,
    pub blocks: SmallVec<[BlockRef; 4]>,
    pub parent_op: Option<OpRef>,
}

// ============================================================================
// IrContext
// ============================================================================

/// Arena-based mutable IR context.
///
/// Owns all IR entities and provides methods for creating, querying,
/// and mutating them. Use-chains are automatically maintained.
pub struct IrContext {
    ops: PrimaryMap<OpRef, OperationData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    regions: PrimaryMap<RegionRef, RegionData>,

    /// Use-chain: for each value, the list of operations that use it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,
    /// Operations destroyed by `remove_op` (or orphaned by a rollback).
    erased: SecondaryMap<OpRef, bool>,

    /// Type and path interners.
    pub types: TypeInterner,
    pub paths: PathInterner,

    /// Backing pools for EntityList storage.
    value_pool: ListPool<ValueRef>,
    type_pool: ListPool<TypeRef>,

    /// Mapping from operation to its result ValueRefs.
    result_values: SecondaryMap<OpRef, EntityList<ValueRef>>,
    /// Mapping from block to its argument ValueRefs.
    block_arg_values: SecondaryMap<BlockRef, EntityList<ValueRef>>,

    journal: Journal,
}

impl IrContext {
    /// Create a new empty IR context.
    pub fn new() -> Self {
        Self {
            ops: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            regions: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            erased: SecondaryMap::new(),
            types: TypeInterner::new(),
            paths: PathInterner::new(),
            value_pool: ListPool::new(),
            type_pool: ListPool::new(),
            result_values: SecondaryMap::new(),
            block_arg_values: SecondaryMap::new(),
            journal: Journal::default(),
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction. Until it is committed or rolled back, every
    /// mutation records its inverse.
    pub fn begin_transaction(&mut self) -> Transaction {
        self.journal.begin()
    }

    /// Keep every edit made since `tx` was opened.
    ///
    /// Committing an inner transaction keeps its edits in the journal so an
    /// enclosing transaction can still roll them back.
    pub fn commit(&mut self, tx: Transaction) {
        self.journal.close(tx);
    }

    /// Undo every edit made since `tx` was opened, newest first.
    pub fn rollback(&mut self, tx: Transaction) {
        let edits = self.journal.drain_to(&tx);
        for edit in edits.into_iter().rev() {
            self.undo(edit);
        }
        self.journal.close(tx);
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.journal.is_recording()
    }

    /// Number of edits recorded since `tx` was opened.
    pub fn edits_since(&self, tx: &Transaction) -> usize {
        self.journal.len_since(tx)
    }

    fn record(&mut self, edit: Edit) {
        self.journal.record(edit);
    }

    fn undo(&mut self, edit: Edit) {
        match edit {
            Edit::CreateOp(op) => {
                self.unregister_operand_uses(op);
                let regions: SmallVec<[RegionRef; 4]> = self.ops[op].regions.clone();
                for r in regions {
                    if self.regions[r].parent_op == Some(op) {
                        self.regions[r].parent_op = None;
                    }
                }
                self.erased[op] = true;
            }
            Edit::CreateBlock(block) => {
                let ops: SmallVec<[OpRef; 4]> = self.blocks[block].ops.clone();
                for op in ops {
                    if self.ops[op].parent_block == Some(block) {
                        self.ops[op].parent_block = None;
                    }
                }
            }
            Edit::CreateRegion(region) => {
                let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
                for b in blocks {
                    if self.blocks[b].parent_region == Some(region) {
                        self.blocks[b].parent_region = None;
                    }
                }
            }
            Edit::EraseOp(op) => {
                self.register_operand_uses(op);
                self.erased[op] = false;
            }
            Edit::InsertOp { block, op, index } => {
                let removed = self.blocks[block].ops.remove(index);
                debug_assert_eq!(removed, op);
                self.ops[op].parent_block = None;
            }
            Edit::RemoveOp { block, op, index } => {
                self.blocks[block].ops.insert(index, op);
                self.ops[op].parent_block = Some(block);
            }
            Edit::SetOperand { op, index, old } => {
                self.set_operand_raw(op, index, old);
            }
            Edit::SetAttr { op, key, old } => match old {
                Some(val) => {
                    self.ops[op].attributes.insert(key, val);
                }
                None => {
                    self.ops[op].attributes.remove(&key);
                }
            },
            Edit::SetBlockArgType { block, index, old } => {
                self.set_block_arg_type_raw(block, index, old);
            }
            Edit::AddBlockArg { block } => {
                self.blocks[block].args.pop();
                let mut vals: SmallVec<[ValueRef; 8]> =
                    self.block_arg_values[block].as_slice(&self.value_pool).into();
                vals.pop();
                let mut list = EntityList::new();
                for v in vals {
                    list.push(v, &mut self.value_pool);
                }
                self.block_arg_values[block] = list;
            }
            Edit::DetachRegion { op, index, region } => {
                self.ops[op].regions.insert(index, region);
                self.regions[region].parent_op = Some(op);
            }
            Edit::AttachRegion { op, region } => {
                let regions = &mut self.ops[op].regions;
                if let Some(pos) = regions.iter().position(|&r| r == region) {
                    regions.remove(pos);
                }
                self.regions[region].parent_op = None;
            }
        }
    }

    // ========================================================================
    // Operation
    // ========================================================================

    /// Create a new operation and allocate result values for it.
    ///
    /// The operation's operands are registered in the use-chain.
    /// The operation must not have a `parent_block` set — use `push_op` to
    /// attach it to a block after creation.
    ///
    /// # Panics
    ///
    /// Panics if `data.parent_block` is `Some`, or if any region in
    /// `data.regions` already belongs to another operation.
    pub fn create_op(&mut self, data: OperationData) -> OpRef {
        assert!(
            data.parent_block.is_none(),
            "create_op: operation must not have parent_block set; \
             use push_op to attach it to a block after creation",
        );

        let result_types: SmallVec<[TypeRef; 4]> = data.results.as_slice(&self.type_pool).into();
        let regions: SmallVec<[RegionRef; 4]> = data.regions.clone();

        let op = self.ops.push(data);

        // Back-link owned regions to this operation
        for &r in &regions {
            if let Some(existing) = self.regions[r].parent_op {
                panic!(
                    "create_op: region {r} already belongs to operation {existing}; \
                     cannot reassign to {op}",
                );
            }
            self.regions[r].parent_op = Some(op);
        }

        self.register_operand_uses(op);

        // Allocate result values
        let mut result_value_list = EntityList::new();
        for (idx, &ty) in result_types.iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::OpResult(op, idx as u32),
                ty,
            });
            result_value_list.push(v, &mut self.value_pool);
        }
        self.result_values[op] = result_value_list;

        self.record(Edit::CreateOp(op));
        op
    }

    /// Get immutable reference to operation data.
    pub fn op(&self, op: OpRef) -> &OperationData {
        &self.ops[op]
    }

    /// Dialect-qualified kind of an operation.
    pub fn op_name(&self, op: OpRef) -> OpName {
        let data = &self.ops[op];
        OpName::new(data.dialect, data.name)
    }

    /// Check whether an operation has the given dialect and name.
    pub fn op_is(&self, op: OpRef, dialect: &str, name: &str) -> bool {
        let data = &self.ops[op];
        data.dialect == dialect && data.name == name
    }

    /// Get the operands of an operation as a slice.
    pub fn op_operands(&self, op: OpRef) -> &[ValueRef] {
        self.ops[op].operands.as_slice(&self.value_pool)
    }

    /// Get the result types of an operation as a slice.
    pub fn op_result_types(&self, op: OpRef) -> &[TypeRef] {
        self.ops[op].results.as_slice(&self.type_pool)
    }

    /// Get the i-th result value of an operation.
    pub fn op_result(&self, op: OpRef, index: u32) -> ValueRef {
        self.result_values[op].as_slice(&self.value_pool)[index as usize]
    }

    /// Get all result values of an operation.
    pub fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.result_values[op].as_slice(&self.value_pool)
    }

    /// Look up an attribute on an operation.
    pub fn op_attr(&self, op: OpRef, key: Symbol) -> Option<&Attribute> {
        self.ops[op].attributes.get(&key)
    }

    /// Whether the operation has been destroyed.
    pub fn is_erased(&self, op: OpRef) -> bool {
        self.erased[op]
    }

    /// Set (or overwrite) an attribute on an operation.
    pub fn set_attr(&mut self, op: OpRef, key: Symbol, value: Attribute) {
        let old = self.ops[op].attributes.insert(key, value);
        self.record(Edit::SetAttr { op, key, old });
    }

    /// Destroy an operation, clearing its use-chain entries.
    ///
    /// Does NOT remove it from its parent block. Use `remove_op_from_block` first,
    /// or call [`IrContext::erase_op`].
    ///
    /// # Panics
    ///
    /// Panics if the operation is still attached to a block, or if any
    /// result value still has uses, as that would leave dangling references.
    pub fn remove_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            panic!(
                "remove_op: operation {op} is still attached to block {block}; \
                 call remove_op_from_block first",
            );
        }

        let results: SmallVec<[ValueRef; 4]> =
            self.result_values[op].as_slice(&self.value_pool).into();
        for &val in &results {
            assert!(
                self.uses[val].is_empty(),
                "remove_op: result value {val} still has {} use(s); \
                 replace all uses before removing the operation",
                self.uses[val].len()
            );
        }

        self.unregister_operand_uses(op);
        self.erased[op] = true;
        self.record(Edit::EraseOp(op));
    }

    /// Detach an operation from its block (if any) and destroy it.
    pub fn erase_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            self.remove_op_from_block(block, op);
        }
        self.remove_op(op);
    }

    /// Set a single operand, keeping the use-chains in sync.
    pub fn set_operand(&mut self, op: OpRef, index: u32, new: ValueRef) {
        let old = self.set_operand_raw(op, index, new);
        if old != new {
            self.record(Edit::SetOperand { op, index, old });
        }
    }

    fn set_operand_raw(&mut self, op: OpRef, index: u32, new: ValueRef) -> ValueRef {
        let slice = self.ops[op].operands.as_mut_slice(&mut self.value_pool);
        let old = slice[index as usize];
        if old == new {
            return old;
        }
        slice[index as usize] = new;
        self.uses[old].retain(|u| !(u.user == op && u.operand_index == index));
        self.uses[new].push(Use {
            user: op,
            operand_index: index,
        });
        old
    }

    fn register_operand_uses(&mut self, op: OpRef) {
        let operands: SmallVec<[ValueRef; 8]> =
            self.ops[op].operands.as_slice(&self.value_pool).into();
        for (idx, &val) in operands.iter().enumerate() {
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }
    }

    fn unregister_operand_uses(&mut self, op: OpRef) {
        let operands: SmallVec<[ValueRef; 8]> =
            self.ops[op].operands.as_slice(&self.value_pool).into();
        for (idx, &val) in operands.iter().enumerate() {
            self.uses[val].retain(|u| !(u.user == op && u.operand_index == idx as u32));
        }
    }

    // ========================================================================
    // Value
    // ========================================================================

    /// Get immutable reference to value data.
    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    /// Get the type of a value.
    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    /// Get the definition of a value.
    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    /// The operation defining `v`, if it is an operation result.
    pub fn defining_op(&self, v: ValueRef) -> Option<OpRef> {
        match self.values[v].def {
            ValueDef::OpResult(op, _) => Some(op),
            ValueDef::BlockArg(..) => None,
        }
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new block and allocate argument values for it.
    ///
    /// Operations listed in `data.ops` are attached to the new block.
    ///
    /// # Panics
    ///
    /// Panics if any listed operation already belongs to a block.
    pub fn create_block(&mut self, data: BlockData) -> BlockRef {
        let arg_types: Vec<TypeRef> = data.args.iter().map(|a| a.ty).collect();
        let initial_ops: SmallVec<[OpRef; 4]> = data.ops.clone();
        let block = self.blocks.push(data);

        for op in initial_ops {
            if let Some(existing) = self.ops[op].parent_block {
                panic!("create_block: operation {op} already belongs to block {existing}");
            }
            self.ops[op].parent_block = Some(block);
        }

        let mut arg_value_list = EntityList::new();
        for (idx, ty) in arg_types.into_iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::BlockArg(block, idx as u32),
                ty,
            });
            arg_value_list.push(v, &mut self.value_pool);
        }
        self.block_arg_values[block] = arg_value_list;

        self.record(Edit::CreateBlock(block));
        block
    }

    /// Get immutable reference to block data.
    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    /// Get the i-th block argument value.
    pub fn block_arg(&self, b: BlockRef, index: u32) -> ValueRef {
        self.block_arg_values[b].as_slice(&self.value_pool)[index as usize]
    }

    /// Get all block argument values.
    pub fn block_args(&self, b: BlockRef) -> &[ValueRef] {
        self.block_arg_values[b].as_slice(&self.value_pool)
    }

    /// Append a new argument to a block, returning its value.
    pub fn add_block_arg(&mut self, block: BlockRef, arg: BlockArgData) -> ValueRef {
        let idx = self.blocks[block].args.len() as u32;
        let v = self.values.push(ValueData {
            def: ValueDef::BlockArg(block, idx),
            ty: arg.ty,
        });
        self.blocks[block].args.push(arg);
        self.block_arg_values[block].push(v, &mut self.value_pool);
        self.record(Edit::AddBlockArg { block });
        v
    }

    /// Change the type of a block argument in place.
    pub fn set_block_arg_type(&mut self, block: BlockRef, index: u32, ty: TypeRef) {
        let old = self.set_block_arg_type_raw(block, index, ty);
        if old != ty {
            self.record(Edit::SetBlockArgType { block, index, old });
        }
    }

    fn set_block_arg_type_raw(&mut self, block: BlockRef, index: u32, ty: TypeRef) -> TypeRef {
        let old = self.blocks[block].args[index as usize].ty;
        self.blocks[block].args[index as usize].ty = ty;
        let v = self.block_arg(block, index);
        self.values[v].ty = ty;
        old
    }

    /// Append an operation to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block.
    pub fn push_op(&mut self, block: BlockRef, op: OpRef) {
        let index = self.blocks[block].ops.len();
        self.insert_op_at(block, index, op);
    }

    /// Insert an operation before `before` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block, or if `before`
    /// is not found in the block.
    pub fn insert_op_before(&mut self, block: BlockRef, before: OpRef, op: OpRef) {
        let pos = self.op_position(block, before);
        self.insert_op_at(block, pos, op);
    }

    /// Insert an operation right after `after` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block, or if `after`
    /// is not found in the block.
    pub fn insert_op_after(&mut self, block: BlockRef, after: OpRef, op: OpRef) {
        let pos = self.op_position(block, after);
        self.insert_op_at(block, pos + 1, op);
    }

    fn op_position(&self, block: BlockRef, op: OpRef) -> usize {
        self.blocks[block]
            .ops
            .iter()
            .position(|&o| o == op)
            .unwrap_or_else(|| panic!("operation {op} not found in block {block}"))
    }

    fn insert_op_at(&mut self, block: BlockRef, index: usize, op: OpRef) {
        if let Some(existing) = self.ops[op].parent_block {
            panic!(
                "insert: operation {op} already belongs to block {existing}; \
                 remove it from the old block first",
            );
        }
        self.blocks[block].ops.insert(index, op);
        self.ops[op].parent_block = Some(block);
        self.record(Edit::InsertOp { block, op, index });
    }

    /// Remove an operation from a block (does not destroy the operation).
    ///
    /// No-op if the operation is not in the block.
    pub fn remove_op_from_block(&mut self, block: BlockRef, op: OpRef) {
        let Some(index) = self.blocks[block].ops.iter().position(|&o| o == op) else {
            return;
        };
        self.blocks[block].ops.remove(index);
        if self.ops[op].parent_block == Some(block) {
            self.ops[op].parent_block = None;
        }
        self.record(Edit::RemoveOp { block, op, index });
    }

    // ========================================================================
    // Region
    // ========================================================================

    /// Create a new region.
    ///
    /// # Panics
    ///
    /// Panics if any block in `data.blocks` already belongs to another region.
    pub fn create_region(&mut self, data: RegionData) -> RegionRef {
        let region = self.regions.push(data);

        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        for &b in &blocks {
            if let Some(existing) = self.blocks[b].parent_region {
                panic!(
                    "create_region: block {b} already belongs to region {existing}; \
                     cannot reassign to {region}",
                );
            }
            self.blocks[b].parent_region = Some(region);
        }

        self.record(Edit::CreateRegion(region));
        region
    }

    /// Get immutable reference to region data.
    pub fn region(&self, r: RegionRef) -> &RegionData {
        &self.regions[r]
    }

    /// First block of a region, if any.
    pub fn entry_block(&self, r: RegionRef) -> Option<BlockRef> {
        self.regions[r].blocks.first().copied()
    }

    /// Detach a region from its parent operation so it can be moved to a
    /// new operation. No-op for a region without a parent.
    pub fn detach_region(&mut self, region: RegionRef) {
        let Some(op) = self.regions[region].parent_op else {
            return;
        };
        let Some(index) = self.ops[op].regions.iter().position(|&r| r == region) else {
            return;
        };
        self.ops[op].regions.remove(index);
        self.regions[region].parent_op = None;
        self.record(Edit::DetachRegion { op, index, region });
    }

    /// Append a detached region to an operation.
    ///
    /// # Panics
    ///
    /// Panics if the region still belongs to another operation.
    pub fn attach_region(&mut self, op: OpRef, region: RegionRef) {
        if let Some(existing) = self.regions[region].parent_op {
            panic!("attach_region: region {region} already belongs to operation {existing}");
        }
        self.ops[op].regions.push(region);
        self.regions[region].parent_op = Some(op);
        self.record(Edit::AttachRegion { op, region });
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// The operation whose region contains `op`'s block.
    pub fn parent_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        self.block_parent_op(block)
    }

    /// The operation owning the region that contains `block`.
    pub fn block_parent_op(&self, block: BlockRef) -> Option<OpRef> {
        let region = self.blocks[block].parent_region?;
        self.regions[region].parent_op
    }

    /// Whether `ancestor` is `op` itself or encloses it.
    pub fn is_ancestor(&self, ancestor: OpRef, op: OpRef) -> bool {
        let mut current = Some(op);
        while let Some(o) = current {
            if o == ancestor {
                return true;
            }
            current = self.parent_op(o);
        }
        false
    }

    /// Whether `op` is alive and still attached (transitively) under `root`.
    pub fn is_live_under(&self, root: OpRef, op: OpRef) -> bool {
        let mut current = op;
        loop {
            if self.erased[current] {
                return false;
            }
            if current == root {
                return true;
            }
            let Some(block) = self.ops[current].parent_block else {
                return false;
            };
            let Some(parent) = self.block_parent_op(block) else {
                return false;
            };
            current = parent;
        }
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    /// Get all uses of a value.
    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    /// Check if a value has any uses.
    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    // ========================================================================
    // RAUW (Replace All Uses With)
    // ========================================================================

    /// Replace all uses of `old` with `new` in all operations.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        self.replace_uses_where(old, new, |_| true);
    }

    /// Replace the uses of `old` whose user satisfies `pred`.
    pub fn replace_uses_where(
        &mut self,
        old: ValueRef,
        new: ValueRef,
        mut pred: impl FnMut(OpRef) -> bool,
    ) {
        if old == new {
            return;
        }
        let old_uses: SmallVec<[Use; 4]> = self.uses[old].iter().copied().collect();
        for u in old_uses {
            if pred(u.user) {
                self.set_operand(u.user, u.operand_index, new);
            }
        }
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helper constructors for OperationData
// ============================================================================

/// Builder for constructing `OperationData` with pool-backed lists.
///
/// Collects operands and result types into `Vec`s, then packs them
/// into `EntityList`s on `build()`.
pub struct OperationDataBuilder {
    location: Location,
    dialect: Symbol,
    name: Symbol,
    operands: Vec<ValueRef>,
    results: Vec<TypeRef>,
    attributes: BTreeMap<Symbol, Attribute>,
    regions: SmallVec<[RegionRef; 4]>,
}

impl OperationDataBuilder {
    pub fn new(location: Location, dialect: Symbol, name: Symbol) -> Self {
        Self {
            location,
            dialect,
            name,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: SmallVec::new(),
        }
    }

    /// Start a builder from an `OpName`.
    pub fn named(location: Location, name: OpName) -> Self {
        Self::new(location, name.dialect, name.name)
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.results.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.results.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attributes.insert(key.into(), val);
        self
    }

    pub fn attrs(mut self, attrs: impl IntoIterator<Item = (Symbol, Attribute)>) -> Self {
        self.attributes.extend(attrs);
        self
    }

    pub fn region(mut self, r: RegionRef) -> Self {
        self.regions.push(r);
        self
    }

    /// Build the `OperationData`, packing vecs into `EntityList`s using
    /// the context's pools.
    pub fn build(self, ctx: &mut IrContext) -> OperationData {
        let mut operands = EntityList::new();
        for v in self.operands {
            operands.push(v, &mut ctx.value_pool);
        }
        let mut results = EntityList::new();
        for ty in self.results {
            results.push(ty, &mut ctx.type_pool);
        }
        OperationData {
            location: self.location,
            dialect: self.dialect,
            name: self.name,
            operands,
            results,
            attributes: self.attributes,
            regions: self.regions,
            parent_block: None,
        }
    }

    /// Build and create the operation in one step.
    pub fn create(self, ctx: &mut IrContext) -> OpRef {
        let data = self.build(ctx);
        ctx.create_op(data)
    }
}
