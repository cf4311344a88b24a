// Copyright 2026 the IR Bytecode Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural verification of a constructed operation tree.
//!
//! This runs after reading, before the result is handed back: it checks
//! ownership consistency, that successors stay within their parent region,
//! and that every operand refers to a value defined somewhere in the tree.
//! The last check is what catches a placeholder operation leaking into the
//! result, since placeholders are never attached to a block.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashSet;

use crate::ir::{BlockId, Module, OpId, RegionId, Value};

/// A structural verification failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// A block is listed by a region it does not name as its parent.
    BlockParentMismatch {
        /// The block.
        block: BlockId,
    },
    /// An operation is listed by a block it does not name as its parent.
    OpParentMismatch {
        /// The operation.
        op: OpId,
    },
    /// A block appears more than once in the tree.
    BlockReused {
        /// The block.
        block: BlockId,
    },
    /// An operation appears more than once in the tree.
    OpReused {
        /// The operation.
        op: OpId,
    },
    /// A successor names a block outside the operation's parent region.
    SuccessorOutsideParentRegion {
        /// The operation.
        op: OpId,
        /// The successor block.
        successor: BlockId,
    },
    /// An operand refers to a value with no definition in the tree.
    UseOfUndefinedValue {
        /// The using operation.
        op: OpId,
        /// The operand index.
        operand_index: usize,
    },
    /// An operand names a result or argument index that does not exist.
    InvalidValueIndex {
        /// The using operation.
        op: OpId,
        /// The operand index.
        operand_index: usize,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockParentMismatch { block } => {
                write!(f, "block {} has an inconsistent parent region", block.0)
            }
            Self::OpParentMismatch { op } => {
                write!(f, "operation {} has an inconsistent parent block", op.0)
            }
            Self::BlockReused { block } => {
                write!(f, "block {} appears in more than one region", block.0)
            }
            Self::OpReused { op } => {
                write!(f, "operation {} appears in more than one block", op.0)
            }
            Self::SuccessorOutsideParentRegion { op, successor } => write!(
                f,
                "operation {} has successor block {} outside of its parent region",
                op.0, successor.0
            ),
            Self::UseOfUndefinedValue { op, operand_index } => write!(
                f,
                "operand {operand_index} of operation {} uses a value with no definition in the parsed IR",
                op.0
            ),
            Self::InvalidValueIndex { op, operand_index } => write!(
                f,
                "operand {operand_index} of operation {} names a nonexistent result or argument",
                op.0
            ),
        }
    }
}

impl core::error::Error for VerifyError {}

/// Verifies the operation tree rooted at `root`.
///
/// The walk is iterative, so arbitrarily deep region nesting cannot
/// overflow the native stack.
pub fn verify_op_tree(module: &Module, root: OpId) -> Result<(), VerifyError> {
    let mut ops: HashSet<OpId> = HashSet::new();
    let mut blocks: HashSet<BlockId> = HashSet::new();
    let mut op_region: Vec<(OpId, Option<RegionId>)> = Vec::new();

    // First pass: collect the tree, checking ownership links.
    let mut worklist: Vec<OpId> = Vec::new();
    ops.insert(root);
    op_region.push((root, None));
    worklist.push(root);
    while let Some(op) = worklist.pop() {
        for &region in &module.op(op).regions {
            for &block in &module.region(region).blocks {
                if module.block(block).parent != Some(region) {
                    return Err(VerifyError::BlockParentMismatch { block });
                }
                if !blocks.insert(block) {
                    return Err(VerifyError::BlockReused { block });
                }
                for &inner in &module.block(block).ops {
                    if module.op(inner).parent != Some(block) {
                        return Err(VerifyError::OpParentMismatch { op: inner });
                    }
                    if !ops.insert(inner) {
                        return Err(VerifyError::OpReused { op: inner });
                    }
                    op_region.push((inner, Some(region)));
                    worklist.push(inner);
                }
            }
        }
    }

    // Second pass: operands must resolve inside the tree, successors must
    // stay within the parent region.
    for &(op, region) in &op_region {
        let data = module.op(op);
        for (operand_index, &operand) in data.operands.iter().enumerate() {
            match operand {
                Value::OpResult { op: def, index } => {
                    if !ops.contains(&def) {
                        return Err(VerifyError::UseOfUndefinedValue { op, operand_index });
                    }
                    if index as usize >= module.op(def).result_types.len() {
                        return Err(VerifyError::InvalidValueIndex { op, operand_index });
                    }
                }
                Value::BlockArg { block, index } => {
                    if !blocks.contains(&block) {
                        return Err(VerifyError::UseOfUndefinedValue { op, operand_index });
                    }
                    if index as usize >= module.block(block).args.len() {
                        return Err(VerifyError::InvalidValueIndex { op, operand_index });
                    }
                }
            }
        }
        for &successor in &data.successors {
            let in_parent = region
                .is_some_and(|r| module.region(r).blocks.contains(&successor));
            if !in_parent {
                return Err(VerifyError::SuccessorOutsideParentRegion { op, successor });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Context, OperationState};
    use alloc::vec;

    struct Tree {
        module: Module,
        root: OpId,
        body: BlockId,
        op_name: crate::ir::OpName,
        loc: crate::ir::Attribute,
        i64_ty: crate::ir::Type,
    }

    fn tree() -> Tree {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let d = ctx.register_dialect("test");
        let op_name = ctx.op_name(d, "test.op");
        let builtin = ctx.register_dialect("builtin");
        let module_name = ctx.op_name(builtin, "builtin.module");
        let loc = ctx.unknown_loc();
        let i64_ty = ctx.integer_type(64);

        let mut state = OperationState::new(module_name, loc);
        state.num_regions = 1;
        let root = module.create_op(state);
        let body = module.create_block();
        let region = module.op(root).regions[0];
        module.region_append_block(region, body);
        Tree {
            module,
            root,
            body,
            op_name,
            loc,
            i64_ty,
        }
    }

    #[test]
    fn accepts_well_formed_tree() {
        let mut t = tree();
        let mut state = OperationState::new(t.op_name, t.loc);
        state.result_types = vec![t.i64_ty];
        let def = t.module.create_op(state);
        t.module.append_op(t.body, def);
        let v = t.module.op_result(def, 0);
        let mut state = OperationState::new(t.op_name, t.loc);
        state.operands = vec![v];
        let user = t.module.create_op(state);
        t.module.append_op(t.body, user);

        verify_op_tree(&t.module, t.root).unwrap();
    }

    #[test]
    fn rejects_use_of_detached_definition() {
        let mut t = tree();
        // A definition that is never attached to any block.
        let mut state = OperationState::new(t.op_name, t.loc);
        state.result_types = vec![t.i64_ty];
        let detached = t.module.create_op(state);
        let v = t.module.op_result(detached, 0);

        let mut state = OperationState::new(t.op_name, t.loc);
        state.operands = vec![v];
        let user = t.module.create_op(state);
        t.module.append_op(t.body, user);

        assert_eq!(
            verify_op_tree(&t.module, t.root),
            Err(VerifyError::UseOfUndefinedValue {
                op: user,
                operand_index: 0
            })
        );
    }

    #[test]
    fn rejects_successor_outside_parent_region() {
        let mut t = tree();
        let stray = t.module.create_block();
        let mut state = OperationState::new(t.op_name, t.loc);
        state.successors = vec![stray];
        let op = t.module.create_op(state);
        t.module.append_op(t.body, op);

        assert_eq!(
            verify_op_tree(&t.module, t.root),
            Err(VerifyError::SuccessorOutsideParentRegion { op, successor: stray })
        );
    }
}
