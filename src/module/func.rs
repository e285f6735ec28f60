//! Functions and their basic blocks (with CFG edges).

use crate::spv::{self, spec, Id};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::ops::Range;

pub struct Function {
    pub id: Id,

    /// Index of the `OpFunction` instruction.
    pub inst_idx: usize,
    /// Index of the `OpFunctionEnd` instruction.
    pub end_inst_idx: usize,

    pub result_type: Id,
    pub function_type: Id,
    pub control: u32,

    /// `OpFunctionParameter` instruction indices, in order.
    pub params: Vec<usize>,

    pub blocks: Vec<Block>,
    pub block_by_label: FxHashMap<Id, usize>,

    /// Functions called (directly) from this one.
    pub callees: SmallVec<[Id; 4]>,
}

pub struct Block {
    pub label: Id,
    pub label_inst: usize,

    /// Instructions following the `OpLabel`, up to and including the terminator.
    pub insts: Range<usize>,

    pub succs: SmallVec<[Id; 2]>,
    pub preds: SmallVec<[Id; 2]>,
}

impl Block {
    pub fn terminator(&self) -> usize {
        self.insts.end - 1
    }

    /// The merge instruction (`OpSelectionMerge`/`OpLoopMerge`) of a header block.
    pub fn merge_inst(&self, insts: &[spv::Inst]) -> Option<usize> {
        let wk = &spec::Spec::get().well_known;
        let idx = self.insts.end.checked_sub(2)?;
        (idx >= self.insts.start
            && [wk.op.OpSelectionMerge, wk.op.OpLoopMerge].contains(&insts[idx].opcode))
        .then_some(idx)
    }
}

/// Branch targets of a terminator instruction (empty for non-branching ones).
pub fn branch_targets(inst: &spv::Inst) -> SmallVec<[Id; 2]> {
    let wk = &spec::Spec::get().well_known;
    let op = inst.opcode;
    let mut targets = SmallVec::new();
    let mut push = |i| targets.extend(inst.id_operand(i));
    if op == wk.op.OpBranch {
        push(0);
    } else if op == wk.op.OpBranchConditional {
        push(1);
        push(2);
    } else if op == wk.op.OpSwitch {
        // Default target, then `(literal, label)` pairs.
        push(1);
        for i in (3..inst.num_logical_operands()).step_by(2) {
            push(i);
        }
    }
    targets
}

impl Function {
    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    pub fn block(&self, label: Id) -> Option<&Block> {
        self.blocks.get(*self.block_by_label.get(&label)?)
    }

    /// Fill in `succs`/`preds` of every block, from their terminators.
    pub(super) fn compute_edges(&mut self, insts: &[spv::Inst]) {
        for block in &mut self.blocks {
            block.succs = branch_targets(&insts[block.terminator()]);
        }
        for i in 0..self.blocks.len() {
            let label = self.blocks[i].label;
            for succ in self.blocks[i].succs.clone() {
                if let Some(&j) = self.block_by_label.get(&succ) {
                    if !self.blocks[j].preds.contains(&label) {
                        self.blocks[j].preds.push(label);
                    }
                }
            }
        }
    }

    /// Labels of all blocks reachable from the entry block.
    pub fn reachable_blocks(&self) -> FxHashSet<Id> {
        let mut reachable = FxHashSet::default();
        let mut queue: Vec<Id> = self.entry_block().map(|b| b.label).into_iter().collect();
        while let Some(label) = queue.pop() {
            if !reachable.insert(label) {
                continue;
            }
            if let Some(block) = self.block(label) {
                queue.extend(block.succs.iter().copied());
            }
        }
        reachable
    }
}
