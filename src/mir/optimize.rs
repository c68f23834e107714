//! MIR optimizer: iterate a fixed sequence of passes to a fixed point,
//! capped at 10 iterations (spec §4.8).

use std::collections::{HashMap, HashSet};

use crate::ast::Ty;

use super::{BasicBlock, Constant, MirFunction, MirInst, MirOp, MirProgram, Terminator};

pub fn optimize(program: &mut MirProgram) {
    for f in &mut program.functions {
        optimize_function(f);
    }
}

const MAX_ITERATIONS: u32 = 10;

fn optimize_function(f: &mut MirFunction) {
    build_cfg(f);
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        changed |= dead_instruction_trim(f);
        build_cfg(f);
        changed |= unreachable_block_dce(f);
        build_cfg(f);
        changed |= constant_fold(f);
        changed |= dead_store_elim(f);
        if empty_block_skip(f) {
            changed = true;
            build_cfg(f);
        }
        if !changed {
            break;
        }
    }
    build_cfg(f);
}

/// Structural no-op in this representation: `terminator` is a dedicated
/// field, not part of `instructions`, so "everything after the first
/// terminator" can never exist in the first place. Kept as a named pass so
/// the pipeline mirrors spec §4.8's numbered list.
fn dead_instruction_trim(_f: &mut MirFunction) -> bool {
    false
}

fn build_cfg(f: &mut MirFunction) {
    for block in &mut f.blocks {
        block.predecessors.clear();
        block.successors.clear();
    }
    let edges: Vec<(String, Vec<String>)> = f
        .blocks
        .iter()
        .map(|b| (b.label.clone(), b.terminator.as_ref().map(|t| t.targets().into_iter().map(String::from).collect()).unwrap_or_default()))
        .collect();
    for (from, targets) in &edges {
        for target in targets {
            if let Some(block) = f.blocks.iter_mut().find(|b| &b.label == target) {
                block.predecessors.push(from.clone());
            }
        }
    }
    for (from, targets) in edges {
        if let Some(block) = f.blocks.iter_mut().find(|b| b.label == from) {
            block.successors = targets;
        }
    }
}

fn unreachable_block_dce(f: &mut MirFunction) -> bool {
    let entry = f.entry_label().to_string();
    let mut visited = HashSet::new();
    let mut stack = vec![entry];
    while let Some(label) = stack.pop() {
        if !visited.insert(label.clone()) {
            continue;
        }
        if let Some(block) = f.blocks.iter().find(|b| b.label == label) {
            for succ in &block.successors {
                stack.push(succ.clone());
            }
        }
    }
    let before = f.blocks.len();
    f.blocks.retain(|b| visited.contains(&b.label));
    f.blocks.len() != before
}

fn as_f64(c: &Constant) -> Option<f64> {
    match c {
        Constant::Int(v) => Some(*v as f64),
        Constant::Float(v) => Some(*v),
        Constant::Char(v) => Some(*v as u32 as f64),
        Constant::Str(_) => None,
    }
}

fn as_i64(c: &Constant) -> Option<i64> {
    match c {
        Constant::Int(v) => Some(*v),
        Constant::Char(v) => Some(*v as i64),
        Constant::Float(v) => Some(*v as i64),
        Constant::Str(_) => None,
    }
}

fn is_truthy(c: &Constant) -> Option<bool> {
    match c {
        Constant::Int(v) => Some(*v != 0),
        Constant::Float(v) => Some(*v != 0.0),
        Constant::Char(v) => Some(*v != '\0'),
        Constant::Str(_) => None,
    }
}

/// Fold a binary arithmetic/comparison op over two known constants. `ty` is
/// the instruction's already-annotated result type (spec §9 Open Question
/// 5: mixing int+float folds to float; pure-integer division truncates).
/// Comparisons always fold to an integer `0`/`1`, regardless of `ty`.
fn fold_binary(op: MirOp, lhs: &Constant, rhs: &Constant, ty: Ty) -> Option<Constant> {
    if op.is_comparison() {
        let l = as_f64(lhs)?;
        let r = as_f64(rhs)?;
        let result = match op {
            MirOp::Eq => l == r,
            MirOp::Ne => l != r,
            MirOp::Lt => l < r,
            MirOp::Le => l <= r,
            MirOp::Gt => l > r,
            MirOp::Ge => l >= r,
            _ => unreachable!(),
        };
        return Some(Constant::Int(if result { 1 } else { 0 }));
    }

    match op {
        MirOp::Add | MirOp::Sub | MirOp::Mul | MirOp::Div => {
            if ty == Ty::Float {
                let l = as_f64(lhs)?;
                let r = as_f64(rhs)?;
                let v = match op {
                    MirOp::Add => l + r,
                    MirOp::Sub => l - r,
                    MirOp::Mul => l * r,
                    MirOp::Div => {
                        if r == 0.0 {
                            return None;
                        }
                        l / r
                    }
                    _ => unreachable!(),
                };
                Some(Constant::Float(v))
            } else if ty == Ty::Int {
                let l = as_i64(lhs)?;
                let r = as_i64(rhs)?;
                let v = match op {
                    MirOp::Add => l.wrapping_add(r),
                    MirOp::Sub => l.wrapping_sub(r),
                    MirOp::Mul => l.wrapping_mul(r),
                    MirOp::Div => {
                        if r == 0 {
                            return None;
                        }
                        l / r // truncating integer division
                    }
                    _ => unreachable!(),
                };
                Some(Constant::Int(v))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn fold_unary(op: MirOp, operand: &Constant, ty: Ty) -> Option<Constant> {
    match op {
        MirOp::Neg if ty == Ty::Float => Some(Constant::Float(-as_f64(operand)?)),
        MirOp::Neg if ty == Ty::Int => Some(Constant::Int(-as_i64(operand)?)),
        MirOp::Not => Some(Constant::Int(if is_truthy(operand)? { 0 } else { 1 })),
        _ => None,
    }
}

/// Per-block constant propagation plus terminator simplification. The
/// known-constant map is local to each block (spec §9 Open Question 4: no
/// propagation through `load`/`store`, i.e. across blocks or through a
/// variable).
fn constant_fold(f: &mut MirFunction) -> bool {
    let mut changed = false;
    for block in &mut f.blocks {
        let mut known: HashMap<String, Constant> = HashMap::new();
        for inst in &mut block.instructions {
            match inst {
                MirInst::Const { result, value, .. } => {
                    known.insert(result.clone(), value.clone());
                }
                MirInst::BinOp { result, op, lhs, rhs, ty } => {
                    if let (Some(l), Some(r)) = (known.get(lhs.as_str()), known.get(rhs.as_str())) {
                        if let Some(folded) = fold_binary(*op, l, r, *ty) {
                            known.insert(result.clone(), folded.clone());
                            *inst = MirInst::Const { result: result.clone(), value: folded, ty: *ty };
                            changed = true;
                            continue;
                        }
                    }
                    known.remove(result);
                }
                MirInst::UnaryOp { result, op, operand, ty } => {
                    if let Some(v) = known.get(operand.as_str()) {
                        if let Some(folded) = fold_unary(*op, v, *ty) {
                            known.insert(result.clone(), folded.clone());
                            *inst = MirInst::Const { result: result.clone(), value: folded, ty: *ty };
                            changed = true;
                            continue;
                        }
                    }
                    known.remove(result);
                }
                MirInst::Load { result, .. } => {
                    known.remove(result);
                }
                MirInst::Call { result: Some(result), .. } => {
                    known.remove(result);
                }
                MirInst::Store { .. } | MirInst::Param { .. } | MirInst::Call { result: None, .. } => {}
            }
        }

        if let Some(Terminator::Branch { cond, then_label, else_label }) = &block.terminator {
            if let Some(c) = known.get(cond.as_str()) {
                if let Some(taken) = is_truthy(c) {
                    let target = if taken { then_label.clone() } else { else_label.clone() };
                    block.terminator = Some(Terminator::Jump { target });
                    changed = true;
                }
            }
        }
    }
    changed
}

fn dead_store_elim(f: &mut MirFunction) -> bool {
    let mut changed = false;
    for block in &mut f.blocks {
        let loaded: HashSet<&str> =
            block.instructions.iter().filter_map(|i| if let MirInst::Load { var, .. } = i { Some(var.as_str()) } else { None }).collect();

        let mut last_store_index: HashMap<&str, usize> = HashMap::new();
        for (idx, inst) in block.instructions.iter().enumerate() {
            if let MirInst::Store { var, .. } = inst {
                if !loaded.contains(var.as_str()) {
                    last_store_index.insert(var.as_str(), idx);
                }
            }
        }

        if last_store_index.is_empty() {
            continue;
        }
        let mut to_remove: Vec<usize> = last_store_index.values().copied().collect();
        to_remove.sort_unstable();
        to_remove.reverse();
        for idx in to_remove {
            block.instructions.remove(idx);
            changed = true;
        }
    }
    changed
}

/// A non-entry block with no instructions and an unconditional-jump
/// terminator is a pure passthrough: rewrite every predecessor's terminator
/// to target its destination directly, then drop it (spec §4.8 #6).
fn empty_block_skip(f: &mut MirFunction) -> bool {
    let entry = f.entry_label().to_string();
    let passthrough: Option<(String, String)> = f.blocks.iter().find_map(|b| {
        if b.label != entry && b.instructions.is_empty() {
            if let Some(Terminator::Jump { target }) = &b.terminator {
                if *target != b.label {
                    return Some((b.label.clone(), target.clone()));
                }
            }
        }
        None
    });

    let Some((dead_label, target)) = passthrough else {
        return false;
    };

    for block in &mut f.blocks {
        if block.label == dead_label {
            continue;
        }
        rewrite_terminator_target(&mut block.terminator, &dead_label, &target);
    }
    f.blocks.retain(|b| b.label != dead_label);
    true
}

fn rewrite_terminator_target(term: &mut Option<Terminator>, from: &str, to: &str) {
    match term {
        Some(Terminator::Jump { target }) if target == from => *target = to.to_string(),
        Some(Terminator::Branch { then_label, else_label, .. }) => {
            if then_label == from {
                *then_label = to.to_string();
            }
            if else_label == from {
                *else_label = to.to_string();
            }
        }
        _ => {}
    }
}

#[allow(dead_code)]
fn debug_block(b: &BasicBlock) -> String {
    b.label.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ty;
    use crate::mir::{BasicBlock, MirFunction};

    fn single_block_fn() -> MirFunction {
        let mut f = MirFunction::new("f", Ty::Int);
        f.blocks.push(BasicBlock::new("entry"));
        f
    }

    #[test]
    fn constant_binary_fold_replaces_instruction() {
        let mut f = single_block_fn();
        let block = f.block_mut("entry");
        block.instructions.push(MirInst::Const { result: "t0".into(), value: Constant::Int(2), ty: Ty::Int });
        block.instructions.push(MirInst::Const { result: "t1".into(), value: Constant::Int(3), ty: Ty::Int });
        block.instructions.push(MirInst::BinOp { result: "t2".into(), op: MirOp::Add, lhs: "t0".into(), rhs: "t1".into(), ty: Ty::Int });
        block.terminator = Some(Terminator::RetVal { value: "t2".into() });

        let changed = constant_fold(&mut f);
        assert!(changed);
        let folded = &f.blocks[0].instructions[2];
        assert!(matches!(folded, MirInst::Const { value: Constant::Int(5), .. }));
    }

    #[test]
    fn division_by_zero_is_never_folded() {
        let mut f = single_block_fn();
        let block = f.block_mut("entry");
        block.instructions.push(MirInst::Const { result: "t0".into(), value: Constant::Int(1), ty: Ty::Int });
        block.instructions.push(MirInst::Const { result: "t1".into(), value: Constant::Int(0), ty: Ty::Int });
        block.instructions.push(MirInst::BinOp { result: "t2".into(), op: MirOp::Div, lhs: "t0".into(), rhs: "t1".into(), ty: Ty::Int });
        block.terminator = Some(Terminator::RetVal { value: "t2".into() });

        constant_fold(&mut f);
        assert!(matches!(f.blocks[0].instructions[2], MirInst::BinOp { .. }));
    }

    #[test]
    fn mixed_int_float_fold_produces_float() {
        let mut f = single_block_fn();
        let block = f.block_mut("entry");
        block.instructions.push(MirInst::Const { result: "t0".into(), value: Constant::Int(2), ty: Ty::Int });
        block.instructions.push(MirInst::Const { result: "t1".into(), value: Constant::Float(0.5), ty: Ty::Float });
        block.instructions.push(MirInst::BinOp { result: "t2".into(), op: MirOp::Add, lhs: "t0".into(), rhs: "t1".into(), ty: Ty::Float });
        block.terminator = Some(Terminator::RetVal { value: "t2".into() });

        constant_fold(&mut f);
        assert!(matches!(f.blocks[0].instructions[2], MirInst::Const { value: Constant::Float(v), .. } if v == 2.5));
    }

    #[test]
    fn while_zero_condition_becomes_unconditional_jump_to_merge() {
        let mut f = MirFunction::new("f", Ty::Int);
        f.blocks.push(BasicBlock::new("entry"));
        f.blocks.push(BasicBlock::new("cond"));
        f.blocks.push(BasicBlock::new("body"));
        f.blocks.push(BasicBlock::new("merge"));
        f.block_mut("entry").terminator = Some(Terminator::Jump { target: "cond".into() });
        let cond_block = f.block_mut("cond");
        cond_block.instructions.push(MirInst::Const { result: "t0".into(), value: Constant::Int(0), ty: Ty::Int });
        cond_block.terminator =
            Some(Terminator::Branch { cond: "t0".into(), then_label: "body".into(), else_label: "merge".into() });
        f.block_mut("body").terminator = Some(Terminator::Jump { target: "cond".into() });
        f.block_mut("merge").terminator = Some(Terminator::Return);

        optimize_function(&mut f);
        assert!(f.blocks.iter().all(|b| b.label != "body"));
    }

    #[test]
    fn dead_store_with_no_load_in_block_is_removed() {
        let mut f = single_block_fn();
        f.var_types.insert("x".into(), Ty::Int);
        let block = f.block_mut("entry");
        block.instructions.push(MirInst::Const { result: "t0".into(), value: Constant::Int(1), ty: Ty::Int });
        block.instructions.push(MirInst::Store { var: "x".into(), value: "t0".into() });
        block.terminator = Some(Terminator::Return);

        let changed = dead_store_elim(&mut f);
        assert!(changed);
        assert!(f.blocks[0].instructions.iter().all(|i| !matches!(i, MirInst::Store { .. })));
    }

    #[test]
    fn empty_jump_only_block_is_skipped() {
        let mut f = MirFunction::new("f", Ty::Int);
        f.blocks.push(BasicBlock::new("entry"));
        f.blocks.push(BasicBlock::new("BB0"));
        f.blocks.push(BasicBlock::new("merge"));
        f.block_mut("entry").terminator = Some(Terminator::Jump { target: "BB0".into() });
        f.block_mut("BB0").terminator = Some(Terminator::Jump { target: "merge".into() });
        f.block_mut("merge").terminator = Some(Terminator::Return);

        let changed = empty_block_skip(&mut f);
        assert!(changed);
        assert!(f.blocks.iter().all(|b| b.label != "BB0"));
        assert!(matches!(f.block_mut("entry").terminator, Some(Terminator::Jump { ref target }) if target == "merge"));
    }
}
