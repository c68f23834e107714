//! AST → MIR lowering (spec §4.7). Structure-directed: each function gets a
//! fresh `MirFunction` with an `entry` block, and the "current block"
//! pointer advances as control-flow constructs allocate new blocks.

use crate::ast::{BinOp, CompoundStmt, Declaration, Expr, ExprKind, FunctionDef, Literal, Program, Stmt, Ty, UnOp};

use super::{BasicBlock, Constant, MirFunction, MirInst, MirOp, MirProgram, Terminator};

pub fn lower_program(program: &Program) -> MirProgram {
    MirProgram { functions: program.functions.iter().map(lower_function).collect() }
}

fn zero_constant(ty: Ty) -> Constant {
    match ty {
        Ty::Int => Constant::Int(0),
        Ty::Float => Constant::Float(0.0),
        Ty::Char => Constant::Char('\0'),
        Ty::String => Constant::Str(String::new()),
        Ty::Void => unreachable!("zero_constant called for void"),
    }
}

fn lower_function(f: &FunctionDef) -> MirFunction {
    let mut mir_f = MirFunction::new(f.name.node.clone(), f.return_ty);
    mir_f.parameters = f.params.iter().map(|p| p.node.name.clone()).collect();
    mir_f.parameter_types = f.params.iter().map(|p| p.node.ty).collect();
    for p in &f.params {
        mir_f.var_types.insert(p.node.name.clone(), p.node.ty);
    }

    mir_f.blocks.push(BasicBlock::new("entry"));
    let mut current = "entry".to_string();

    lower_compound(&f.body, &mut mir_f, &mut current);

    if mir_f.block_mut(&current).terminator.is_none() {
        if f.return_ty == Ty::Void {
            mir_f.block_mut(&current).terminator = Some(Terminator::Return);
        } else {
            let t = mir_f.fresh_temp();
            let value = zero_constant(f.return_ty);
            mir_f.block_mut(&current).instructions.push(MirInst::Const { result: t.clone(), value, ty: f.return_ty });
            mir_f.block_mut(&current).terminator = Some(Terminator::RetVal { value: t });
        }
    }

    mir_f
}

fn lower_compound(c: &CompoundStmt, f: &mut MirFunction, current: &mut String) {
    for decl in &c.decls {
        lower_declaration(decl, f, current);
    }
    lower_stmts(&c.stmts, f, current);
}

fn lower_declaration(decl: &Declaration, f: &mut MirFunction, current: &mut String) {
    f.var_types.insert(decl.name.node.clone(), decl.ty);
    if let Some(init) = &decl.init {
        let value = lower_expr(init, f, current);
        f.block_mut(current).instructions.push(MirInst::Store { var: decl.name.node.clone(), value });
    }
}

/// Lower a statement sequence, starting a fresh (unreachable) block whenever
/// a preceding statement already terminated the current one — e.g. dead
/// code after a `return` inside the same block. The MIR optimizer's
/// unreachable-block pass removes these islands (spec §4.8 #3).
fn lower_stmts(stmts: &[Stmt], f: &mut MirFunction, current: &mut String) {
    for stmt in stmts {
        if f.block_mut(current).terminator.is_some() {
            let fresh = f.fresh_label();
            f.blocks.push(BasicBlock::new(fresh.clone()));
            *current = fresh;
        }
        lower_stmt(stmt, f, current);
    }
}

fn lower_stmt(stmt: &Stmt, f: &mut MirFunction, current: &mut String) {
    match stmt {
        Stmt::Compound(c) => lower_compound(c, f, current),
        Stmt::If { cond, then_branch, else_branch, .. } => lower_if(cond, then_branch, else_branch.as_deref(), f, current),
        Stmt::While { cond, body, .. } => lower_while(cond, body, f, current),
        Stmt::For { init, cond, step, body, .. } => lower_for(init.as_deref(), cond.as_ref(), step.as_deref(), body, f, current),
        Stmt::Assignment { target, value } => {
            let crate::ast::ExprKind::Reference(name) = &target.kind else {
                unreachable!("assignment target is always a Reference")
            };
            let v = lower_expr(value, f, current);
            f.block_mut(current).instructions.push(MirInst::Store { var: name.clone(), value: v });
        }
        Stmt::Return { value, .. } => {
            match value {
                Some(e) => {
                    let v = lower_expr(e, f, current);
                    f.block_mut(current).terminator = Some(Terminator::RetVal { value: v });
                }
                None => {
                    f.block_mut(current).terminator = Some(Terminator::Return);
                }
            }
        }
        Stmt::Declaration(decl) => lower_declaration(decl, f, current),
        Stmt::ExprStmt(e) => {
            lower_expr(e, f, current);
        }
    }
}

fn lower_if(cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>, f: &mut MirFunction, current: &mut String) {
    let cond_t = lower_expr(cond, f, current);
    let then_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(then_label.clone()));

    match else_branch {
        None => {
            let merge_label = f.fresh_label();
            f.blocks.push(BasicBlock::new(merge_label.clone()));
            f.block_mut(current).terminator = Some(Terminator::Branch {
                cond: cond_t,
                then_label: then_label.clone(),
                else_label: merge_label.clone(),
            });

            let mut then_cur = then_label;
            lower_stmt(then_branch, f, &mut then_cur);
            if f.block_mut(&then_cur).terminator.is_none() {
                f.block_mut(&then_cur).terminator = Some(Terminator::Jump { target: merge_label.clone() });
            }
            *current = merge_label;
        }
        Some(else_branch) => {
            let else_label = f.fresh_label();
            f.blocks.push(BasicBlock::new(else_label.clone()));
            f.block_mut(current).terminator = Some(Terminator::Branch {
                cond: cond_t,
                then_label: then_label.clone(),
                else_label: else_label.clone(),
            });

            let mut then_cur = then_label;
            lower_stmt(then_branch, f, &mut then_cur);
            let then_falls_through = f.block_mut(&then_cur).terminator.is_none();

            let mut else_cur = else_label;
            lower_stmt(else_branch, f, &mut else_cur);
            let else_falls_through = f.block_mut(&else_cur).terminator.is_none();

            if then_falls_through || else_falls_through {
                let merge_label = f.fresh_label();
                f.blocks.push(BasicBlock::new(merge_label.clone()));
                if then_falls_through {
                    f.block_mut(&then_cur).terminator = Some(Terminator::Jump { target: merge_label.clone() });
                }
                if else_falls_through {
                    f.block_mut(&else_cur).terminator = Some(Terminator::Jump { target: merge_label.clone() });
                }
                *current = merge_label;
            } else {
                // Both branches returned; nothing falls through. Point
                // `current` at one of them — if more statements follow,
                // `lower_stmts` will notice it's already terminated and
                // allocate a fresh (dead) block to continue in.
                *current = then_cur;
            }
        }
    }
}

fn lower_while(cond: &Expr, body: &Stmt, f: &mut MirFunction, current: &mut String) {
    let cond_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(cond_label.clone()));
    f.block_mut(current).terminator = Some(Terminator::Jump { target: cond_label.clone() });

    let mut cond_cur = cond_label.clone();
    let cond_t = lower_expr(cond, f, &mut cond_cur);

    let body_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(body_label.clone()));
    let merge_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(merge_label.clone()));

    f.block_mut(&cond_cur).terminator =
        Some(Terminator::Branch { cond: cond_t, then_label: body_label.clone(), else_label: merge_label.clone() });

    let mut body_cur = body_label;
    lower_stmt(body, f, &mut body_cur);
    if f.block_mut(&body_cur).terminator.is_none() {
        f.block_mut(&body_cur).terminator = Some(Terminator::Jump { target: cond_label });
    }

    *current = merge_label;
}

fn lower_for(
    init: Option<&Stmt>,
    cond: Option<&Expr>,
    step: Option<&Stmt>,
    body: &Stmt,
    f: &mut MirFunction,
    current: &mut String,
) {
    if let Some(init) = init {
        lower_stmt(init, f, current);
    }

    let cond_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(cond_label.clone()));
    f.block_mut(current).terminator = Some(Terminator::Jump { target: cond_label.clone() });

    let mut cond_cur = cond_label.clone();
    let cond_t = match cond {
        Some(c) => lower_expr(c, f, &mut cond_cur),
        None => {
            let t = f.fresh_temp();
            f.block_mut(&cond_cur).instructions.push(MirInst::Const { result: t.clone(), value: Constant::Int(1), ty: Ty::Int });
            t
        }
    };

    let body_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(body_label.clone()));
    let merge_label = f.fresh_label();
    f.blocks.push(BasicBlock::new(merge_label.clone()));
    let incr_label = step.map(|_| f.fresh_label());
    if let Some(incr_label) = &incr_label {
        f.blocks.push(BasicBlock::new(incr_label.clone()));
    }

    f.block_mut(&cond_cur).terminator =
        Some(Terminator::Branch { cond: cond_t, then_label: body_label.clone(), else_label: merge_label.clone() });

    let mut body_cur = body_label;
    lower_stmt(body, f, &mut body_cur);
    if f.block_mut(&body_cur).terminator.is_none() {
        let target = incr_label.clone().unwrap_or_else(|| cond_label.clone());
        f.block_mut(&body_cur).terminator = Some(Terminator::Jump { target });
    }

    if let Some(incr_label) = incr_label {
        let mut incr_cur = incr_label;
        if let Some(step) = step {
            lower_stmt(step, f, &mut incr_cur);
        }
        if f.block_mut(&incr_cur).terminator.is_none() {
            f.block_mut(&incr_cur).terminator = Some(Terminator::Jump { target: cond_label });
        }
    }

    *current = merge_label;
}

fn lower_expr(expr: &Expr, f: &mut MirFunction, current: &mut String) -> String {
    match &expr.kind {
        ExprKind::Constant(lit) => {
            let t = f.fresh_temp();
            let (value, ty) = lower_literal(lit);
            f.block_mut(current).instructions.push(MirInst::Const { result: t.clone(), value, ty });
            t
        }
        ExprKind::Reference(name) => {
            let t = f.fresh_temp();
            let ty = expr.ty().unwrap_or(Ty::Int);
            f.block_mut(current).instructions.push(MirInst::Load { result: t.clone(), var: name.clone(), ty });
            t
        }
        ExprKind::Unary { op: UnOp::Plus, operand } => {
            // Unary `+` is a type-preserving no-op; nothing to emit.
            lower_expr(operand, f, current)
        }
        ExprKind::Unary { op, operand } => {
            let operand_t = lower_expr(operand, f, current);
            let t = f.fresh_temp();
            let ty = expr.ty().unwrap_or(Ty::Int);
            f.block_mut(current).instructions.push(MirInst::UnaryOp { result: t.clone(), op: lower_unop(*op), operand: operand_t, ty });
            t
        }
        ExprKind::Binary { op, left, right } => {
            let left_t = lower_expr(left, f, current);
            let right_t = lower_expr(right, f, current);
            let t = f.fresh_temp();
            let ty = expr.ty().unwrap_or(Ty::Int);
            f.block_mut(current).instructions.push(MirInst::BinOp { result: t.clone(), op: lower_binop(*op), lhs: left_t, rhs: right_t, ty });
            t
        }
        ExprKind::Call { callee, args } => {
            for arg in args {
                let v = lower_expr(arg, f, current);
                f.block_mut(current).instructions.push(MirInst::Param { value: v });
            }
            let is_void = expr.ty() == Some(Ty::Void);
            let result = if is_void { None } else { Some(f.fresh_temp()) };
            f.block_mut(current).instructions.push(MirInst::Call { result: result.clone(), name: callee.clone(), arg_count: args.len() });
            result.unwrap_or_default()
        }
    }
}

fn lower_literal(lit: &Literal) -> (Constant, Ty) {
    match lit {
        Literal::Int(v) => (Constant::Int(*v), Ty::Int),
        Literal::Float(v) => (Constant::Float(*v), Ty::Float),
        Literal::Char(v) => (Constant::Char(*v), Ty::Char),
        Literal::Str(v) => (Constant::Str(v.clone()), Ty::String),
    }
}

fn lower_binop(op: BinOp) -> MirOp {
    match op {
        BinOp::Eq => MirOp::Eq,
        BinOp::Ne => MirOp::Ne,
        BinOp::Lt => MirOp::Lt,
        BinOp::Le => MirOp::Le,
        BinOp::Gt => MirOp::Gt,
        BinOp::Ge => MirOp::Ge,
        BinOp::Add => MirOp::Add,
        BinOp::Sub => MirOp::Sub,
        BinOp::Mul => MirOp::Mul,
        BinOp::Div => MirOp::Div,
    }
}

fn lower_unop(op: UnOp) -> MirOp {
    match op {
        UnOp::Neg => MirOp::Neg,
        UnOp::Not => MirOp::Not,
        UnOp::Plus => unreachable!("unary + is handled directly in lower_expr"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticConfig;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::types::check;

    fn lower_src(src: &str) -> MirProgram {
        let mut lex_errors = Vec::new();
        let tokens = tokenize(src, &mut lex_errors);
        let mut sink = crate::error::DiagnosticSink::new(DiagnosticConfig::default());
        let program = parse(&tokens, &mut sink);
        resolve(&program, &mut sink);
        check(&program, &mut sink);
        assert!(!sink.has_errors());
        lower_program(&program)
    }

    #[test]
    fn empty_return_function_has_single_terminated_block() {
        let mir = lower_src("int main() { return 0; }");
        let f = &mir.functions[0];
        assert_eq!(f.blocks.len(), 1);
        assert!(matches!(f.blocks[0].terminator, Some(Terminator::RetVal { .. })));
    }

    #[test]
    fn missing_return_gets_implicit_zero() {
        let mir = lower_src("int main() { int x; x = 1; }");
        let f = &mir.functions[0];
        let last = f.blocks.last().unwrap();
        assert!(matches!(last.terminator, Some(Terminator::RetVal { .. })));
    }

    #[test]
    fn if_without_else_creates_merge_block() {
        let mir = lower_src("int main() { if (1) return 1; return 0; }");
        let f = &mir.functions[0];
        assert!(f.blocks.len() >= 3);
    }

    #[test]
    fn while_loop_creates_cond_body_merge_blocks() {
        let mir = lower_src("int main() { int i; i = 0; while (i < 10) { i = i + 1; } return i; }");
        let f = &mir.functions[0];
        assert!(f.blocks.len() >= 4);
    }

    #[test]
    fn call_emits_param_per_argument_then_call() {
        let mir = lower_src("int id(int x) { return x; } int main() { return id(5); }");
        let f = &mir.functions[1];
        let has_param = f.blocks.iter().any(|b| b.instructions.iter().any(|i| matches!(i, MirInst::Param { .. })));
        assert!(has_param);
    }
}
