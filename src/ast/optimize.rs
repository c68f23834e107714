//! Common-subexpression sharing over expression trees (spec §4.6).
//!
//! Walks every expression subtree bottom-up, interning by `canonical_key`.
//! `Call` nodes are deliberately excluded from the intern table: the key is
//! still computed (harmless), but a call is never looked up in or inserted
//! into the table, so two calls with identical arguments are never merged
//! into one node — merging them would be unsound if the callee has
//! observable side effects (spec §9 Open Question 3). Statements are
//! traversed only to reach their expression children; no statement is ever
//! rewritten.

use std::collections::HashMap;

use super::{CanonKey, CompoundStmt, Declaration, Expr, ExprKind, FunctionDef, Program, Stmt};

#[derive(Default)]
pub struct Interner {
    table: HashMap<CanonKey, Expr>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct interned nodes (for diagnostics/tests; not
    /// part of the emitted artifact).
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

pub fn optimize(program: &mut Program) -> Interner {
    let mut interner = Interner::new();
    for f in &mut program.functions {
        optimize_function(f, &mut interner);
    }
    interner
}

fn optimize_function(f: &mut FunctionDef, interner: &mut Interner) {
    optimize_compound(&mut f.body, interner);
}

fn optimize_compound(c: &mut CompoundStmt, interner: &mut Interner) {
    for decl in &mut c.decls {
        optimize_declaration(decl, interner);
    }
    for stmt in &mut c.stmts {
        optimize_stmt(stmt, interner);
    }
}

fn optimize_declaration(decl: &mut Declaration, interner: &mut Interner) {
    if let Some(init) = decl.init.take() {
        decl.init = Some(share(init, interner));
    }
}

fn optimize_stmt(stmt: &mut Stmt, interner: &mut Interner) {
    match stmt {
        Stmt::Compound(c) => optimize_compound(c, interner),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            replace_with_shared(cond, interner);
            optimize_stmt(then_branch, interner);
            if let Some(else_branch) = else_branch {
                optimize_stmt(else_branch, interner);
            }
        }
        Stmt::While { cond, body, .. } => {
            replace_with_shared(cond, interner);
            optimize_stmt(body, interner);
        }
        Stmt::For { init, cond, step, body, .. } => {
            if let Some(init) = init {
                optimize_stmt(init, interner);
            }
            if let Some(cond) = cond {
                replace_with_shared(cond, interner);
            }
            if let Some(step) = step {
                optimize_stmt(step, interner);
            }
            optimize_stmt(body, interner);
        }
        Stmt::Assignment { target, value } => {
            // `target` is a bare `Reference`; sharing it is legal (it has
            // no children to recurse into) but harmless either way.
            replace_with_shared(target, interner);
            replace_with_shared(value, interner);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                replace_with_shared(value, interner);
            }
        }
        Stmt::Declaration(decl) => optimize_declaration(decl, interner),
        Stmt::ExprStmt(e) => replace_with_shared(e, interner),
    }
}

fn replace_with_shared(slot: &mut Expr, interner: &mut Interner) {
    let taken = slot.clone();
    *slot = share(taken, interner);
}

/// Recurse into `expr`'s children first (so their canonical keys reflect
/// already-shared grandchildren), then either return the previously
/// interned node with the same key or intern this one.
fn share(expr: Expr, interner: &mut Interner) -> Expr {
    match &expr.kind {
        ExprKind::Constant(_) | ExprKind::Reference(_) => intern(expr, interner),
        ExprKind::Unary { .. } | ExprKind::Binary { .. } => {
            let shared_children = share_children(&expr, interner);
            intern(shared_children, interner)
        }
        ExprKind::Call { args, .. } => {
            // Recurse into arguments for their own sharing, but never share
            // (intern) the call node itself.
            let shared_args: Vec<Expr> = args.iter().cloned().map(|a| share(a, interner)).collect();
            if shared_args.iter().zip(args).all(|(a, b)| std::rc::Rc::ptr_eq(a, b)) {
                expr
            } else {
                let ExprKind::Call { callee, .. } = &expr.kind else { unreachable!() };
                let rebuilt = super::ExprNode::new(ExprKind::Call { callee: callee.clone(), args: shared_args }, expr.span);
                carry_decorations(&expr, &rebuilt);
                rebuilt
            }
        }
    }
}

fn share_children(expr: &Expr, interner: &mut Interner) -> Expr {
    match &expr.kind {
        ExprKind::Unary { op, operand } => {
            let shared = share(operand.clone(), interner);
            if std::rc::Rc::ptr_eq(&shared, operand) {
                expr.clone()
            } else {
                let rebuilt = super::ExprNode::new(ExprKind::Unary { op: *op, operand: shared }, expr.span);
                carry_decorations(expr, &rebuilt);
                rebuilt
            }
        }
        ExprKind::Binary { op, left, right } => {
            let shared_left = share(left.clone(), interner);
            let shared_right = share(right.clone(), interner);
            if std::rc::Rc::ptr_eq(&shared_left, left) && std::rc::Rc::ptr_eq(&shared_right, right) {
                expr.clone()
            } else {
                let rebuilt = super::ExprNode::new(
                    ExprKind::Binary { op: *op, left: shared_left, right: shared_right },
                    expr.span,
                );
                carry_decorations(expr, &rebuilt);
                rebuilt
            }
        }
        _ => expr.clone(),
    }
}

/// A freshly rebuilt node (same operator/callee, re-parented children) is
/// semantically identical to the node it replaces, so the resolver/type
/// checker's decorations (both passes run before this optimizer) carry over
/// unchanged rather than needing to be recomputed.
fn carry_decorations(from: &Expr, to: &Expr) {
    if let Some(ty) = from.ty() {
        to.set_ty(ty);
    }
    if let Some(attr) = from.attr() {
        to.set_attr(attr);
    }
}

fn intern(expr: Expr, interner: &mut Interner) -> Expr {
    let key = expr.canonical_key();
    if let Some(existing) = interner.table.get(&key) {
        return existing.clone();
    }
    interner.table.insert(key, expr.clone());
    expr
}
