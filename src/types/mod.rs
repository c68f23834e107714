//! Type checker: a second post-order pass over the already-resolved AST
//! (spec §4.5). Decorates every expression node's `ty` cell and emits
//! `E0004` on any rule violation.

use crate::ast::{BinOp, CompoundStmt, Declaration, Expr, ExprKind, FunctionDef, Literal, Program, Stmt, Ty};
use crate::error::{Category, Diagnostic, DiagnosticSink, WarningKind};

pub fn check(program: &Program, sink: &mut DiagnosticSink) {
    for f in &program.functions {
        check_function(f, sink);
    }
}

fn check_function(f: &FunctionDef, sink: &mut DiagnosticSink) {
    check_compound(&f.body, f.return_ty, sink);
}

fn check_compound(c: &CompoundStmt, ret_ty: Ty, sink: &mut DiagnosticSink) {
    for decl in &c.decls {
        check_declaration(decl, sink);
    }
    for s in &c.stmts {
        check_stmt(s, ret_ty, sink);
    }
    check_unreachable_after_return(&c.stmts, sink);
}

/// W0001: the first statement following an unconditional `return` within the
/// same statement list can never execute.
fn check_unreachable_after_return(stmts: &[Stmt], sink: &mut DiagnosticSink) {
    if let Some(idx) = stmts.iter().position(|s| matches!(s, Stmt::Return { .. })) {
        if let Some(unreachable) = stmts.get(idx + 1) {
            sink.emit(Diagnostic::warning(
                WarningKind::UnreachableAfterReturn,
                "statement is unreachable: it follows a 'return' in the same block",
                unreachable.span(),
            ));
        }
    }
}

fn check_declaration(decl: &Declaration, sink: &mut DiagnosticSink) {
    if let Some(init) = &decl.init {
        if let Some(t) = check_value(init, sink) {
            if t != decl.ty {
                sink.emit(Diagnostic::error(
                    Category::Type,
                    format!("cannot initialize '{}' of type '{}' with a value of type '{t}'", decl.name.node, decl.ty),
                    decl.name.span,
                ));
            }
        }
    }
}

fn check_stmt(stmt: &Stmt, ret_ty: Ty, sink: &mut DiagnosticSink) {
    match stmt {
        Stmt::Compound(c) => check_compound(c, ret_ty, sink),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            check_value(cond, sink);
            check_stmt(then_branch, ret_ty, sink);
            if let Some(else_branch) = else_branch {
                check_stmt(else_branch, ret_ty, sink);
            }
        }
        Stmt::While { cond, body, span } => {
            check_value(cond, sink);
            if matches!(&cond.kind, ExprKind::Constant(Literal::Int(0))) {
                sink.emit(Diagnostic::warning(
                    WarningKind::DeadLoopBody,
                    "loop body is unreachable: condition is always false",
                    *span,
                ));
            }
            check_stmt(body, ret_ty, sink);
        }
        Stmt::For { init, cond, step, body, .. } => {
            if let Some(init) = init {
                check_stmt(init, ret_ty, sink);
            }
            if let Some(cond) = cond {
                check_value(cond, sink);
            }
            if let Some(step) = step {
                check_stmt(step, ret_ty, sink);
            }
            check_stmt(body, ret_ty, sink);
        }
        Stmt::Assignment { target, value } => {
            let target_ty = check_value(target, sink);
            let value_ty = check_value(value, sink);
            if let (Some(tt), Some(vt)) = (target_ty, value_ty) {
                if tt != vt {
                    sink.emit(Diagnostic::error(
                        Category::Type,
                        format!("cannot assign a value of type '{vt}' to a target of type '{tt}'"),
                        value.span,
                    ));
                }
            }
        }
        Stmt::Return { value, span } => match value {
            Some(e) => {
                if ret_ty == Ty::Void {
                    sink.emit(Diagnostic::error(
                        Category::Type,
                        "a 'void' function cannot return a value".to_string(),
                        *span,
                    ));
                }
                if let Some(t) = check_value(e, sink) {
                    if t != ret_ty && ret_ty != Ty::Void {
                        sink.emit(Diagnostic::error(
                            Category::Type,
                            format!("returned value has type '{t}', expected '{ret_ty}'"),
                            e.span,
                        ));
                    }
                }
            }
            None => {
                if ret_ty != Ty::Void {
                    sink.emit(Diagnostic::error(
                        Category::Type,
                        format!("missing return value of type '{ret_ty}'"),
                        *span,
                    ));
                }
            }
        },
        Stmt::Declaration(decl) => check_declaration(decl, sink),
        Stmt::ExprStmt(e) => {
            eval(e, sink, true);
        }
    }
}

/// Compute an expression's type in a value context: a `void`-typed result
/// (only reachable by calling `print` or a function whose only return path
/// is void) is an error here (spec §9 Open Question 1: `print` cannot
/// appear as a subexpression).
fn check_value(expr: &Expr, sink: &mut DiagnosticSink) -> Option<Ty> {
    eval(expr, sink, false)
}

fn eval(expr: &Expr, sink: &mut DiagnosticSink, allow_void: bool) -> Option<Ty> {
    let ty = match &expr.kind {
        ExprKind::Constant(lit) => Some(lit.ty()),
        ExprKind::Reference(name) => match expr.attr() {
            Some(attr) => match attr.as_var() {
                Some(v) => Some(v.ty),
                None => {
                    sink.emit(Diagnostic::error(Category::Type, format!("'{name}' is not a variable"), expr.span));
                    None
                }
            },
            // Already reported as a name error by the resolver.
            None => None,
        },
        ExprKind::Unary { operand, .. } => eval(operand, sink, false),
        ExprKind::Binary { op, left, right } => {
            let lt = eval(left, sink, false);
            let rt = eval(right, sink, false);
            match (lt, rt) {
                (Some(l), Some(r)) => match l.generalize(r) {
                    Some(t) => Some(t),
                    None => {
                        sink.emit(Diagnostic::error(
                            Category::Type,
                            format!("incompatible operand types '{l}' and '{r}' for '{}'", display_op(*op)),
                            expr.span,
                        ));
                        None
                    }
                },
                _ => None,
            }
        }
        ExprKind::Call { callee, args } => {
            for arg in args {
                eval(arg, sink, false);
            }
            match expr.attr() {
                Some(attr) => match attr.as_fn() {
                    Some(fn_attr) => {
                        if !fn_attr.variadic {
                            if args.len() != fn_attr.params.len() {
                                sink.emit(Diagnostic::error(
                                    Category::Type,
                                    format!(
                                        "'{callee}' expects {} argument(s), found {}",
                                        fn_attr.params.len(),
                                        args.len()
                                    ),
                                    expr.span,
                                ));
                            } else {
                                for (arg, param) in args.iter().zip(&fn_attr.params) {
                                    if let Some(at) = arg.ty() {
                                        if at != param.ty {
                                            sink.emit(Diagnostic::error(
                                                Category::Type,
                                                format!(
                                                    "argument '{}' expects type '{}', found '{at}'",
                                                    param.name, param.ty
                                                ),
                                                arg.span,
                                            ));
                                        }
                                    }
                                }
                            }
                        }
                        Some(fn_attr.return_ty)
                    }
                    None => {
                        sink.emit(Diagnostic::error(Category::Type, format!("'{callee}' is not a function"), expr.span));
                        None
                    }
                },
                // Already reported as a name error by the resolver.
                None => None,
            }
        }
    };

    if let Some(t) = ty {
        expr.set_ty(t);
    }

    if !allow_void {
        if let Some(Ty::Void) = ty {
            sink.emit(Diagnostic::error(
                Category::Type,
                "a 'void' value cannot be used in an expression (only a bare statement call may be void)".to_string(),
                expr.span,
            ));
            return None;
        }
    }

    ty
}

fn display_op(op: BinOp) -> String {
    op.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticConfig;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::resolver::resolve;

    fn check_src(src: &str) -> DiagnosticSink {
        let mut lex_errors = Vec::new();
        let tokens = tokenize(src, &mut lex_errors);
        let mut sink = DiagnosticSink::new(DiagnosticConfig::default());
        let program = parse(&tokens, &mut sink);
        resolve(&program, &mut sink);
        check(&program, &mut sink);
        sink
    }

    #[test]
    fn well_typed_program_has_no_errors() {
        let sink = check_src("int main() { int x; x = 2 + 3 * 4; return x; }");
        assert!(!sink.has_errors());
    }

    #[test]
    fn assignment_type_mismatch_is_an_error() {
        let sink = check_src("int main() { float x; x = 1; return 0; }");
        // int widens to... no, assignment requires exact equality, not generalization.
        assert!(sink.has_errors());
        assert_eq!(sink.diagnostics()[0].code, "E0004");
    }

    #[test]
    fn binary_op_over_string_is_rejected() {
        let sink = check_src("int main() { string s; s = \"a\" + \"b\"; return 0; }");
        assert!(sink.has_errors());
    }

    #[test]
    fn print_result_cannot_be_assigned() {
        let sink = check_src("int main() { int x; x = print(\"hi\"); return 0; }");
        assert!(sink.has_errors());
    }

    #[test]
    fn print_as_bare_statement_is_allowed() {
        let sink = check_src("int main() { print(\"hi\"); return 0; }");
        assert!(!sink.has_errors());
    }

    #[test]
    fn return_mismatch_is_an_error() {
        let sink = check_src("float f() { return 1; } int main() { return 0; }");
        assert!(sink.has_errors());
    }

    #[test]
    fn call_argument_count_mismatch_is_an_error() {
        let sink = check_src("int add(int a, int b) { return a + b; } int main() { return add(1); }");
        assert!(sink.has_errors());
    }

    #[test]
    fn statement_after_return_is_flagged_unreachable() {
        let sink = check_src("int main() { return 0; print(\"never\"); }");
        assert!(!sink.has_errors());
        assert!(sink.diagnostics().iter().any(|d| d.code == "W0001"));
    }

    #[test]
    fn statement_after_return_in_nested_block_is_not_flagged_by_outer_scope() {
        let sink = check_src("int main() { return 0; }");
        assert!(sink.diagnostics().iter().all(|d| d.code != "W0001"));
    }

    #[test]
    fn while_zero_loop_is_flagged_dead() {
        let sink = check_src("int main() { while (0) { print(\"never\"); } return 0; }");
        assert!(!sink.has_errors());
        assert!(sink.diagnostics().iter().any(|d| d.code == "W0002"));
    }

    #[test]
    fn while_nonzero_loop_is_not_flagged_dead() {
        let sink = check_src("int main() { while (1) { return 0; } return 1; }");
        assert!(sink.diagnostics().iter().all(|d| d.code != "W0002"));
    }
}
