//! Symbol resolution: a single post-order pass threading a `SymbolTable`
//! through the AST, decorating every `Reference`, assignment target, and
//! `Call` node with its resolved `Attribute` (spec §4.4).

use std::rc::Rc;

use crate::ast::{Attribute, CompoundStmt, Expr, ExprKind, FnAttr, FunctionDef, Param, Program, Span, VarAttr};
use crate::error::{Category, Diagnostic, DiagnosticSink};
use crate::symbols::SymbolTable;

pub fn resolve(program: &Program, sink: &mut DiagnosticSink) -> SymbolTable {
    let mut table = SymbolTable::new();

    // Register every function signature first so calls can appear before
    // their callee's definition in source order (mutual/forward recursion).
    for f in &program.functions {
        let params: Vec<Param> = f.params.iter().map(|p| p.node.clone()).collect();
        let attr = Attribute::Fn(Rc::new(FnAttr {
            name: f.name.node.clone(),
            return_ty: f.return_ty,
            params,
            variadic: false,
        }));
        if table.define(&f.name.node, attr).is_err() {
            sink.emit(Diagnostic::error(
                Category::Name,
                format!("function '{}' is already declared", f.name.node),
                f.name.span,
            ));
        }
    }

    for f in &program.functions {
        resolve_function(f, &mut table, sink);
    }

    table
}

fn resolve_function(f: &FunctionDef, table: &mut SymbolTable, sink: &mut DiagnosticSink) {
    table.push_scope();
    let mut offset = 0u32;
    for p in &f.params {
        let attr = Attribute::Var(Rc::new(VarAttr { name: p.node.name.clone(), ty: p.node.ty, offset }));
        offset += 1;
        if table.define(&p.node.name, attr).is_err() {
            sink.emit(Diagnostic::error(
                Category::Name,
                format!("parameter '{}' is already declared", p.node.name),
                p.span,
            ));
        }
    }
    resolve_compound(&f.body, table, sink, &mut offset);
    table.pop_scope();
}

fn resolve_compound(c: &CompoundStmt, table: &mut SymbolTable, sink: &mut DiagnosticSink, offset: &mut u32) {
    table.push_scope();
    for decl in &c.decls {
        if let Some(init) = &decl.init {
            resolve_expr(init, table, sink);
        }
        let attr = Attribute::Var(Rc::new(VarAttr { name: decl.name.node.clone(), ty: decl.ty, offset: *offset }));
        *offset += 1;
        if table.define(&decl.name.node, attr).is_err() {
            sink.emit(Diagnostic::error(
                Category::Name,
                format!("'{}' is already declared in this scope", decl.name.node),
                decl.name.span,
            ));
        }
    }
    for stmt in &c.stmts {
        resolve_stmt(stmt, table, sink, offset);
    }
    table.pop_scope();
}

fn resolve_stmt(stmt: &crate::ast::Stmt, table: &mut SymbolTable, sink: &mut DiagnosticSink, offset: &mut u32) {
    use crate::ast::Stmt;
    match stmt {
        Stmt::Compound(c) => resolve_compound(c, table, sink, offset),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            resolve_expr(cond, table, sink);
            resolve_stmt(then_branch, table, sink, offset);
            if let Some(else_branch) = else_branch {
                resolve_stmt(else_branch, table, sink, offset);
            }
        }
        Stmt::While { cond, body, .. } => {
            resolve_expr(cond, table, sink);
            resolve_stmt(body, table, sink, offset);
        }
        Stmt::For { init, cond, step, body, .. } => {
            // The init declaration, if any, is scoped to the loop alone.
            table.push_scope();
            if let Some(init) = init {
                resolve_stmt(init, table, sink, offset);
            }
            if let Some(cond) = cond {
                resolve_expr(cond, table, sink);
            }
            if let Some(step) = step {
                resolve_stmt(step, table, sink, offset);
            }
            resolve_stmt(body, table, sink, offset);
            table.pop_scope();
        }
        Stmt::Assignment { target, value } => {
            resolve_expr(value, table, sink);
            resolve_expr(target, table, sink);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                resolve_expr(value, table, sink);
            }
        }
        Stmt::Declaration(decl) => {
            if let Some(init) = &decl.init {
                resolve_expr(init, table, sink);
            }
            let attr = Attribute::Var(Rc::new(VarAttr { name: decl.name.node.clone(), ty: decl.ty, offset: *offset }));
            *offset += 1;
            if table.define(&decl.name.node, attr).is_err() {
                sink.emit(Diagnostic::error(
                    Category::Name,
                    format!("'{}' is already declared in this scope", decl.name.node),
                    decl.name.span,
                ));
            }
        }
        Stmt::ExprStmt(e) => resolve_expr(e, table, sink),
    }
}

fn resolve_expr(expr: &Expr, table: &mut SymbolTable, sink: &mut DiagnosticSink) {
    match &expr.kind {
        ExprKind::Constant(_) => {}
        ExprKind::Reference(name) => match table.lookup(name) {
            Some(attr) => expr.set_attr(attr.clone()),
            None => report_undeclared(name, expr.span, sink),
        },
        ExprKind::Unary { operand, .. } => resolve_expr(operand, table, sink),
        ExprKind::Binary { left, right, .. } => {
            resolve_expr(left, table, sink);
            resolve_expr(right, table, sink);
        }
        ExprKind::Call { callee, args } => {
            for arg in args {
                resolve_expr(arg, table, sink);
            }
            match table.lookup(callee) {
                Some(attr) => expr.set_attr(attr.clone()),
                None => report_undeclared(callee, expr.span, sink),
            }
        }
    }
}

fn report_undeclared(name: &str, span: Span, sink: &mut DiagnosticSink) {
    sink.emit(
        Diagnostic::error(Category::Name, format!("'{name}' is not declared"), span)
            .with_suggestion(format!("declare '{name}' before using it")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticConfig;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn resolve_src(src: &str) -> (Program, DiagnosticSink) {
        let mut lex_errors = Vec::new();
        let tokens = tokenize(src, &mut lex_errors);
        let mut sink = DiagnosticSink::new(DiagnosticConfig::default());
        let program = parse(&tokens, &mut sink);
        resolve(&program, &mut sink);
        (program, sink)
    }

    #[test]
    fn reference_to_declared_local_resolves() {
        let (program, sink) = resolve_src("int main() { int x; x = 1; return x; }");
        assert!(!sink.has_errors());
        if let crate::ast::Stmt::Return { value: Some(v), .. } = &program.functions[0].body.stmts.last().unwrap() {
            assert!(v.attr().is_some());
        } else {
            panic!("expected return expression");
        }
    }

    #[test]
    fn undeclared_reference_is_a_name_error() {
        let (_, sink) = resolve_src("int main() { return y; }");
        assert!(sink.has_errors());
        assert_eq!(sink.diagnostics()[0].code, "E0003");
    }

    #[test]
    fn call_to_print_resolves_as_builtin() {
        let (program, sink) = resolve_src("int main() { print(\"hi\"); return 0; }");
        assert!(!sink.has_errors());
        if let crate::ast::Stmt::ExprStmt(e) = &program.functions[0].body.stmts[0] {
            assert!(e.attr().unwrap().as_fn().unwrap().variadic);
        } else {
            panic!("expected expression statement");
        }
    }

    #[test]
    fn recursive_call_resolves_before_definition_completes() {
        let (_, sink) = resolve_src(
            "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }",
        );
        assert!(!sink.has_errors());
    }

    #[test]
    fn for_loop_variable_is_scoped_to_the_loop() {
        let (_, sink) = resolve_src(
            "int main() { for (int i = 0; i < 10; i = i + 1) { } return i; }",
        );
        assert!(sink.has_errors());
    }
}
