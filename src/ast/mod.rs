//! Abstract syntax tree.
//!
//! Node shapes follow spec §3 with the simplification the design notes
//! license explicitly ("Variant trees without inheritance"): list-typed
//! productions (`ParameterList`, `ArgumentList`, `DeclarationList`,
//! `StatementList`) are plain `Vec<T>` fields rather than their own node
//! kind, since an ordered `Vec` already gives trivial generic traversal.

mod expr;
pub mod optimize;
mod span;
mod types;

pub use expr::*;
pub use span::*;
pub use types::*;

use std::rc::Rc;

/// A resolved function parameter (also used as the function signature's
/// parameter list, spec's `ParameterList`).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

/// Resolved-variable attribute record (spec §3 "Attributes").
#[derive(Debug, Clone, PartialEq)]
pub struct VarAttr {
    pub name: String,
    pub ty: Ty,
    /// Positional index within the owning function's frame, in declaration
    /// order starting at 0 (spec §3).
    pub offset: u32,
}

/// Resolved-function attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct FnAttr {
    pub name: String,
    pub return_ty: Ty,
    pub params: Vec<Param>,
    /// `true` for the single built-in, variadic `print`.
    pub variadic: bool,
}

#[derive(Debug, Clone)]
pub enum Attribute {
    Var(Rc<VarAttr>),
    Fn(Rc<FnAttr>),
}

impl Attribute {
    pub fn as_var(&self) -> Option<&Rc<VarAttr>> {
        match self {
            Attribute::Var(v) => Some(v),
            Attribute::Fn(_) => None,
        }
    }

    pub fn as_fn(&self) -> Option<&Rc<FnAttr>> {
        match self {
            Attribute::Fn(f) => Some(f),
            Attribute::Var(_) => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Attribute::Var(_) => "variable",
            Attribute::Fn(_) => "function",
        }
    }
}

/// A local declaration, optionally with an initializer expression.
#[derive(Debug)]
pub struct Declaration {
    pub ty: Ty,
    pub name: Spanned<String>,
    pub init: Option<Expr>,
}

/// A statement. Unlike `Expr`, statements are never shared: the DAG
/// optimizer only re-parents expression children (spec §4.6).
#[derive(Debug)]
pub enum Stmt {
    Compound(CompoundStmt),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `step` is a statement, not an expression: Sara's assignment is
    /// statement-only (`IDENT = expr ;`), so a C-style `i = i + 1` step
    /// clause can only be represented as an `Assignment`/`ExprStmt`, the
    /// same shape as `init` without the terminating `;`.
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Box<Stmt>,
        span: Span,
    },
    /// `target` is always an `ExprKind::Reference` node — representing the
    /// assignment's lvalue as a `Reference` lets the resolver and type
    /// checker decorate it through the same `ty`/`attr` cells as any other
    /// reference, instead of a separate mechanism for lvalues.
    Assignment {
        target: Expr,
        value: Expr,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    /// A bare declaration statement inside a compound statement's body.
    Declaration(Declaration),
    /// An expression evaluated for its side effect (only `print(...)` calls
    /// are legal here since every other expression form is non-`void` and
    /// would otherwise be a no-op the type checker should flag separately —
    /// see DESIGN.md Open Question 1).
    ExprStmt(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Compound(c) => c.span,
            Stmt::If { span, .. } => *span,
            Stmt::While { span, .. } => *span,
            Stmt::For { span, .. } => *span,
            Stmt::Assignment { target, .. } => target.span,
            Stmt::Return { span, .. } => *span,
            Stmt::Declaration(d) => d.name.span,
            Stmt::ExprStmt(e) => e.span,
        }
    }
}

/// `CompoundStatement(decls, stmts, scope)`. `decls` and `stmts` are kept
/// separate because Sara requires declarations to precede statements within
/// a block, matching the grammar summary in spec §4.3.
#[derive(Debug)]
pub struct CompoundStmt {
    pub decls: Vec<Declaration>,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Spanned<String>,
    pub return_ty: Ty,
    pub params: Vec<Spanned<Param>>,
    pub body: CompoundStmt,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
}
