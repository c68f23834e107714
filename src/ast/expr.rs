//! Expression AST nodes.
//!
//! Expression nodes are reference-counted (`Expr = Rc<ExprNode>`) from the
//! moment the parser builds them. Before the DAG-sharing optimizer runs
//! (spec §4.6) every node has exactly one parent and the `Rc` is just a
//! convenience; after it runs, multiple parents may point at the same node.
//! `ty`/`attr` are filled in place by the resolver and type checker through
//! `Cell`/`RefCell` so both phases can decorate a shared tree without needing
//! unique ownership.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Attribute, Span, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::Not => "!",
        };
        write!(f, "{s}")
    }
}

/// A literal value as recorded by the parser, already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl Literal {
    pub fn ty(&self) -> Ty {
        match self {
            Literal::Int(_) => Ty::Int,
            Literal::Float(_) => Ty::Float,
            Literal::Char(_) => Ty::Char,
            Literal::Str(_) => Ty::String,
        }
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Constant(Literal),
    /// A reference to a declared variable, by name.
    Reference(String),
    Unary {
        op: UnOp,
        operand: Expr,
    },
    Binary {
        op: BinOp,
        left: Expr,
        right: Expr,
    },
    /// `callee(args...)` — the built-in `print` is looked up the same way
    /// as a user function (see `symbols::builtins`).
    Call {
        callee: String,
        args: Vec<Expr>,
    },
}

/// An expression node. See module docs for why this is `Rc`-wrapped.
#[derive(Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
    ty: Cell<Option<Ty>>,
    attr: RefCell<Option<Attribute>>,
}

pub type Expr = Rc<ExprNode>;

impl ExprNode {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Rc::new(ExprNode { kind, span, ty: Cell::new(None), attr: RefCell::new(None) })
    }

    pub fn ty(&self) -> Option<Ty> {
        self.ty.get()
    }

    pub fn set_ty(&self, ty: Ty) {
        self.ty.set(Some(ty));
    }

    pub fn attr(&self) -> Option<Attribute> {
        self.attr.borrow().clone()
    }

    pub fn set_attr(&self, attr: Attribute) {
        *self.attr.borrow_mut() = Some(attr);
    }

    /// Structural key used by the AST DAG-sharing optimizer (spec §4.6).
    /// `Call` is intentionally excluded from the interning table passed to
    /// this function's callers (see `ast::optimize`) — computing the key is
    /// harmless, only *using* it to share call nodes would be unsound.
    pub fn canonical_key(&self) -> CanonKey {
        match &self.kind {
            ExprKind::Constant(lit) => CanonKey::Const(format!("{:?}", lit)),
            ExprKind::Reference(name) => CanonKey::Ref(name.clone()),
            ExprKind::Unary { op, operand } => {
                CanonKey::Unary(*op, Box::new(operand.canonical_key()))
            }
            ExprKind::Binary { op, left, right } => CanonKey::Binary(
                *op,
                Box::new(left.canonical_key()),
                Box::new(right.canonical_key()),
            ),
            ExprKind::Call { callee, args } => CanonKey::Call(
                callee.clone(),
                args.iter().map(|a| a.canonical_key()).collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonKey {
    Const(String),
    Ref(String),
    Unary(UnOp, Box<CanonKey>),
    Binary(BinOp, Box<CanonKey>, Box<CanonKey>),
    Call(String, Vec<CanonKey>),
}
