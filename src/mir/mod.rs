//! Mid-level IR: functions as ordered basic blocks of three-address
//! instructions (spec §3, §4.7-4.8). Reuses `ast::Ty` as the MIR type
//! descriptor since MIR has no type kinds the AST doesn't already have.

pub mod lower;
pub mod optimize;

use std::collections::HashMap;
use std::fmt;

use crate::ast::Ty;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Char(char),
    Str(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v}"),
            Constant::Char(v) => write!(f, "{v:?}"),
            Constant::Str(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Defined for structural completeness with spec's instruction table;
    /// unreachable from lowering since Sara's grammar has no `%` operator.
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    /// Unreachable from lowering — see `Mod`.
    Shl,
    /// Unreachable from lowering — see `Mod`.
    Shr,
}

impl MirOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, MirOp::Eq | MirOp::Ne | MirOp::Lt | MirOp::Le | MirOp::Gt | MirOp::Ge)
    }

    pub fn is_unary(self) -> bool {
        matches!(self, MirOp::Neg | MirOp::Not)
    }
}

impl fmt::Display for MirOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MirOp::Add => "add",
            MirOp::Sub => "sub",
            MirOp::Mul => "mul",
            MirOp::Div => "div",
            MirOp::Mod => "mod",
            MirOp::Neg => "neg",
            MirOp::Eq => "eq",
            MirOp::Ne => "ne",
            MirOp::Lt => "lt",
            MirOp::Le => "le",
            MirOp::Gt => "gt",
            MirOp::Ge => "ge",
            MirOp::Not => "not",
            MirOp::Shl => "shl",
            MirOp::Shr => "shr",
        };
        write!(f, "{s}")
    }
}

/// A single three-address instruction. Binary/unary operands are always
/// temporary names: leaves are always materialized into a temp first via
/// `Const`/`Load` (spec §4.7).
#[derive(Debug, Clone)]
pub enum MirInst {
    Const { result: String, value: Constant, ty: Ty },
    Load { result: String, var: String, ty: Ty },
    Store { var: String, value: String },
    BinOp { result: String, op: MirOp, lhs: String, rhs: String, ty: Ty },
    UnaryOp { result: String, op: MirOp, operand: String, ty: Ty },
    Param { value: String },
    Call { result: Option<String>, name: String, arg_count: usize },
}

impl MirInst {
    pub fn result(&self) -> Option<&str> {
        match self {
            MirInst::Const { result, .. }
            | MirInst::Load { result, .. }
            | MirInst::BinOp { result, .. }
            | MirInst::UnaryOp { result, .. } => Some(result),
            MirInst::Call { result, .. } => result.as_deref(),
            MirInst::Store { .. } | MirInst::Param { .. } => None,
        }
    }

    /// Temporaries/variables read by this instruction (not including its
    /// own result).
    pub fn uses(&self) -> Vec<&str> {
        match self {
            MirInst::Const { .. } => vec![],
            MirInst::Load { .. } => vec![],
            MirInst::Store { value, .. } => vec![value.as_str()],
            MirInst::BinOp { lhs, rhs, .. } => vec![lhs.as_str(), rhs.as_str()],
            MirInst::UnaryOp { operand, .. } => vec![operand.as_str()],
            MirInst::Param { value } => vec![value.as_str()],
            MirInst::Call { .. } => vec![],
        }
    }

    /// Whether removing this instruction (because its result is unused)
    /// would change observable behavior.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, MirInst::Store { .. } | MirInst::Param { .. } | MirInst::Call { .. })
    }

    fn fmt_text(&self) -> String {
        match self {
            MirInst::Const { result, value, .. } => format!("{result} = const({value})"),
            MirInst::Load { result, var, .. } => format!("{result} = load({var})"),
            MirInst::Store { var, value } => format!("store({var}, {value})"),
            MirInst::BinOp { result, op, lhs, rhs, .. } => format!("{result} = {op}({lhs}, {rhs})"),
            MirInst::UnaryOp { result, op, operand, .. } => format!("{result} = {op}({operand})"),
            MirInst::Param { value } => format!("param({value})"),
            MirInst::Call { result: Some(r), name, arg_count } => format!("{r} = call({name}, argc={arg_count})"),
            MirInst::Call { result: None, name, arg_count } => format!("call({name}, argc={arg_count})"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Jump { target: String },
    Branch { cond: String, then_label: String, else_label: String },
    Return,
    RetVal { value: String },
}

impl Terminator {
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Terminator::Jump { target } => vec![target.as_str()],
            Terminator::Branch { then_label, else_label, .. } => vec![then_label.as_str(), else_label.as_str()],
            Terminator::Return | Terminator::RetVal { .. } => vec![],
        }
    }

    fn fmt_text(&self) -> String {
        match self {
            Terminator::Jump { target } => format!("jump({target})"),
            Terminator::Branch { cond, then_label, else_label } => {
                format!("branch({cond}, {then_label}, {else_label})")
            }
            Terminator::Return => "return()".to_string(),
            Terminator::RetVal { value } => format!("retval({value})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<MirInst>,
    pub terminator: Option<Terminator>,
    pub predecessors: Vec<String>,
    pub successors: Vec<String>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), instructions: Vec::new(), terminator: None, predecessors: Vec::new(), successors: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct MirFunction {
    pub name: String,
    pub return_type: Ty,
    pub parameters: Vec<String>,
    pub parameter_types: Vec<Ty>,
    pub var_types: HashMap<String, Ty>,
    pub blocks: Vec<BasicBlock>,
    temp_counter: u32,
    label_counter: u32,
}

impl MirFunction {
    pub fn new(name: impl Into<String>, return_type: Ty) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters: Vec::new(),
            parameter_types: Vec::new(),
            var_types: HashMap::new(),
            blocks: Vec::new(),
            temp_counter: 0,
            label_counter: 0,
        }
    }

    pub fn fresh_temp(&mut self) -> String {
        let t = format!("t{}", self.temp_counter);
        self.temp_counter += 1;
        t
    }

    pub fn fresh_label(&mut self) -> String {
        let l = format!("BB{}", self.label_counter);
        self.label_counter += 1;
        l
    }

    pub fn block_mut(&mut self, label: &str) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.label == label).expect("label refers to a block in this function")
    }

    pub fn entry_label(&self) -> &str {
        self.blocks.first().map(|b| b.label.as_str()).unwrap_or("entry")
    }
}

#[derive(Debug, Clone, Default)]
pub struct MirProgram {
    pub functions: Vec<MirFunction>,
}

impl MirProgram {
    /// Render the textual MIR form described in spec §6, used for the
    /// `--mir` driver flag and for snapshot tests.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for f in &self.functions {
            out.push_str(&format!("function {}({}):\n", f.name, f.parameters.join(", ")));
            for block in &f.blocks {
                out.push_str(&format!("{}:\n", block.label));
                for inst in &block.instructions {
                    out.push_str(&format!("    {}\n", inst.fmt_text()));
                }
                if let Some(term) = &block.terminator {
                    out.push_str(&format!("    {}\n", term.fmt_text()));
                }
            }
        }
        out
    }
}
