//! Textual LLVM-IR emitter (spec §4.9).
//!
//! One pass per function: a monotonically increasing SSA counter starting
//! at 1, a map from MIR temporaries to their SSA name and LLVM type, a set
//! of temporaries known to already be `i1` (comparison results), and a map
//! from variable name to its `alloca` slot and declared type. String and
//! `print`-format globals are interned module-wide and emitted before any
//! function body.

use std::collections::HashMap;

use crate::ast::Ty;
use crate::mir::{Constant, MirFunction, MirInst, MirOp, MirProgram, Terminator};

use super::{CodeGenError, Result};

/// `int -> i32`, `char -> i8`, `float -> double`, `string -> i8*`, `void -> void`.
fn llvm_type(ty: Ty) -> &'static str {
    match ty {
        Ty::Int => "i32",
        Ty::Char => "i8",
        Ty::Float => "double",
        Ty::String => "i8*",
        Ty::Void => "void",
    }
}

fn printf_specifier(ty: Ty) -> &'static str {
    match ty {
        Ty::Int => "%d",
        Ty::Char => "%c",
        Ty::Float => "%f",
        Ty::String => "%s",
        Ty::Void => unreachable!("a void-typed value can never reach print's argument list"),
    }
}

/// LLVM requires an exact bit pattern for `double` literals that cannot be
/// round-tripped through decimal text reliably; the hex form sidesteps that.
fn format_double(v: f64) -> String {
    format!("0x{:016X}", v.to_bits())
}

fn escape_bytes(s: &str) -> String {
    let mut out = String::new();
    for b in s.as_bytes() {
        match *b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\22"),
            0x20..=0x7e => out.push(*b as char),
            _ => out.push_str(&format!("\\{b:02X}")),
        }
    }
    out
}

struct ModuleCtx<'a> {
    functions: &'a [MirFunction],
    strings: Vec<(String, String)>,
    string_index: HashMap<String, usize>,
    formats: Vec<(String, String)>,
    format_index: HashMap<String, usize>,
    printf_declared: bool,
}

impl<'a> ModuleCtx<'a> {
    fn new(functions: &'a [MirFunction]) -> Self {
        Self {
            functions,
            strings: Vec::new(),
            string_index: HashMap::new(),
            formats: Vec::new(),
            format_index: HashMap::new(),
            printf_declared: false,
        }
    }

    fn find_function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    fn intern_string(&mut self, content: &str) -> String {
        if let Some(&idx) = self.string_index.get(content) {
            return self.strings[idx].1.clone();
        }
        let name = format!("@.str.{}", self.strings.len());
        self.string_index.insert(content.to_string(), self.strings.len());
        self.strings.push((content.to_string(), name.clone()));
        name
    }

    fn intern_format(&mut self, content: &str) -> String {
        if let Some(&idx) = self.format_index.get(content) {
            return self.formats[idx].1.clone();
        }
        let name = format!("@.fmt.{}", self.formats.len());
        self.format_index.insert(content.to_string(), self.formats.len());
        self.formats.push((content.to_string(), name.clone()));
        name
    }
}

struct FuncCtx {
    ssa_counter: u32,
    temp_map: HashMap<String, String>,
    temp_types: HashMap<String, Ty>,
    bool_temps: std::collections::HashSet<String>,
    var_slots: HashMap<String, Ty>,
    block_labels: HashMap<String, String>,
    pending_params: Vec<(String, Ty)>,
}

impl FuncCtx {
    fn fresh(&mut self) -> String {
        let n = self.ssa_counter;
        self.ssa_counter += 1;
        format!("%{n}")
    }

    fn operand(&self, temp: &str) -> Result<(String, Ty)> {
        let ssa = self.temp_map.get(temp).ok_or_else(|| CodeGenError::UnknownTemporary(temp.to_string()))?;
        let ty = self.temp_types[temp];
        Ok((ssa.clone(), ty))
    }

    /// Coerce an already-materialized SSA value from `from` to `to`,
    /// appending any conversion instruction to `lines`. A no-op when the
    /// types already match (spec §4.9: "coercing via `trunc` / `sitofp` as
    /// needed").
    fn coerce(&mut self, lines: &mut Vec<String>, ssa: &str, from: Ty, to: Ty) -> String {
        if from == to {
            return ssa.to_string();
        }
        match (from, to) {
            (Ty::Int, Ty::Char) => {
                let d = self.fresh();
                lines.push(format!("  {d} = trunc i32 {ssa} to i8"));
                d
            }
            (Ty::Char, Ty::Int) => {
                let d = self.fresh();
                lines.push(format!("  {d} = zext i8 {ssa} to i32"));
                d
            }
            (Ty::Int, Ty::Float) | (Ty::Char, Ty::Float) => {
                let d = self.fresh();
                lines.push(format!("  {d} = sitofp {} {ssa} to double", llvm_type(from)));
                d
            }
            (Ty::Float, Ty::Int) => {
                let d = self.fresh();
                lines.push(format!("  {d} = fptosi double {ssa} to i32"));
                d
            }
            (Ty::Float, Ty::Char) => {
                let d = self.fresh();
                lines.push(format!("  {d} = fptosi double {ssa} to i8"));
                d
            }
            _ => ssa.to_string(),
        }
    }
}

pub fn emit_program(program: &MirProgram) -> Result<String> {
    let mut module = ModuleCtx::new(&program.functions);
    let mut bodies = String::new();
    for f in &program.functions {
        bodies.push_str(&emit_function(f, &mut module)?);
        bodies.push('\n');
    }

    let mut out = String::new();
    for (content, name) in &module.strings {
        let escaped = escape_bytes(content);
        out.push_str(&format!(
            "{name} = private unnamed_addr constant [{} x i8] c\"{escaped}\\00\"\n",
            content.len() + 1
        ));
    }
    for (content, name) in &module.formats {
        let escaped = escape_bytes(content);
        out.push_str(&format!(
            "{name} = private unnamed_addr constant [{} x i8] c\"{escaped}\\00\"\n",
            content.len() + 1
        ));
    }
    if !module.strings.is_empty() || !module.formats.is_empty() {
        out.push('\n');
    }
    if module.printf_declared {
        out.push_str("declare i32 @printf(i8* noundef, ...)\n\n");
    }
    out.push_str(&bodies);
    Ok(out)
}

fn emit_function(f: &MirFunction, module: &mut ModuleCtx) -> Result<String> {
    let mut ctx = FuncCtx {
        ssa_counter: 1,
        temp_map: HashMap::new(),
        temp_types: HashMap::new(),
        bool_temps: std::collections::HashSet::new(),
        var_slots: HashMap::new(),
        block_labels: HashMap::new(),
        pending_params: Vec::new(),
    };

    let mut var_names: Vec<&String> = f.var_types.keys().collect();
    var_names.sort();
    for name in &var_names {
        ctx.var_slots.insert((*name).clone(), f.var_types[*name]);
    }

    for (i, block) in f.blocks.iter().enumerate().skip(1) {
        ctx.block_labels.insert(block.label.clone(), format!("bb{}", i - 1));
    }

    let params_sig: String =
        f.parameters.iter().zip(&f.parameter_types).map(|(name, ty)| format!("{} %{name}", llvm_type(*ty))).collect::<Vec<_>>().join(", ");

    let mut out = format!("define {} @{}({params_sig}) {{\n", llvm_type(f.return_type), f.name);

    // Entry prologue: one alloca per variable, then store incoming
    // parameters, then null-initialize uninitialized string locals.
    for name in &var_names {
        let ty = ctx.var_slots[*name];
        out.push_str(&format!("  %{name}.addr = alloca {}\n", llvm_type(ty)));
    }
    for (name, ty) in f.parameters.iter().zip(&f.parameter_types) {
        out.push_str(&format!("  store {} %{name}, {}* %{name}.addr\n", llvm_type(*ty), llvm_type(*ty)));
    }
    let param_set: std::collections::HashSet<&String> = f.parameters.iter().collect();
    for name in &var_names {
        let ty = ctx.var_slots[*name];
        if ty == Ty::String && !param_set.contains(*name) {
            out.push_str(&format!("  store i8* null, i8** %{name}.addr\n"));
        }
    }

    for (i, block) in f.blocks.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("{}:\n", ctx.block_labels[&block.label]));
        }
        for inst in &block.instructions {
            out.push_str(&emit_inst(inst, &mut ctx, module)?);
        }
        if let Some(term) = &block.terminator {
            out.push_str(&emit_terminator(term, &mut ctx, f.return_type)?);
        }
    }

    out.push_str("}\n");
    Ok(out)
}

fn emit_inst(inst: &MirInst, ctx: &mut FuncCtx, module: &mut ModuleCtx) -> Result<String> {
    let mut lines = Vec::new();
    match inst {
        MirInst::Const { result, value, ty: _ } => match value {
            Constant::Int(v) => {
                let d = ctx.fresh();
                lines.push(format!("  {d} = add i32 0, {v}"));
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), Ty::Int);
            }
            Constant::Char(c) => {
                let d = ctx.fresh();
                lines.push(format!("  {d} = add i8 0, {}", *c as u32));
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), Ty::Char);
            }
            Constant::Float(v) => {
                let d = ctx.fresh();
                lines.push(format!("  {d} = fadd double {}, {}", format_double(0.0), format_double(*v)));
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), Ty::Float);
            }
            Constant::Str(s) => {
                let global = module.intern_string(s);
                let len = s.len() + 1;
                let d = ctx.fresh();
                lines.push(format!("  {d} = getelementptr inbounds [{len} x i8], [{len} x i8]* {global}, i64 0, i64 0"));
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), Ty::String);
            }
        },
        MirInst::Load { result, var, ty } => {
            let slot_ty = *ctx.var_slots.get(var).unwrap_or(ty);
            let d = ctx.fresh();
            lines.push(format!("  {d} = load {}, {}* %{var}.addr", llvm_type(slot_ty), llvm_type(slot_ty)));
            ctx.temp_map.insert(result.clone(), d);
            ctx.temp_types.insert(result.clone(), slot_ty);
        }
        MirInst::Store { var, value } => {
            let (ssa, ty) = ctx.operand(value)?;
            let slot_ty = *ctx.var_slots.get(var).ok_or_else(|| CodeGenError::UnknownVariable(var.clone()))?;
            let coerced = ctx.coerce(&mut lines, &ssa, ty, slot_ty);
            lines.push(format!("  store {} {coerced}, {}* %{var}.addr", llvm_type(slot_ty), llvm_type(slot_ty)));
        }
        MirInst::BinOp { result, op, lhs, rhs, ty } => {
            let (lssa, lty) = ctx.operand(lhs)?;
            let (rssa, rty) = ctx.operand(rhs)?;
            if op.is_comparison() {
                let cmp_ty = if lty == Ty::Float || rty == Ty::Float { Ty::Float } else { Ty::Int };
                let l = ctx.coerce(&mut lines, &lssa, lty, cmp_ty);
                let r = ctx.coerce(&mut lines, &rssa, rty, cmp_ty);
                let d = ctx.fresh();
                if cmp_ty == Ty::Float {
                    lines.push(format!("  {d} = fcmp {} double {l}, {r}", fcmp_pred(*op)));
                } else {
                    lines.push(format!("  {d} = icmp {} i32 {l}, {r}", icmp_pred(*op)));
                }
                ctx.bool_temps.insert(d.clone());
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), *ty);
            } else {
                let l = ctx.coerce(&mut lines, &lssa, lty, *ty);
                let r = ctx.coerce(&mut lines, &rssa, rty, *ty);
                let d = ctx.fresh();
                if *ty == Ty::Float {
                    let opname = match op {
                        MirOp::Add => "fadd",
                        MirOp::Sub => "fsub",
                        MirOp::Mul => "fmul",
                        MirOp::Div => "fdiv",
                        _ => unreachable!("non-comparison arithmetic op"),
                    };
                    lines.push(format!("  {d} = {opname} double {l}, {r}"));
                } else {
                    let t = llvm_type(*ty);
                    let opname = match op {
                        MirOp::Add => "add",
                        MirOp::Sub => "sub",
                        MirOp::Mul => "mul",
                        MirOp::Div => "sdiv",
                        _ => unreachable!("non-comparison arithmetic op"),
                    };
                    lines.push(format!("  {d} = {opname} {t} {l}, {r}"));
                }
                ctx.temp_map.insert(result.clone(), d);
                ctx.temp_types.insert(result.clone(), *ty);
            }
        }
        MirInst::UnaryOp { result, op, operand, ty } => {
            let (ossa, oty) = ctx.operand(operand)?;
            match op {
                MirOp::Neg => {
                    let target = if *ty == Ty::Float { Ty::Float } else { *ty };
                    let o = ctx.coerce(&mut lines, &ossa, oty, target);
                    let d = ctx.fresh();
                    if target == Ty::Float {
                        lines.push(format!("  {d} = fsub double {}, {o}", format_double(0.0)));
                    } else {
                        lines.push(format!("  {d} = sub {} 0, {o}", llvm_type(target)));
                    }
                    ctx.temp_map.insert(result.clone(), d);
                    ctx.temp_types.insert(result.clone(), target);
                }
                MirOp::Not => {
                    let d_bool = ctx.fresh();
                    if oty == Ty::Float {
                        lines.push(format!("  {d_bool} = fcmp oeq double {ossa}, {}", format_double(0.0)));
                    } else {
                        lines.push(format!("  {d_bool} = icmp eq {} {ossa}, 0", llvm_type(oty)));
                    }
                    let d = ctx.fresh();
                    if *ty == Ty::Float {
                        lines.push(format!("  {d} = uitofp i1 {d_bool} to double"));
                    } else {
                        lines.push(format!("  {d} = zext i1 {d_bool} to {}", llvm_type(*ty)));
                    }
                    ctx.temp_map.insert(result.clone(), d);
                    ctx.temp_types.insert(result.clone(), *ty);
                }
                _ => unreachable!("non-unary op in UnaryOp instruction"),
            }
        }
        MirInst::Param { value } => {
            let (ssa, ty) = ctx.operand(value)?;
            ctx.pending_params.push((ssa, ty));
        }
        MirInst::Call { result, name, arg_count } => {
            let start = ctx.pending_params.len().saturating_sub(*arg_count);
            let args: Vec<(String, Ty)> = ctx.pending_params.split_off(start);

            if name == "print" {
                module.printf_declared = true;
                let format: String = args.iter().map(|(_, ty)| printf_specifier(*ty)).collect::<String>() + "\n";
                let fmt_global = module.intern_format(&format);
                let len = format.len() + 1;
                let fmt_ptr = ctx.fresh();
                lines.push(format!("  {fmt_ptr} = getelementptr inbounds [{len} x i8], [{len} x i8]* {fmt_global}, i64 0, i64 0"));

                let mut call_args = Vec::new();
                for (ssa, ty) in &args {
                    match ty {
                        Ty::Char => {
                            let widened = ctx.coerce(&mut lines, ssa, *ty, Ty::Int);
                            call_args.push(format!("i32 {widened}"));
                        }
                        Ty::Int => call_args.push(format!("i32 {ssa}")),
                        Ty::Float => call_args.push(format!("double {ssa}")),
                        Ty::String => call_args.push(format!("i8* {ssa}")),
                        Ty::Void => unreachable!("void argument to print"),
                    }
                }
                let joined = call_args.join(", ");
                let sep = if joined.is_empty() { String::new() } else { format!(", {joined}") };
                lines.push(format!("  call i32 (i8*, ...) @printf(i8* {fmt_ptr}{sep})"));
            } else {
                let callee =
                    module.find_function(name).ok_or_else(|| CodeGenError::UnknownFunction(name.clone()))?;
                let param_types = callee.parameter_types.clone();
                let ret_ty = callee.return_type;
                let mut call_args = Vec::new();
                for ((ssa, ty), pty) in args.iter().zip(&param_types) {
                    let coerced = ctx.coerce(&mut lines, ssa, *ty, *pty);
                    call_args.push(format!("{} {coerced}", llvm_type(*pty)));
                }
                let joined = call_args.join(", ");
                match result {
                    Some(r) => {
                        let d = ctx.fresh();
                        lines.push(format!("  {d} = call {} @{name}({joined})", llvm_type(ret_ty)));
                        ctx.temp_map.insert(r.clone(), d);
                        ctx.temp_types.insert(r.clone(), ret_ty);
                    }
                    None => {
                        lines.push(format!("  call void @{name}({joined})"));
                    }
                }
            }
        }
    }
    Ok(lines.join("\n") + if lines.is_empty() { "" } else { "\n" })
}

fn emit_terminator(term: &Terminator, ctx: &mut FuncCtx, ret_ty: Ty) -> Result<String> {
    let mut lines = Vec::new();
    match term {
        Terminator::Jump { target } => {
            lines.push(format!("  br label %{}", ctx.block_labels[target]));
        }
        Terminator::Branch { cond, then_label, else_label } => {
            let (ssa, ty) = ctx.operand(cond)?;
            let bit = if ctx.bool_temps.contains(&ssa) {
                ssa
            } else {
                let d = ctx.fresh();
                lines.push(format!("  {d} = icmp ne {} {ssa}, 0", llvm_type(ty)));
                d
            };
            lines.push(format!("  br i1 {bit}, label %{}, label %{}", ctx.block_labels[then_label], ctx.block_labels[else_label]));
        }
        Terminator::Return => {
            lines.push("  ret void".to_string());
        }
        Terminator::RetVal { value } => {
            let (ssa, ty) = ctx.operand(value)?;
            let coerced = ctx.coerce(&mut lines, &ssa, ty, ret_ty);
            lines.push(format!("  ret {} {coerced}", llvm_type(ret_ty)));
        }
    }
    Ok(lines.join("\n") + "\n")
}

fn icmp_pred(op: MirOp) -> &'static str {
    match op {
        MirOp::Eq => "eq",
        MirOp::Ne => "ne",
        MirOp::Lt => "slt",
        MirOp::Le => "sle",
        MirOp::Gt => "sgt",
        MirOp::Ge => "sge",
        _ => unreachable!("not a comparison op"),
    }
}

fn fcmp_pred(op: MirOp) -> &'static str {
    match op {
        MirOp::Eq => "oeq",
        MirOp::Ne => "one",
        MirOp::Lt => "olt",
        MirOp::Le => "ole",
        MirOp::Gt => "ogt",
        MirOp::Ge => "oge",
        _ => unreachable!("not a comparison op"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagnosticConfig;
    use crate::lexer::tokenize;
    use crate::mir::lower::lower_program;
    use crate::mir::optimize::optimize;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::types::check;

    fn emit_src(src: &str) -> String {
        let mut lex_errors = Vec::new();
        let tokens = tokenize(src, &mut lex_errors);
        let mut sink = crate::error::DiagnosticSink::new(DiagnosticConfig::default());
        let program = parse(&tokens, &mut sink);
        resolve(&program, &mut sink);
        check(&program, &mut sink);
        assert!(!sink.has_errors());
        let mut mir = lower_program(&program);
        optimize(&mut mir);
        emit_program(&mir).unwrap()
    }

    #[test]
    fn empty_main_returns_zero() {
        let ir = emit_src("int main() { return 0; }");
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("ret i32"));
    }

    #[test]
    fn constant_folded_arithmetic_emits_final_value() {
        let ir = emit_src("int main() { int x; x = 2 + 3 * 4; return x; }");
        assert!(ir.contains("14"));
    }

    #[test]
    fn print_emits_printf_declaration_and_format_global() {
        let ir = emit_src("int main() { print(\"hi\"); return 0; }");
        assert!(ir.contains("declare i32 @printf"));
        assert!(ir.contains("@.str.0"));
        assert!(ir.contains("@.fmt.0"));
    }

    #[test]
    fn recursive_call_emits_self_call() {
        let ir = emit_src("int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } int main() { print(fact(5)); return 0; }");
        assert!(ir.contains("call i32 @fact"));
    }

    #[test]
    fn print_no_arguments_emits_bare_newline_format() {
        let ir = emit_src("int main() { print(); return 0; }");
        assert!(ir.contains("c\"\\0A\\00\""));
    }

    #[test]
    fn ssa_numbering_is_monotonic_within_a_function() {
        let ir = emit_src("int main() { int x; int y; x = 1; y = 2; return x + y; }");
        let nums: Vec<u32> = ir
            .lines()
            .filter_map(|l| l.trim_start().strip_prefix('%').and_then(|rest| rest.split(" = ").next()).and_then(|n| n.parse().ok()))
            .collect();
        let mut sorted = nums.clone();
        sorted.sort_unstable();
        assert_eq!(nums, sorted);
    }
}
