//! x86-64 System V GAS emitter — an alternate backend to `llvm` (spec
//! §4.10). Structurally mirrors the LLVM emitter's per-function bookkeeping,
//! but lowers straight to assembly text instead of SSA: locals live at
//! negative offsets from `%rbp` (assigned in the same deterministic,
//! sorted-by-name order the LLVM emitter uses for its `alloca`s), integer
//! arguments arrive in `%rdi, %rsi, %rdx, %rcx, %r8, %r9` then the stack,
//! and a round-robin allocator hands out `%r10..%r15, %rbx` (integers) or
//! `%xmm0..%xmm7` (floats) with no liveness analysis — values routinely get
//! reused further than they'd survive in a real allocator, which is why
//! this backend stays "alternate" rather than the default.

use std::collections::HashMap;

use crate::ast::Ty;
use crate::mir::{Constant, MirFunction, MirInst, MirOp, MirProgram, Terminator};

use super::{CodeGenError, Result};

const INT_SCRATCH: &[&str] = &["%r10", "%r11", "%r12", "%r13", "%r14", "%r15", "%rbx"];
const FLOAT_SCRATCH: &[&str] = &["%xmm0", "%xmm1", "%xmm2", "%xmm3", "%xmm4", "%xmm5", "%xmm6", "%xmm7"];
const ARG_REGS: &[&str] = &["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

fn is_float(ty: Ty) -> bool {
    ty == Ty::Float
}

struct ModuleCtx<'a> {
    functions: &'a [MirFunction],
    strings: Vec<(String, String)>,
    string_index: HashMap<String, usize>,
    printf_needed: bool,
}

impl<'a> ModuleCtx<'a> {
    fn new(functions: &'a [MirFunction]) -> Self {
        Self { functions, strings: Vec::new(), string_index: HashMap::new(), printf_needed: false }
    }

    fn find_function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    fn intern_string(&mut self, content: &str) -> String {
        if let Some(&idx) = self.string_index.get(content) {
            return self.strings[idx].1.clone();
        }
        let name = format!(".Lstr{}", self.strings.len());
        self.string_index.insert(content.to_string(), self.strings.len());
        self.strings.push((content.to_string(), name.clone()));
        name
    }
}

/// Round-robin location for a live temporary: a scratch register (the
/// common case) or, once the round-robin pool wraps, a reused one.
struct FuncCtx {
    var_offsets: HashMap<String, i32>,
    var_types: HashMap<String, Ty>,
    frame_size: i32,
    temp_loc: HashMap<String, String>,
    temp_types: HashMap<String, Ty>,
    int_rr: usize,
    float_rr: usize,
    block_labels: HashMap<String, String>,
    pending_params: Vec<(String, Ty)>,
    label_counter: u32,
}

impl FuncCtx {
    fn next_int_reg(&mut self) -> String {
        let r = INT_SCRATCH[self.int_rr % INT_SCRATCH.len()].to_string();
        self.int_rr += 1;
        r
    }

    fn next_float_reg(&mut self) -> String {
        let r = FLOAT_SCRATCH[self.float_rr % FLOAT_SCRATCH.len()].to_string();
        self.float_rr += 1;
        r
    }

    fn fresh_label(&mut self) -> String {
        let l = format!(".Ltmp{}", self.label_counter);
        self.label_counter += 1;
        l
    }

    fn location(&self, temp: &str) -> Result<(String, Ty)> {
        let loc = self.temp_loc.get(temp).ok_or_else(|| CodeGenError::UnknownTemporary(temp.to_string()))?;
        Ok((loc.clone(), self.temp_types[temp]))
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
    if !module.strings.is_empty() {
        out.push_str("  .section .rodata\n");
        for (content, label) in &module.strings {
            out.push_str(&format!("{label}:\n  .asciz \"{}\"\n", escape_asm(content)));
        }
    }
    out.push_str("  .text\n");
    for f in &program.functions {
        out.push_str(&format!("  .globl {}\n", f.name));
    }
    out.push_str(&bodies);
    if module.printf_needed {
        out.push_str("  .extern printf\n");
    }
    Ok(out)
}

fn escape_asm(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['\\', '"'],
            '\\' => vec!['\\', '\\'],
            '\n' => vec!['\\', 'n'],
            _ => vec![c],
        })
        .collect()
}

fn emit_function(f: &MirFunction, module: &mut ModuleCtx) -> Result<String> {
    let mut var_names: Vec<&String> = f.var_types.keys().collect();
    var_names.sort();

    let mut ctx = FuncCtx {
        var_offsets: HashMap::new(),
        var_types: f.var_types.clone(),
        frame_size: 0,
        temp_loc: HashMap::new(),
        temp_types: HashMap::new(),
        int_rr: 0,
        float_rr: 0,
        block_labels: HashMap::new(),
        pending_params: Vec::new(),
        label_counter: 0,
    };

    for (i, name) in var_names.iter().enumerate() {
        ctx.var_offsets.insert((*name).clone(), -8 * (i as i32 + 1));
    }
    ctx.frame_size = ((var_names.len() as i32 * 8 + 15) / 16) * 16;

    for (i, block) in f.blocks.iter().enumerate().skip(1) {
        ctx.block_labels.insert(block.label.clone(), format!(".L{}_{}", f.name, i - 1));
    }

    let mut out = format!("{}:\n", f.name);
    out.push_str("  pushq %rbp\n  movq %rsp, %rbp\n");
    if ctx.frame_size > 0 {
        out.push_str(&format!("  subq ${}, %rsp\n", ctx.frame_size));
    }

    for (i, (name, _ty)) in f.parameters.iter().zip(&f.parameter_types).enumerate() {
        let off = ctx.var_offsets[name];
        if i < ARG_REGS.len() {
            out.push_str(&format!("  movq {}, {off}(%rbp)\n", ARG_REGS[i]));
        } else {
            let stack_off = 16 + 8 * (i - ARG_REGS.len()) as i32;
            out.push_str(&format!("  movq {stack_off}(%rbp), %rax\n"));
            out.push_str(&format!("  movq %rax, {off}(%rbp)\n"));
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
            out.push_str(&emit_terminator(term, &mut ctx, &f.name)?);
        }
    }

    Ok(out)
}

fn emit_inst(inst: &MirInst, ctx: &mut FuncCtx, module: &mut ModuleCtx) -> Result<String> {
    let mut lines = Vec::new();
    match inst {
        MirInst::Const { result, value, .. } => match value {
            Constant::Int(v) => {
                let r = ctx.next_int_reg();
                lines.push(format!("  movq ${v}, {r}"));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), Ty::Int);
            }
            Constant::Char(c) => {
                let r = ctx.next_int_reg();
                lines.push(format!("  movq ${}, {r}", *c as u32));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), Ty::Char);
            }
            Constant::Float(v) => {
                let r = ctx.next_float_reg();
                let bits = v.to_bits();
                lines.push(format!("  movq ${bits}, %rax"));
                lines.push(format!("  movq %rax, {r}"));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), Ty::Float);
            }
            Constant::Str(s) => {
                let label = module.intern_string(s);
                let r = ctx.next_int_reg();
                lines.push(format!("  leaq {label}(%rip), {r}"));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), Ty::String);
            }
        },
        MirInst::Load { result, var, .. } => {
            let ty = *ctx.var_types.get(var).ok_or_else(|| CodeGenError::UnknownVariable(var.clone()))?;
            let off = ctx.var_offsets[var];
            if is_float(ty) {
                let r = ctx.next_float_reg();
                lines.push(format!("  movsd {off}(%rbp), {r}"));
                ctx.temp_loc.insert(result.clone(), r);
            } else {
                let r = ctx.next_int_reg();
                lines.push(format!("  movq {off}(%rbp), {r}"));
                ctx.temp_loc.insert(result.clone(), r);
            }
            ctx.temp_types.insert(result.clone(), ty);
        }
        MirInst::Store { var, value } => {
            let (loc, ty) = ctx.location(value)?;
            let off = ctx.var_offsets.get(var).copied().ok_or_else(|| CodeGenError::UnknownVariable(var.clone()))?;
            if is_float(ty) {
                lines.push(format!("  movsd {loc}, {off}(%rbp)"));
            } else {
                lines.push(format!("  movq {loc}, {off}(%rbp)"));
            }
        }
        MirInst::BinOp { result, op, lhs, rhs, ty } => {
            let (lloc, lty) = ctx.location(lhs)?;
            let (rloc, _rty) = ctx.location(rhs)?;
            if op.is_comparison() {
                let r = ctx.next_int_reg();
                if is_float(lty) {
                    lines.push(format!("  ucomisd {rloc}, {lloc}"));
                } else {
                    lines.push(format!("  cmpq {rloc}, {lloc}"));
                }
                let setcc = match op {
                    MirOp::Eq => "sete",
                    MirOp::Ne => "setne",
                    MirOp::Lt => "setl",
                    MirOp::Le => "setle",
                    MirOp::Gt => "setg",
                    MirOp::Ge => "setge",
                    _ => unreachable!(),
                };
                lines.push(format!("  {setcc} %al"));
                lines.push(format!("  movzbq %al, {r}"));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), *ty);
            } else if *ty == Ty::Float {
                let r = ctx.next_float_reg();
                lines.push(format!("  movsd {lloc}, {r}"));
                let opname = match op {
                    MirOp::Add => "addsd",
                    MirOp::Sub => "subsd",
                    MirOp::Mul => "mulsd",
                    MirOp::Div => "divsd",
                    _ => unreachable!(),
                };
                lines.push(format!("  {opname} {rloc}, {r}"));
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), Ty::Float);
            } else {
                let r = ctx.next_int_reg();
                lines.push(format!("  movq {lloc}, {r}"));
                match op {
                    MirOp::Add => lines.push(format!("  addq {rloc}, {r}")),
                    MirOp::Sub => lines.push(format!("  subq {rloc}, {r}")),
                    MirOp::Mul => lines.push(format!("  imulq {rloc}, {r}")),
                    MirOp::Div => {
                        lines.push(format!("  movq {r}, %rax"));
                        lines.push("  cqto".to_string());
                        lines.push(format!("  idivq {rloc}"));
                        lines.push(format!("  movq %rax, {r}"));
                    }
                    _ => unreachable!(),
                }
                ctx.temp_loc.insert(result.clone(), r);
                ctx.temp_types.insert(result.clone(), *ty);
            }
        }
        MirInst::UnaryOp { result, op, operand, ty } => {
            let (loc, oty) = ctx.location(operand)?;
            match op {
                MirOp::Neg if is_float(oty) => {
                    let r = ctx.next_float_reg();
                    lines.push(format!("  xorpd {r}, {r}"));
                    lines.push(format!("  subsd {loc}, {r}"));
                    ctx.temp_loc.insert(result.clone(), r);
                    ctx.temp_types.insert(result.clone(), Ty::Float);
                }
                MirOp::Neg => {
                    let r = ctx.next_int_reg();
                    lines.push(format!("  movq {loc}, {r}"));
                    lines.push(format!("  negq {r}"));
                    ctx.temp_loc.insert(result.clone(), r);
                    ctx.temp_types.insert(result.clone(), *ty);
                }
                MirOp::Not => {
                    let r = ctx.next_int_reg();
                    if is_float(oty) {
                        lines.push("  xorpd %xmm15, %xmm15".to_string());
                        lines.push(format!("  ucomisd %xmm15, {loc}"));
                    } else {
                        lines.push(format!("  cmpq $0, {loc}"));
                    }
                    lines.push("  sete %al".to_string());
                    lines.push(format!("  movzbq %al, {r}"));
                    ctx.temp_loc.insert(result.clone(), r);
                    ctx.temp_types.insert(result.clone(), *ty);
                }
                _ => unreachable!("non-unary op"),
            }
        }
        MirInst::Param { value } => {
            let (loc, ty) = ctx.location(value)?;
            ctx.pending_params.push((loc, ty));
        }
        MirInst::Call { result, name, arg_count } => {
            let start = ctx.pending_params.len().saturating_sub(*arg_count);
            let args: Vec<(String, Ty)> = ctx.pending_params.split_off(start);

            if name == "print" {
                module.printf_needed = true;
                let format: String =
                    args.iter().map(|(_, ty)| printf_specifier(*ty)).collect::<String>() + "\\n";
                let fmt_label = module.intern_string(&format);
                lines.push(format!("  leaq {fmt_label}(%rip), %rdi"));
                let mut int_idx = 1; // %rdi taken by the format pointer
                let mut float_idx = 0;
                for (loc, ty) in &args {
                    if is_float(*ty) {
                        let dst = format!("%xmm{float_idx}");
                        lines.push(format!("  movsd {loc}, {dst}"));
                        float_idx += 1;
                    } else if int_idx < ARG_REGS.len() {
                        lines.push(format!("  movq {loc}, {}", ARG_REGS[int_idx]));
                        int_idx += 1;
                    }
                }
                lines.push(format!("  movb ${float_idx}, %al"));
                lines.push("  callq printf".to_string());
            } else {
                let callee = module.find_function(name).ok_or_else(|| CodeGenError::UnknownFunction(name.clone()))?;
                let param_types = callee.parameter_types.clone();
                let mut int_idx = 0;
                let mut float_idx = 0;
                for ((loc, ty), _pty) in args.iter().zip(&param_types) {
                    if is_float(*ty) {
                        lines.push(format!("  movsd {loc}, %xmm{float_idx}"));
                        float_idx += 1;
                    } else if int_idx < ARG_REGS.len() {
                        lines.push(format!("  movq {loc}, {}", ARG_REGS[int_idx]));
                        int_idx += 1;
                    }
                }
                lines.push(format!("  callq {name}"));
                if let Some(r) = result {
                    let ret_ty = callee.return_type;
                    if is_float(ret_ty) {
                        let dst = ctx.next_float_reg();
                        lines.push(format!("  movsd %xmm0, {dst}"));
                        ctx.temp_loc.insert(r.clone(), dst);
                    } else {
                        let dst = ctx.next_int_reg();
                        lines.push(format!("  movq %rax, {dst}"));
                        ctx.temp_loc.insert(r.clone(), dst);
                    }
                    ctx.temp_types.insert(r.clone(), callee.return_type);
                }
            }
        }
    }
    Ok(lines.into_iter().map(|l| l + "\n").collect())
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

fn emit_terminator(term: &Terminator, ctx: &mut FuncCtx, func_name: &str) -> Result<String> {
    let epilogue = "  movq %rbp, %rsp\n  popq %rbp\n  ret\n";
    Ok(match term {
        Terminator::Jump { target } => format!("  jmp {}\n", ctx.block_labels[target]),
        Terminator::Branch { cond, then_label, else_label } => {
            let (loc, _ty) = ctx.location(cond)?;
            let else_jump = ctx.fresh_label();
            format!(
                "  cmpq $0, {loc}\n  je {else_jump}\n  jmp {}\n{else_jump}:\n  jmp {}\n",
                ctx.block_labels[then_label], ctx.block_labels[else_label]
            )
        }
        Terminator::Return => {
            let _ = func_name;
            epilogue.to_string()
        }
        Terminator::RetVal { value } => {
            let (loc, ty) = ctx.location(value)?;
            let mut out = String::new();
            if is_float(ty) {
                out.push_str(&format!("  movsd {loc}, %xmm0\n"));
            } else {
                out.push_str(&format!("  movq {loc}, %rax\n"));
            }
            out.push_str(epilogue);
            out
        }
    })
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
    fn main_function_has_standard_prologue_and_epilogue() {
        let asm = emit_src("int main() { return 0; }");
        assert!(asm.contains("main:"));
        assert!(asm.contains("pushq %rbp"));
        assert!(asm.contains("popq %rbp"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn print_call_sets_al_to_float_arg_count_and_calls_printf() {
        let asm = emit_src("int main() { print(\"hi\"); return 0; }");
        assert!(asm.contains("callq printf"));
        assert!(asm.contains("movb $0, %al"));
    }

    #[test]
    fn recursive_call_emits_callq_to_self() {
        let asm = emit_src("int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } int main() { return fact(5); }");
        assert!(asm.contains("callq fact"));
    }

    #[test]
    fn division_lowers_to_cqto_idiv_sequence() {
        let asm = emit_src("int main() { int x; int y; x = 10; y = 3; return x / y; }");
        assert!(asm.contains("cqto"));
        assert!(asm.contains("idivq"));
    }
}
