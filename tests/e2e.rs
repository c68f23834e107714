//! End-to-end pipeline tests over the six scenarios and the documented
//! boundary cases: tokenize -> parse -> resolve -> check -> ast-optimize ->
//! lower -> mir-optimize -> emit. No external toolchain is invoked; these
//! check the emitted MIR/LLVM-IR text directly rather than executing it.

use sara::ast::optimize as ast_optimize;
use sara::codegen::llvm;
use sara::error::{DiagnosticConfig, DiagnosticSink};
use sara::lexer::tokenize;
use sara::mir::{lower, optimize as mir_optimize};
use sara::parser::parse;
use sara::resolver::resolve;
use sara::types::check;

struct Compiled {
    mir_pre: String,
    mir_post: String,
    llvm_ir: String,
}

fn compile(src: &str) -> Compiled {
    let mut lex_errors = Vec::new();
    let tokens = tokenize(src, &mut lex_errors);
    let mut sink = DiagnosticSink::new(DiagnosticConfig::default());
    for d in lex_errors {
        sink.emit(d);
    }

    let mut program = parse(&tokens, &mut sink);
    assert!(!sink.has_errors(), "parse errors: {:?}", sink.diagnostics());

    resolve(&program, &mut sink);
    check(&program, &mut sink);
    assert!(!sink.has_errors(), "semantic errors: {:?}", sink.diagnostics());

    ast_optimize::optimize(&mut program);

    let mut mir = lower::lower_program(&program);
    let mir_pre = mir.to_text();
    mir_optimize::optimize(&mut mir);
    let mir_post = mir.to_text();

    let llvm_ir = llvm::emit_program(&mir).expect("emission should not fail on a type-checked program");

    Compiled { mir_pre, mir_post, llvm_ir }
}

#[test]
fn scenario_1_empty_return_lowers_to_a_single_terminated_block() {
    let c = compile("int main() { return 0; }");
    assert_eq!(
        c.mir_post,
        "function main():\nentry:\n    t0 = const(0)\n    retval(t0)\n"
    );
    assert_eq!(
        c.llvm_ir,
        "define i32 @main() {\n  %1 = add i32 0, 0\n  ret i32 %1\n}\n\n"
    );
}

#[test]
fn scenario_2_constant_arithmetic_folds_to_14() {
    let c = compile("int main() { int x; x = 2 + 3 * 4; return x; }");
    assert_eq!(
        c.mir_post,
        "function main():\nentry:\n    t0 = const(2)\n    t1 = const(3)\n    t2 = const(4)\n    t3 = const(12)\n    t4 = const(14)\n    store(x, t4)\n    t5 = load(x)\n    retval(t5)\n"
    );
    assert!(c.llvm_ir.contains("14"));
}

#[test]
fn scenario_3_while_sum_produces_loop_blocks() {
    let c = compile(
        "int main() { int s; int i; s = 0; i = 1; while (i <= 10) { s = s + i; i = i + 1; } return s; }",
    );
    assert!(c.mir_post.contains("branch("));
    assert!(c.mir_post.matches("jump(").count() >= 2);
}

#[test]
fn scenario_4_print_string_declares_printf_and_format() {
    let c = compile("int main() { print(\"hi\"); return 0; }");
    assert!(c.llvm_ir.contains("declare i32 @printf(i8* noundef, ...)"));
    assert!(c.llvm_ir.contains("@.str.0"));
    assert!(c.llvm_ir.contains("@.fmt.0"));
    assert!(c.llvm_ir.contains("c\"hi\\00\""));
}

#[test]
fn scenario_5_recursive_factorial_calls_itself() {
    let c = compile(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } int main() { print(fact(5)); return 0; }",
    );
    assert!(c.llvm_ir.contains("define i32 @fact(i32 %n)"));
    assert!(c.llvm_ir.contains("call i32 @fact("));
}

#[test]
fn scenario_6_if_else_char_branches_both_ways() {
    let c = compile("int main() { int a; a = 3; if (a < 5) print('y'); else print('n'); return 0; }");
    assert!(c.llvm_ir.contains("br i1"));
    assert!(c.llvm_ir.matches("@printf").count() >= 2);
}

#[test]
fn boundary_division_by_zero_is_not_folded() {
    let c = compile("int main() { int x; x = 1 / 0; return x; }");
    assert!(c.mir_post.contains("div(t0, t1)"), "division by zero must survive as an instruction, got: {}", c.mir_post);
}

#[test]
fn boundary_print_with_no_arguments_emits_bare_newline() {
    let c = compile("int main() { print(); return 0; }");
    assert!(c.llvm_ir.contains("c\"\\0A\\00\""));
}

#[test]
fn boundary_missing_return_gets_implicit_zero() {
    let c = compile("int main() { int x; x = 1; }");
    assert!(c.mir_post.contains("retval("));
    assert!(c.llvm_ir.contains("ret i32"));
}

#[test]
fn boundary_while_zero_body_is_elided() {
    let c = compile("int main() { while (0) { print(\"never\"); } return 0; }");
    assert!(!c.mir_post.contains("never"), "dead loop body must not survive into MIR:\n{}", c.mir_post);
    assert!(!c.llvm_ir.contains("never"));
}

#[test]
fn pre_and_post_optimization_mir_differ_for_foldable_arithmetic() {
    let c = compile("int main() { int x; x = 1 + 1; return x; }");
    assert_ne!(c.mir_pre, c.mir_post);
}
