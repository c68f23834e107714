//! Exercises `build::build` against real files on disk, using a scratch
//! directory so repeated test runs never collide or leave artifacts behind.

use std::fs;

use sara::build::{build, BuildConfig, BuildError, OutputMode};

#[test]
fn mir_output_mode_writes_a_sibling_mir_file() {
    let dir = tempfile::tempdir().expect("create scratch dir");
    let input = dir.path().join("sum.sra");
    fs::write(&input, "int main() { int x; x = 2 + 3 * 4; return x; }").unwrap();

    let mut config = BuildConfig::new(input.clone());
    config.output_mode = OutputMode::Mir;
    build(&config).expect("build should succeed for a well-formed program");

    let mir_path = input.with_extension("mir");
    let mir_text = fs::read_to_string(&mir_path).expect("sibling .mir file should exist");
    assert!(mir_text.contains("function main("));
    assert!(mir_text.contains("retval("));
}

#[test]
fn gas_output_mode_writes_a_sibling_s_file() {
    let dir = tempfile::tempdir().expect("create scratch dir");
    let input = dir.path().join("prog.sra");
    fs::write(&input, "int main() { return 0; }").unwrap();

    let mut config = BuildConfig::new(input.clone());
    config.output_mode = OutputMode::Gas;
    build(&config).expect("build should succeed for a well-formed program");

    let asm_path = input.with_extension("s");
    let asm_text = fs::read_to_string(&asm_path).expect("sibling .s file should exist");
    assert!(asm_text.contains("main"));
}

#[test]
fn diagnostics_abort_the_build_before_any_artifact_is_written() {
    let dir = tempfile::tempdir().expect("create scratch dir");
    let input = dir.path().join("broken.sra");
    fs::write(&input, "int main() { return 1 + ; }").unwrap();

    let mut config = BuildConfig::new(input.clone());
    config.output_mode = OutputMode::Mir;
    let err = build(&config).expect_err("a syntax error should fail the build");
    assert!(matches!(err, BuildError::Diagnostics { error_count } if error_count > 0));
    assert!(!input.with_extension("mir").exists());
}

#[test]
fn multi_line_source_compiles_without_spurious_lexical_errors() {
    let dir = tempfile::tempdir().expect("create scratch dir");
    let input = dir.path().join("multiline.sra");
    fs::write(
        &input,
        "int fact(int n) {\n    if (n <= 1) return 1;\n    return n * fact(n - 1);\n}\n\nint main() {\n    print(fact(5));\n    return 0;\n}\n",
    )
    .unwrap();

    let mut config = BuildConfig::new(input.clone());
    config.output_mode = OutputMode::Mir;
    build(&config).expect("a multi-line program must compile cleanly");
}
