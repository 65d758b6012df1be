mod common;
use common::*;

use std::path::{Path, PathBuf};

fn write_image(dir: &Path, p: &Program) -> PathBuf {
    let path = dir.join("image.json");
    std::fs::write(&path, p.to_json().unwrap()).unwrap();
    path
}

fn arith() -> Program {
    program(vec![
        binary("add", Opcode::BinaryAdd),
        binary("div", Opcode::BinaryTrueDivide),
        comparison("lt", CompareOp::Lt),
    ])
}

#[test]
fn run_prints_result() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("run").arg(&image).args(["--entry", "add", "2", "-5"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "-3\n");
}

#[test]
fn run_formats_floats_and_bools() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("run").arg(&image).args(["--entry", "div", "4", "2"]).output().unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2.0\n");
    let output = monoc().arg("run").arg(&image).args(["--entry", "lt", "1", "2"]).output().unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout), "True\n");
}

#[test]
fn types_prints_report() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("types").arg(&image).args(["--entry", "test.div", "1", "2.5"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "def div(a: int, b: float) -> float\n");
}

#[test]
fn types_json() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("types").arg(&image).args(["--json", "--entry", "add", "1", "2"]).output().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["functions"][0]["returns"], "int");
}

#[test]
fn ir_prints_module() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("ir").arg(&image).args(["--entry", "add", "1", "2"]).output().unwrap();
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with("module test\n"), "{text}");
    assert!(text.contains("function test__add(%0: i32, %1: i32) -> i32 {"), "{text}");
}

#[test]
fn compile_writes_object() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let out = dir.path().join("add.o");
    let output = monoc()
        .arg("compile")
        .arg(&image)
        .args(["--entry", "add", "1", "2", "-o"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let bytes = std::fs::read(&out).unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn config_file_is_discovered_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    std::fs::write(dir.path().join("monoc.toml"), "[compile]\nbogus = 1\n").unwrap();
    let output = monoc().arg("run").arg(&image).args(["--entry", "add", "1", "2"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error[config]"));
}

#[test]
fn unknown_entry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc().arg("run").arg(&image).args(["--entry", "nope"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no function `nope`"));
}

#[test]
fn inference_errors_are_rendered_with_location() {
    let mut asm = Assembler::new("ghost", &[]).filename("ghost.py").first_line(3);
    asm.line(4).load_fast("never").emit(Opcode::ReturnValue);
    let p = program(vec![asm.finish().unwrap()]);
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &p);
    let output = monoc().arg("run").arg(&image).args(["--entry", "ghost"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[unsupported]"), "{stderr}");
    assert!(stderr.contains("--> ghost.py:"), "{stderr}");
    assert!(stderr.contains("in ghost"), "{stderr}");
}

#[test]
fn opt_level_flag_accepts_config_names() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    for level in ["none", "speed", "speed_and_size"] {
        let output = monoc()
            .args(["--opt-level", level, "run"])
            .arg(&image)
            .args(["--entry", "add", "2", "3"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{level}: {}", String::from_utf8_lossy(&output.stderr));
        assert_eq!(String::from_utf8_lossy(&output.stdout), "5\n");
    }
}

#[test]
fn opt_level_flag_rejects_unknown_level_with_choices() {
    let dir = tempfile::tempdir().unwrap();
    let image = write_image(dir.path(), &arith());
    let output = monoc()
        .args(["run", "--opt-level", "fast"])
        .arg(&image)
        .args(["--entry", "add", "2", "3"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("speed_and_size"), "{stderr}");
}

#[test]
fn help_lists_opt_levels() {
    let output = monoc().arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("speed_and_size"), "{stdout}");
}
