//! End-to-end runs of the tapc binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn tapc() -> Command {
    Command::cargo_bin("tapc").expect("binary builds")
}

#[test]
fn compiles_a_file_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("clear.t");
    std::fs::write(&source, "[-]").unwrap();

    tapc()
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("int main(void) {"))
        .stdout(predicate::str::contains("p[0] = 0;"));
}

#[test]
fn compiles_from_stdin() {
    tapc()
        .arg("-")
        .write_stdin("+++.")
        .assert()
        .success()
        .stdout(predicate::str::contains("PUTS(\"\\003\");"));
}

#[test]
fn writes_an_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.t");
    let out = dir.path().join("out.c");
    std::fs::write(&source, "[-]").unwrap();

    tapc().arg(&source).arg("-o").arg(&out).assert().success();
    let code = std::fs::read_to_string(&out).unwrap();
    assert!(code.contains("/* generated by tapc */"));
}

#[test]
fn cellsize_selects_the_cell_type() {
    tapc()
        .arg("-")
        .arg("--cellsize")
        .arg("16")
        .write_stdin("+")
        .assert()
        .success()
        .stdout(predicate::str::contains("static uint16_t m[30000]"));
}

#[test]
fn invalid_cellsize_fails() {
    tapc()
        .arg("-")
        .arg("-s")
        .arg("12")
        .write_stdin("+")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid cell size"));
}

#[test]
fn unmatched_bracket_fails_with_the_line() {
    tapc()
        .arg("-")
        .write_stdin("+\n]")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn missing_file_fails() {
    tapc()
        .arg("no-such-file.t")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn debug_annotates_loops() {
    tapc()
        .arg("-")
        .arg("--debug")
        .write_stdin(",[.,]")
        .assert()
        .success()
        .stdout(predicate::str::contains("// clobbers:"));
}

#[test]
fn rle_dialect_expands_counts() {
    tapc()
        .arg("-")
        .arg("--dialect")
        .arg("rle")
        .write_stdin("+*65.")
        .assert()
        .success()
        .stdout(predicate::str::contains("PUTS(\"A\");"));
}

#[test]
fn echo_program_keeps_its_io_loop() {
    tapc()
        .arg("-")
        .write_stdin(",[.,]")
        .assert()
        .success()
        .stdout(predicate::str::contains("p[0] = GETC();"))
        .stdout(predicate::str::contains("while (p[0]) {"))
        .stdout(predicate::str::contains("PUTC(p[0]);"));
}
