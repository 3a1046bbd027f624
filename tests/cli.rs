use assert_cmd::Command;
use predicates::str::contains;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_root(name: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("a816-cli-{name}-{unique}"));
    std::fs::create_dir_all(&root).expect("failed to create temp root");
    root
}

fn a816() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_a816"));
    cmd.env("NO_COLOR", "1");
    cmd
}

#[test]
fn no_args_prints_help() {
    a816()
        .assert()
        .success()
        .stdout(contains("Usage: a816"))
        .stdout(contains("assemble"))
        .stdout(contains("inspect"));
}

#[test]
fn assembles_an_ips_patch() {
    let root = temp_root("ips");
    let input = root.join("hack.s");
    std::fs::write(&input, "*=0x008000\nlda #0x12\nrts\n").expect("failed to write input");
    let output = root.join("hack.ips");

    a816()
        .arg("assemble")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    let bytes = std::fs::read(&output).expect("patch should exist");
    assert_eq!(bytes, b"PATCH\x00\x00\x00\x00\x03\xA9\x12\x60EOF");
}

#[test]
fn copier_header_shifts_records() {
    let root = temp_root("copier");
    let input = root.join("hack.s");
    std::fs::write(&input, "nop\n").expect("failed to write input");
    let output = root.join("hack.ips");

    a816()
        .arg("assemble")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--copier-header")
        .assert()
        .success();

    let blocks = a816_ips::read_patch(&output).expect("patch should decode");
    assert_eq!(blocks, vec![a816_ips::Block::new(0x200, vec![0xEA])]);
}

#[test]
fn patches_an_image_in_place() {
    let root = temp_root("sfc");
    let input = root.join("hack.s");
    std::fs::write(&input, "*=0xC00002\n.db 0xAA, 0xBB\n").expect("failed to write input");
    let output = root.join("game.sfc");
    std::fs::write(&output, [0u8; 8]).expect("failed to write image");

    a816()
        .arg("assemble")
        .arg(&input)
        .args(["-f", "img", "-m", "high", "-o"])
        .arg(&output)
        .assert()
        .success();

    let bytes = std::fs::read(&output).expect("image should exist");
    assert_eq!(bytes, [0, 0, 0xAA, 0xBB, 0, 0, 0, 0]);
}

#[test]
fn defines_and_symbol_dump() {
    let root = temp_root("symbols");
    let input = root.join("hack.s");
    std::fs::write(&input, ".if DEBUG {\n debug_entry:\n nop\n}\nlives = 3\n")
        .expect("failed to write input");
    let json = root.join("symbols.json");

    a816()
        .arg("assemble")
        .arg(&input)
        .arg("-o")
        .arg(root.join("hack.ips"))
        .args(["-D", "DEBUG=1", "--dump-symbols", "--symbols-json"])
        .arg(&json)
        .assert()
        .success()
        .stdout(contains("scope root"))
        .stdout(contains("lives"))
        .stdout(contains("debug_entry"));

    let text = std::fs::read_to_string(&json).expect("json should exist");
    let tables: serde_json::Value = serde_json::from_str(&text).expect("json should parse");
    assert_eq!(tables[0]["scope"], "root");
    assert_eq!(tables[0]["symbols"]["lives"], 3);
    assert_eq!(tables[0]["symbols"]["DEBUG"], "1");
}

#[test]
fn malformed_define_is_rejected() {
    a816()
        .args(["assemble", "missing.s", "-D", "NOVALUE"])
        .assert()
        .failure()
        .stderr(contains("expected KEY=VALUE"));
}

#[test]
fn missing_input_fails() {
    let root = temp_root("missing");
    a816()
        .arg("assemble")
        .arg(root.join("nowhere.s"))
        .assert()
        .failure()
        .stderr(contains("failed to read"));
}

#[test]
fn assembly_errors_are_rendered() {
    let root = temp_root("errors");
    let input = root.join("broken.s");
    std::fs::write(&input, "nop\nlda undefined_symbol\n").expect("failed to write input");

    a816()
        .arg("assemble")
        .arg(&input)
        .arg("-o")
        .arg(root.join("broken.ips"))
        .assert()
        .failure()
        .stderr(contains("symbol 'undefined_symbol' is not defined"))
        .stderr(contains("broken.s"));
    assert!(!root.join("broken.ips").exists());
}

#[test]
fn inspect_lists_and_disassembles_records() {
    let root = temp_root("inspect");
    let patch = root.join("hack.ips");
    std::fs::write(&patch, b"PATCH\x00\x80\x00\x00\x04\xA9\x12\xEA\x60EOF").expect("failed to write patch");

    a816()
        .arg("inspect")
        .arg(&patch)
        .arg("--disassemble")
        .assert()
        .success()
        .stdout(contains("0x008000     4 bytes"))
        .stdout(contains("008000  lda #0x12"))
        .stdout(contains("008002  nop"))
        .stdout(contains("008003  rts"));
}

#[test]
fn inspect_reads_wide_immediates_when_asked() {
    let root = temp_root("inspect-wide");
    let patch = root.join("hack.ips");
    std::fs::write(&patch, b"PATCH\x00\x80\x00\x00\x06\xA9\x34\x12\xA2\x01\x60EOF")
        .expect("failed to write patch");

    a816()
        .arg("inspect")
        .arg(&patch)
        .args(["--disassemble", "--m16"])
        .assert()
        .success()
        .stdout(contains("008000  lda #0x1234"))
        .stdout(contains("008003  ldx #0x01"))
        .stdout(contains("008005  rts"));
}
