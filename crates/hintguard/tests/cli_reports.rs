use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

use hintguard_contracts::{
    HINTGUARD_CHECK_REPORT_SCHEMA_VERSION, HINTGUARD_CODEGEN_REPORT_SCHEMA_VERSION,
    HINTGUARD_DIAG_SCHEMA_VERSION,
};
use serde_json::json;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(prefix: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = base.join(format!("{prefix}_{pid}_{n}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hintguard"))
        .args(args)
        .env_remove("HINTGUARD_LOG")
        .env_remove("HINTGUARD_LOG_LEVEL")
        .env_remove("HINTGUARD_LOG_FORMAT")
        .output()
        .expect("run hintguard")
}

fn report(out: &Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|err| {
        panic!(
            "parse report json: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    })
}

fn universe_file(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("universe.json");
    let doc = json!({
        "schema_version": "hintguard.universe@0.1.0",
        "modules": [{
            "name": "app",
            "decls": [
                {"kind": "class", "name": "Point", "attrs": ["x", "y"]},
                {"kind": "def", "name": "total",
                 "params": [{"name": "xs", "hint": ["list", "int"]}],
                 "returns": "int"},
                {"kind": "def", "name": "move",
                 "params": [{"name": "p", "hint": ["ref", "Point"]}]}
            ]
        }]
    });
    std::fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write universe");
    path
}

#[test]
fn lang_id_prints_the_check_language() {
    let out = run(&["lang-id"]);
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        hintguard::language::LANG_ID
    );
}

#[test]
fn codegen_report_json_is_stable() {
    let out = run(&["codegen", "--hint", r#"["list", "int"]"#, "--report-json"]);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v = report(&out);
    assert_eq!(v["schema_version"], HINTGUARD_CODEGEN_REPORT_SCHEMA_VERSION);
    assert_eq!(v["ok"], true);
    assert_eq!(v["hint"], "list[int]");
    assert_eq!(v["needs_random_index"], true);
    assert_eq!(v["exit_code"], 0);
    let code = v["code"].as_str().expect("code");
    assert!(code.contains("isinstance(value, __hint_type_0)"), "{code}");
    assert!(v["template"].as_str().expect("template").contains("@{pith}!"));
    assert_eq!(v["diagnostics"]["schema_version"], HINTGUARD_DIAG_SCHEMA_VERSION);
}

#[test]
fn codegen_reports_ignorable_and_unsupported_hints() {
    let out = run(&["codegen", "--hint", r#""typing.Any""#, "--report-json"]);
    assert!(out.status.success());
    let v = report(&out);
    assert_eq!(v["ignorable"], true);
    assert!(v.get("code").is_none());

    let out = run(&["codegen", "--hint", r#"["list", "typing.NoReturn"]"#, "--report-json"]);
    assert_eq!(out.status.code(), Some(2));
    let v = report(&out);
    assert_eq!(v["ok"], false);
    assert_eq!(v["diagnostics"]["diagnostics"][0]["code"], "HG0002");
}

#[test]
fn check_exit_codes_follow_the_outcome() {
    let out = run(&[
        "check",
        "--hint",
        r#"["typing.Optional", "int"]"#,
        "--value",
        "null",
        "--report-json",
    ]);
    assert!(out.status.success());
    let v = report(&out);
    assert_eq!(v["schema_version"], HINTGUARD_CHECK_REPORT_SCHEMA_VERSION);
    assert_eq!(v["violations"], 0);

    let out = run(&["check", "--hint", r#""int""#, "--value", r#""x""#, "--report-json"]);
    assert_eq!(out.status.code(), Some(1));
    let v = report(&out);
    assert_eq!(v["violations"], 1);
    let diag = &v["diagnostics"]["diagnostics"][0];
    assert_eq!(diag["code"], "HG0200");
    assert_eq!(diag["loc"]["slot"], "value");

    let out = run(&["check", "--hint", "not json", "--value", "1"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("HG0102"));
}

#[test]
fn check_callable_with_seeded_sampling() {
    let dir = temp_dir("hintguard_cli_check");
    let universe = universe_file(&dir);
    let universe = universe.to_str().expect("utf-8 path");

    let args = |seed: &str| {
        run(&[
            "check",
            "--universe",
            universe,
            "--callable",
            "app.total",
            "--args",
            r#"[[1, 2, "x"]]"#,
            "--seed",
            seed,
            "--repeat",
            "200",
            "--report-json",
        ])
    };
    let out = args("7");
    assert_eq!(out.status.code(), Some(1));
    let first = report(&out);
    assert_eq!(first["runs"], 200);
    let caught = first["violations"].as_u64().expect("violations");
    assert!(caught > 0 && caught < 200, "caught {caught}");
    assert_eq!(report(&args("7"))["violations"], first["violations"]);

    let out = run(&[
        "check",
        "--universe",
        universe,
        "--callable",
        "app.move",
        "--args",
        r#"[{"$object": {"class": "Point", "fields": {"x": 1, "y": 2}}}]"#,
        "--report-json",
    ]);
    assert!(
        out.status.success(),
        "stdout={}",
        String::from_utf8_lossy(&out.stdout)
    );
}

#[test]
fn bad_universe_points_at_the_offending_field() {
    let dir = temp_dir("hintguard_cli_universe");
    let path = dir.join("bad.json");
    let doc = json!({
        "schema_version": "hintguard.universe@0.1.0",
        "modules": [{"name": "app", "decls": [{"kind": "widget", "name": "W"}]}]
    });
    std::fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    let out = run(&[
        "check",
        "--universe",
        path.to_str().expect("utf-8 path"),
        "--hint",
        r#""int""#,
        "--value",
        "1",
        "--report-json",
    ]);
    assert_eq!(out.status.code(), Some(2));
    let v = report(&out);
    let diag = &v["diagnostics"]["diagnostics"][0];
    assert_eq!(diag["code"], "HG0100");
    assert_eq!(diag["loc"]["kind"], "document");
    assert_eq!(diag["loc"]["ptr"], "/modules/0/decls/0/kind");
}
