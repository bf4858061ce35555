use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const P0: f64 = 0.94;
const DELTA: f64 = 0.1;
const EPSILON: f64 = 0.3;

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).expect("parent should be created");
    fs::write(path, content).expect("file should be written");
}

fn flux_file(root: &Path, run: &str, snapshot: &str) -> std::path::PathBuf {
    root.join(run)
        .join("flux-power")
        .join(format!("{snapshot}_flux_power.txt"))
}

/// Three runs whose single mode responds linearly to the parameter.
fn stage_linear_study(root: &Path) -> std::path::PathBuf {
    for (run, param) in [("low/", P0 - DELTA), ("best-fit/", P0), ("high/", P0 + DELTA)] {
        write_file(
            &flux_file(root, run, "snapshot_000"),
            &format!("0 1\n1 {}\n", 1.0 + EPSILON * param),
        );
    }
    let config = root.join("run.json");
    write_file(
        &config,
        &format!(
            r#"
            {{
              "source": {{
                "kind": "flux-power",
                "snapshots": ["snapshot_000"],
                "redshifts": [3.0]
              }},
              "knots": [
                {{
                  "names": ["low/", "best-fit/", "high/"],
                  "values": [{}, {P0}, {}],
                  "fiducial": {P0},
                  "fiducialRun": "best-fit/",
                  "fiducialBox": 60.0
                }}
              ]
            }}
            "#,
            P0 - DELTA,
            P0 + DELTA
        ),
    );
    config
}

fn run_lyaflux(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lyaflux"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("lyaflux should run")
}

#[test]
fn fit_writes_one_flat_table_per_group() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());
    let out = temp.path().join("tables");

    let output = run_lyaflux(&[
        "fit",
        "--config",
        config.to_str().unwrap(),
        "--output-dir",
        out.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "fit should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("group-0.txt"));

    let table = fs::read_to_string(out.join("group-0.txt")).expect("table should exist");
    let rows: Vec<&str> = table.lines().collect();
    assert_eq!(rows.len(), 2, "one a row and one b row for a single bin");
    let slope: f64 = rows[1].parse().expect("b should be a number");
    let expected = EPSILON / (1.0 + EPSILON * P0);
    assert!((slope - expected).abs() < 5e-3 * expected);
}

#[test]
fn query_prints_response_per_kbin() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());

    let high = (P0 + DELTA).to_string();
    let output = run_lyaflux(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--redshift",
        "3.0",
        "--param",
        &high,
    ]);
    assert!(
        output.status.success(),
        "query should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let fields: Vec<f64> = stdout
        .lines()
        .next()
        .expect("one line per bin")
        .split_whitespace()
        .map(|field| field.parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 2);
    let expected = (1.0 + EPSILON * (P0 + DELTA)) / (1.0 + EPSILON * P0) - 1.0;
    assert!((fields[1] - expected).abs() < 5e-3 * expected);
}

#[test]
fn query_json_lists_kbins_and_response() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());

    let output = run_lyaflux(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--redshift",
        "3.0",
        "--param",
        "0.94",
        "--json",
    ]);
    assert!(output.status.success());
    let parsed: Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).expect("stdout is JSON");
    assert_eq!(parsed["redshift"], Value::from(3.0));
    assert_eq!(parsed["kbins"].as_array().map(Vec::len), Some(1));
    // at the fiducial value every response vanishes
    assert_eq!(parsed["response"][0].as_f64(), Some(0.0));
}

#[test]
fn query_with_wrong_parameter_count_exits_with_arity_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());

    let output = run_lyaflux(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--redshift",
        "3.0",
        "--param",
        "0.9",
        "--param",
        "1.0",
    ]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: [QUERY.ARITY]"));
}

#[test]
fn query_at_unknown_redshift_exits_with_not_found_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());

    let output = run_lyaflux(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--redshift",
        "2.5",
        "--param",
        "1.0",
    ]);
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn missing_config_exits_with_io_code() {
    let temp = TempDir::new().expect("tempdir should be created");
    let missing = temp.path().join("absent.json");

    let output = run_lyaflux(&["fit", "--config", missing.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(7));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("IO.CONFIG_READ"));
    assert!(stderr.contains("absent.json"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    let output = run_lyaflux(&["interpolate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("INPUT.CLI_USAGE"));
}

#[test]
fn compare_prints_correction_rows() {
    let temp = TempDir::new().expect("tempdir should be created");
    let scale = 0.71 / 60.0;
    for snapshot in ["snapshot_010", "snapshot_011"] {
        for (run, level) in [("one/", 2.0), ("two/", 2.2)] {
            let body: String = (0..=400)
                .map(|mode| format!("{mode} {}\n", level * scale))
                .collect();
            write_file(&flux_file(temp.path(), run, snapshot), &body);
        }
    }
    let config = temp.path().join("compare.json");
    write_file(
        &config,
        r#"
        {
          "source": {
            "kind": "flux-power",
            "snapshots": ["snapshot_010", "snapshot_011"],
            "redshifts": [2.2, 2.0],
            "kbins": [1.0]
          }
        }
        "#,
    );

    let output = run_lyaflux(&[
        "compare",
        "--config",
        config.to_str().unwrap(),
        "--one",
        "one/",
        "--two",
        "two/",
    ]);
    assert!(
        output.status.success(),
        "compare should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let rows: Vec<&str> = stdout.lines().collect();
    assert_eq!(rows.len(), 1, "the last redshift is not compared");
    let fields: Vec<&str> = rows[0].split_whitespace().collect();
    assert_eq!(fields[0], "2.2");
    assert_eq!(fields.len(), 13);
    assert!(fields[1..].iter().all(|field| *field == "1.1"));
}

#[test]
fn debug_logging_reports_the_dispatched_command() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = stage_linear_study(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_lyaflux"))
        .args([
            "query",
            "--config",
            config.to_str().unwrap(),
            "--redshift",
            "3.0",
            "--param",
            "0.94",
        ])
        .env("RUST_LOG", "debug")
        .output()
        .expect("lyaflux should run");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("running query"), "stderr: {stderr}");

    let quiet = run_lyaflux(&[
        "query",
        "--config",
        config.to_str().unwrap(),
        "--redshift",
        "3.0",
        "--param",
        "0.94",
    ]);
    assert!(!String::from_utf8_lossy(&quiet.stderr).contains("running query"));
}

#[test]
fn query_help_states_series_order() {
    let output = run_lyaflux(&["query", "--help"]);
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    let help = help.split_whitespace().collect::<Vec<_>>().join(" ");
    assert!(help.contains("ascending redshift order"), "help: {help}");
}
