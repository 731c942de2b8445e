use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docgraph_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("docgraph");
    path
}

/// Root with a tagged text file, an untagged one and an unsupported file,
/// plus a config pointing the SQLite graph into the temp dir.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("km");
    let acme = root.join("Finance/US/Acme");
    fs::create_dir_all(&acme).unwrap();
    fs::write(
        acme.join("proposal.md"),
        "# Proposal\n\nAn investment platform for the trading desk, running on Kubernetes.\n",
    )
    .unwrap();
    fs::write(root.join("readme.txt"), "Plain notes without keywords.\n").unwrap();
    fs::write(root.join("archive.bin"), [0u8, 1, 2, 3]).unwrap();

    let config_path = tmp.path().join("docgraph.toml");
    let config = format!(
        r#"
[source]
root = "{}"

[pipeline]
concurrency = 2

[graph]
backend = "sqlite"
path = "{}"

[enrichment]
partners = ["Globex"]
"#,
        root.display(),
        tmp.path().join("data/graph.sqlite").display()
    );
    fs::write(&config_path, config).unwrap();
    (tmp, config_path)
}

fn run_docgraph(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(docgraph_binary())
        .args(args)
        .env("DOCGRAPH_LOG", "warn")
        .output()
        .expect("failed to run docgraph binary");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn with_config<'a>(config: &'a Path, args: &[&'a str]) -> Vec<&'a str> {
    let mut all = vec!["--config", config.to_str().unwrap()];
    all.extend_from_slice(args);
    all
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();
    for _ in 0..2 {
        let (stdout, stderr, ok) = run_docgraph(&with_config(&config, &["init"]));
        assert!(ok, "init failed: {}", stderr);
        assert!(stdout.contains("Graph schema ready"));
    }
    assert!(tmp.path().join("data/graph.sqlite").exists());
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) =
        run_docgraph(&with_config(&config, &["ingest", "--progress", "off"]));
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("files processed: 3 / 3 enqueued"), "{}", stdout);
    assert!(stdout.contains("documents: 2"), "{}", stdout);
    assert!(stdout.contains("skipped (unsupported): 1"), "{}", stdout);
    assert!(stdout.contains("failures: 0"), "{}", stdout);
    assert!(stdout.contains("graph: 2 documents written"), "{}", stdout);
}

#[test]
fn test_reingest_keeps_graph_stats_stable() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_docgraph(&with_config(&config, &["ingest", "--progress", "off"]));
    assert!(ok, "first ingest failed: {}", stderr);
    let (first, _, ok) = run_docgraph(&with_config(&config, &["graph", "stats"]));
    assert!(ok);

    let (_, stderr, ok) = run_docgraph(&with_config(&config, &["ingest", "--progress", "off"]));
    assert!(ok, "second ingest failed: {}", stderr);
    let (second, _, ok) = run_docgraph(&with_config(&config, &["graph", "stats"]));
    assert!(ok);

    // the size line can change between runs; the counts must not
    let counts = |s: &str| {
        s.lines()
            .filter(|l| !l.contains("Size:"))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    assert_eq!(counts(&first), counts(&second));
    assert!(first.contains("Technology"));
    assert!(first.contains("MENTIONS"));
}

#[test]
fn test_ingest_without_config_writes_json() {
    let (tmp, _config) = setup_test_env();
    let root = tmp.path().join("km");
    let out = tmp.path().join("out/meta.json");
    let (stdout, stderr, ok) = run_docgraph(&[
        "ingest",
        "--root",
        root.to_str().unwrap(),
        "--no-graph",
        "--progress",
        "off",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("graph: disabled"));

    let records: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    let proposal = records
        .iter()
        .find(|r| r["relative_path"] == "Finance/US/Acme/proposal.md")
        .unwrap();
    assert_eq!(proposal["status"], "processed");
    assert_eq!(proposal["tags"]["client"], "Acme");
    assert!(proposal["enrichment"]["industries"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i == "Finance"));
}

#[test]
fn test_ingest_csv_output() {
    let (tmp, config) = setup_test_env();
    let out = tmp.path().join("meta.csv");
    let (_, stderr, ok) = run_docgraph(&with_config(
        &config,
        &[
            "ingest",
            "--no-graph",
            "--progress",
            "off",
            "--format",
            "csv",
            "--output",
            out.to_str().unwrap(),
        ],
    ));
    assert!(ok, "ingest failed: {}", stderr);
    let csv = fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("id,relative_path,"));
    assert_eq!(lines.count(), 2);
}

#[test]
fn test_scan_prints_sitemap() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_docgraph(&with_config(&config, &["scan"]));
    assert!(ok, "scan failed: {}", stderr);
    let docs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let docs = docs.as_array().unwrap();
    assert_eq!(docs.len(), 3);
    let readme = docs
        .iter()
        .find(|d| d["filename"] == "readme.txt")
        .unwrap();
    assert_eq!(readme["tags"]["domain"], "Unknown");
    assert_eq!(readme["id"].as_str().unwrap().len(), 64);
}

#[test]
fn test_json_progress_goes_to_stderr() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) =
        run_docgraph(&with_config(&config, &["ingest", "--progress", "json"]));
    assert!(ok);
    assert!(stderr.contains("\"phase\":\"processing\""), "{}", stderr);
    assert!(stderr.contains("\"phase\":\"projecting\""), "{}", stderr);
    assert!(!stdout.contains("\"event\""));
}

#[test]
fn test_log_file_receives_logs() {
    let (tmp, config) = setup_test_env();
    let log = tmp.path().join("run.log");
    let output = Command::new(docgraph_binary())
        .args([
            "--config",
            config.to_str().unwrap(),
            "--log-file",
            log.to_str().unwrap(),
            "ingest",
            "--progress",
            "off",
        ])
        .env("DOCGRAPH_LOG", "info")
        .output()
        .unwrap();
    assert!(output.status.success());
    let logged = fs::read_to_string(&log).unwrap();
    assert!(logged.contains("unsupported"), "{}", logged);
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, ok) = run_docgraph(&["--config", "/nonexistent/docgraph.toml", "ingest"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_zero_concurrency_fails() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_docgraph(&with_config(
        &config,
        &["ingest", "--concurrency", "0", "--no-graph"],
    ));
    assert!(!ok);
    assert!(stderr.contains("concurrency"));
}

#[test]
fn test_missing_root_fails() {
    let (_, stderr, ok) = run_docgraph(&["ingest", "--root", "/nonexistent/km", "--no-graph"]);
    assert!(!ok);
    assert!(stderr.contains("not a directory"));
}
