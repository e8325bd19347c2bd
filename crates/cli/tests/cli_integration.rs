//! Integration tests for the copycast binary

mod common;

use anyhow::Result;
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// `<tmp>/proj` with one small file
fn project() -> Result<(TempDir, std::path::PathBuf)> {
    let temp_dir = TempDir::new()?;
    let root = temp_dir.path().join("proj");
    fs::create_dir(&root)?;
    fs::write(root.join("a.txt"), "hello\n")?;
    Ok((temp_dir, root))
}

#[test]
fn test_snapshot_prints_tree() -> Result<()> {
    let (_temp_dir, root) = project()?;
    fs::create_dir(root.join("src"))?;
    fs::write(root.join("src/lib.rs"), "pub fn f() {}")?;

    let result = copycast!(&root, "snapshot").assert_success()?;
    assert_eq!(
        result.json()?,
        json!({
            "name": "proj",
            "children": [
                {"name": "a.txt", "content": "hello\n"},
                {"name": "src", "children": [{"name": "lib.rs", "content": "pub fn f() {}"}]}
            ]
        })
    );
    Ok(())
}

#[test]
fn test_snapshot_respects_gitignore() -> Result<()> {
    let (_temp_dir, root) = project()?;
    fs::write(root.join(".gitignore"), "*.log\n")?;
    fs::write(root.join("debug.log"), "noise")?;

    let result = copycast!(&root, "snapshot").assert_success()?;
    let tree = result.json()?;
    let names: Vec<&str> = tree["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|child| child["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec![".gitignore", "a.txt"]);
    Ok(())
}

#[test]
fn test_snapshot_of_explicit_root() -> Result<()> {
    let (temp_dir, root) = project()?;
    let result = copycast!(temp_dir.path(), "snapshot", root.to_str().unwrap(), "--pretty")
        .assert_success()?;
    assert!(result.stdout.contains("\n  \"name\": \"proj\""));
    Ok(())
}

#[test]
fn test_missing_root_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = copycast!(temp_dir.path(), "snapshot", "does-not-exist").assert_failure()?;
    assert!(result.contains_stderr("Directory not found"));
    Ok(())
}

#[test]
fn test_config_example_is_valid_toml() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let result = copycast!(temp_dir.path(), "config", "--example").assert_success()?;
    assert!(result.contains_stdout("[watch]"));
    assert!(result.contains_stdout("stability_threshold_ms = 500"));
    assert!(result.contains_stdout("history_depth = 5"));
    Ok(())
}

#[test]
fn test_config_reads_root_file() -> Result<()> {
    let (_temp_dir, root) = project()?;
    fs::write(root.join("copycast.toml"), "[content]\nmax_lines = 10\n")?;

    let result = copycast!(&root, "config").assert_success()?;
    assert!(result.contains_stdout("max_lines = 10"));
    assert!(result.contains_stdout("max_chars = 200000"));
    Ok(())
}

#[test]
fn test_invalid_config_rejected() -> Result<()> {
    let (_temp_dir, root) = project()?;
    fs::write(root.join("copycast.toml"), "[broadcast]\nhistory_depth = 0\n")?;

    let result = copycast!(&root, "snapshot").assert_failure()?;
    assert!(result.contains_stderr("history_depth"));
    Ok(())
}

#[test]
fn test_watch_json_stream() -> Result<()> {
    let (_temp_dir, root) = project()?;
    let running = copycast!(&root, "watch", "--json", "--stability-ms", "50", "--poll-ms", "10")
        .spawn()?;
    let timeout = Duration::from_secs(10);

    let first = running.next_line(timeout)?;
    assert_eq!(serde_json::from_str::<serde_json::Value>(&first)?, json!({"event": "connect"}));

    // Baseline, then snapshots until the scanned file shows up
    running.wait_for_line(timeout, |line| line.contains("\"a.txt\""))?;

    fs::write(root.join("b.txt"), "new")?;
    let line = running.wait_for_line(timeout, |line| line.contains("\"b.txt\""))?;
    let message: serde_json::Value = serde_json::from_str(&line)?;
    assert_eq!(message["event"], "tree");
    assert!(message["seq"].as_u64().unwrap() > 0);
    assert_eq!(message["tree"]["name"], "proj");
    Ok(())
}
