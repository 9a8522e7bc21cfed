//! Config file loading through `--config`.

use graph_loadgen::{OutputFormat, RunArgs, WorkloadKind};
use std::io::Write;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_config_file_is_loaded_and_cli_overrides_it() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[neo4j]
uri = "bolt://from-file:7687"
username = "loader"
password = "file-secret"

[run]
users = 12
run_time = "90"
workload = "random-writer"
stats_interval = "500ms"
output_format = "markdown"
"#
    )
    .unwrap();

    let args = RunArgs {
        config: Some(file.path().to_path_buf()),
        spawn_rate: Some(1.5),
        ..Default::default()
    };
    let config = assert_ok!(args.resolve());

    assert_eq!(config.endpoint.uri(), "bolt://from-file:7687");
    assert_eq!(config.endpoint.credentials().principal(), "loader");
    assert_eq!(config.users, 12);
    assert_eq!(config.spawn_rate, 1.5);
    assert_eq!(config.run_time, Duration::from_secs(90));
    assert_eq!(config.workload, WorkloadKind::RandomWriter);
    assert_eq!(config.stats_interval, Duration::from_millis(500));
    assert_eq!(config.output_format, OutputFormat::Markdown);
}

#[test]
fn test_missing_or_broken_config_file() {
    let dir = tempfile::tempdir().unwrap();

    let missing = RunArgs {
        config: Some(dir.path().join("nope.toml")),
        ..Default::default()
    };
    let err = assert_err!(missing.resolve());
    assert!(format!("{err:#}").contains("Failed to read config file"));

    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[neo4j\nuri = ").unwrap();
    let broken = RunArgs {
        config: Some(path),
        ..Default::default()
    };
    let err = assert_err!(broken.resolve());
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
fn test_file_without_password_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[neo4j]\nuri = \"bolt://localhost:7687\"").unwrap();

    let args = RunArgs {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let err = assert_err!(args.resolve());
    assert!(err.to_string().contains("Missing password for principal 'neo4j'"));
}
