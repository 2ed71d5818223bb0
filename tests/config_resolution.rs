//! Integration coverage for component A's resolve pipeline: fallback to
//! `.example.json`, default injection, and whole-document `${NAME}`
//! substitution, driven end-to-end through `only1mcp::config::resolve`
//! against real files on disk.

use only1mcp::config;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_json(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".json").expect("create temp config file");
    file.write_all(contents.as_bytes()).expect("write temp config file");
    file
}

#[test]
fn resolve_applies_defaults_and_substitutes_env() {
    std::env::set_var("ONLY1MCP_TEST_API_KEY", "secret-value");

    let file = write_json(
        r#"{
            "mcpServers": {
                "echo": {
                    "type": "command",
                    "command": "cat",
                    "env": { "API_KEY": "${ONLY1MCP_TEST_API_KEY}" }
                }
            },
            "proxy": { "port": 9100 }
        }"#,
    );

    let resolved = config::resolve(file.path()).expect("configuration resolves");
    assert_eq!(resolved.proxy.port, 9100);
    assert_eq!(resolved.proxy.host, "0.0.0.0");
    assert_eq!(resolved.health.port, 8080);

    match resolved.upstreams.get("echo").unwrap() {
        config::UpstreamSpec::Command { env, .. } => {
            assert_eq!(env.get("API_KEY").unwrap(), "secret-value");
        },
        other => panic!("expected a command upstream, got {other:?}"),
    }
}

#[test]
fn resolve_fails_with_every_missing_env_var_name() {
    std::env::remove_var("ONLY1MCP_TEST_UNSET_ONE");
    std::env::remove_var("ONLY1MCP_TEST_UNSET_TWO");

    let file = write_json(
        r#"{
            "mcpServers": {
                "echo": {
                    "type": "command",
                    "command": "cat",
                    "env": {
                        "A": "${ONLY1MCP_TEST_UNSET_ONE}",
                        "B": "${ONLY1MCP_TEST_UNSET_TWO}"
                    }
                }
            }
        }"#,
    );

    let err = config::resolve(file.path()).unwrap_err();
    assert_eq!(err.kind, only1mcp::error::ConfigErrorKind::MissingEnvVar);
    assert!(err.detail.contains("ONLY1MCP_TEST_UNSET_ONE"));
    assert!(err.detail.contains("ONLY1MCP_TEST_UNSET_TWO"));
}

#[test]
fn resolve_falls_back_to_sibling_example_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing_path = dir.path().join("config.json");
    let example_path = dir.path().join("config.example.json");
    std::fs::write(
        &example_path,
        r#"{"mcpServers": {"echo": {"type": "command", "command": "cat"}}}"#,
    )
    .unwrap();

    let resolved = config::resolve(&missing_path).expect("falls back to the example file");
    assert!(resolved.upstreams.contains_key("echo"));
}

#[test]
fn resolve_rejects_invalid_upstream_names() {
    let file = write_json(
        r#"{
            "mcpServers": {
                "bad name": { "type": "command", "command": "cat" }
            }
        }"#,
    );

    let err = config::resolve(file.path()).unwrap_err();
    assert_eq!(err.kind, only1mcp::error::ConfigErrorKind::SchemaViolation);
}

#[test]
fn resolve_reports_not_found_when_neither_file_exists() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing_path = dir.path().join("nope.json");
    let err = config::resolve(&missing_path).unwrap_err();
    assert_eq!(err.kind, only1mcp::error::ConfigErrorKind::NotFound);
}
