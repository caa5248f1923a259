use pretty_assertions::assert_eq;
use relay_core::{RelayConfig, Router, ServiceAssignment};
use relay_kernel::cli::{levels_report, referenced_providers, route_report};
use relay_kernel::{load_config, load_plan};
use relay_test_utils::diamond_plan;
use serde_json::json;
use std::io::Write;

#[test]
fn levels_of_diamond_plan() {
    let report = levels_report(&diamond_plan());
    assert_eq!(report["levels"], json!([["a"], ["b", "c"], ["d"]]));
    assert!(report["forced"].is_null());
}

#[test]
fn cyclic_plan_reports_forced_ids() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"id":"x","dependencies":["y"]}},{{"id":"y","dependencies":["x"]}},{{"id":"z"}}]"#
    )
    .unwrap();

    let plan = load_plan(file.path()).unwrap();
    let report = levels_report(&plan);
    assert_eq!(report["levels"], json!([["z"], ["x", "y"]]));
    assert_eq!(report["forced"], json!(["x", "y"]));
}

#[test]
fn route_resolves_aliases_for_role() {
    let router = Router::default();
    let report = route_report(&router, "agency");
    let chain = report["chain"].as_array().unwrap();
    assert!(!chain.is_empty());
    assert!(chain.iter().all(|hop| hop["routable"] == json!(false)));
    assert_eq!(report["role"], "agency");
}

#[test]
fn config_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "log_level = \"debug\"\n\n[scheduler]\nmax_parallel = 3\n"
    )
    .unwrap();

    let config = load_config(Some(file.path())).unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.scheduler.max_parallel, Some(3));
    assert_eq!(config.scheduler.generic_role, "agency");
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config(Some(dir.path().join("absent.toml").as_path())).is_err());
}

#[test]
fn providers_cover_every_chain() {
    let config = RelayConfig::default()
        .with_assignment("agency", ServiceAssignment::new("local:small", ["remote"]));
    let router = Router::from_config(&config.services);
    let providers = referenced_providers(&router, &config);
    assert!(providers.contains("local"));
    assert!(providers.contains("remote"));
}
