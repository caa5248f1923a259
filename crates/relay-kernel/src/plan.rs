//! Plan files
//!
//! A plan is JSON: either a bare array of subtasks or an object with a
//! `subtasks` array.

use anyhow::{Context, Result};
use relay_core::Subtask;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Bare(Vec<Subtask>),
    Wrapped { subtasks: Vec<Subtask> },
}

/// Parse a plan from JSON text
///
/// # Errors
/// Fails on malformed JSON or duplicate subtask ids.
pub fn parse_plan(raw: &str) -> Result<Vec<Subtask>> {
    let subtasks = match serde_json::from_str::<PlanFile>(raw).context("invalid plan json")? {
        PlanFile::Bare(subtasks) | PlanFile::Wrapped { subtasks } => subtasks,
    };

    let mut seen = BTreeSet::new();
    for subtask in &subtasks {
        anyhow::ensure!(
            seen.insert(subtask.id.as_str()),
            "duplicate subtask id {:?}",
            subtask.id
        );
    }
    Ok(subtasks)
}

/// Read and parse a plan file
///
/// # Errors
/// As [`parse_plan`], plus I/O failures.
pub fn load_plan(path: impl AsRef<Path>) -> Result<Vec<Subtask>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    parse_plan(&raw).with_context(|| format!("in plan {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_bare_and_wrapped_forms() {
        let bare = parse_plan(r#"[{"id":"a"},{"id":"b","dependencies":["a"]}]"#).unwrap();
        let wrapped =
            parse_plan(r#"{"subtasks":[{"id":"a"},{"id":"b","dependencies":["a"]}]}"#).unwrap();
        assert_eq!(bare, wrapped);
        assert!(bare[0].is_unassigned());
    }

    #[test]
    fn legacy_agent_id_is_accepted() {
        let plan = parse_plan(r#"[{"id":"a","agentId":"copywriter"}]"#).unwrap();
        assert_eq!(plan[0].target_id, "copywriter");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_plan(r#"[{"id":"a"},{"id":"a"}]"#).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
