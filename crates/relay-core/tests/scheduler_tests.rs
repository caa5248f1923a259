use proptest::prelude::*;
use relay_core::{group, group_with_report, Subtask};
use relay_test_utils::{diamond_plan, subtask};
use std::collections::{HashMap, HashSet};

/// Random acyclic plan: task i may only depend on tasks with a lower index
fn acyclic_plan() -> impl Strategy<Value = Vec<Subtask>> {
    (1..24usize).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
            .prop_map(move |deps| {
                deps.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let mut task = Subtask::new(format!("t{i}"), "generated");
                        if i > 0 {
                            for pick in picks {
                                task = task.depends_on(format!("t{}", pick.index(i)));
                            }
                        }
                        task
                    })
                    .collect()
            })
    })
}

/// Random plan with arbitrary edges, cycles included, plus dangling ids
fn any_plan() -> impl Strategy<Value = Vec<Subtask>> {
    (1..24usize).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(0..n + 3, 0..4), n).prop_map(|deps| {
            deps.into_iter()
                .enumerate()
                .map(|(i, targets)| {
                    targets
                        .into_iter()
                        .fold(Subtask::new(format!("t{i}"), "generated"), |task, t| {
                            task.depends_on(format!("t{t}"))
                        })
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn prop_acyclic_levels_partition_input(plan in acyclic_plan()) {
        let report = group_with_report(&plan);
        prop_assert!(!report.has_cycle());

        let mut seen: Vec<String> = report
            .levels
            .iter()
            .flat_map(|level| level.subtasks.iter().map(|t| t.id.clone()))
            .collect();
        let mut expected: Vec<String> = plan.iter().map(|t| t.id.clone()).collect();
        seen.sort();
        expected.sort();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn prop_dependencies_sit_in_earlier_levels(plan in acyclic_plan()) {
        let levels = group(&plan);
        let level_of: HashMap<&str, usize> = levels
            .iter()
            .flat_map(|level| level.subtasks.iter().map(move |t| (t.id.as_str(), level.index)))
            .collect();

        for level in &levels {
            for task in &level.subtasks {
                for dep in &task.dependencies {
                    prop_assert!(level_of[dep.as_str()] < level.index);
                }
            }
        }
    }

    #[test]
    fn prop_any_plan_terminates_with_every_subtask_once(plan in any_plan()) {
        let report = group_with_report(&plan);
        prop_assert!(report.levels.len() <= plan.len());

        let ids: Vec<&str> = report.levels.iter().flat_map(|l| l.ids()).collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), plan.len());
        prop_assert_eq!(unique.len(), plan.len());

        // Only the final level may be forced.
        if let Some(forced) = &report.forced {
            let last = report.levels.last().unwrap();
            let last_ids: Vec<String> = last.ids().into_iter().map(str::to_string).collect();
            prop_assert_eq!(forced, &last_ids);
        }
    }
}

#[test]
fn diamond_scenario() {
    let plan = group_with_report(&diamond_plan());
    assert_eq!(plan.id_levels(), vec![vec!["a"], vec!["b", "c"], vec!["d"]]);
}

#[test]
fn two_node_cycle_after_clean_prefix() {
    let plan = group_with_report(&[
        subtask("seed", &[]),
        subtask("left", &["seed", "right"]),
        subtask("right", &["left"]),
    ]);
    assert_eq!(plan.id_levels(), vec![vec!["seed"], vec!["left", "right"]]);
    assert!(plan.has_cycle());
}

#[test]
fn priority_does_not_reorder() {
    use relay_core::Priority;
    let plan = group(&[
        subtask("low", &[]).with_priority(Priority::Low),
        subtask("crit", &[]).with_priority(Priority::Critical),
    ]);
    assert_eq!(plan[0].ids(), vec!["low", "crit"]);
}
