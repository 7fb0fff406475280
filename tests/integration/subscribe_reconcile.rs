//! Subscribe-flow reconciliation: after a confirm, the active set equals
//! exactly the chosen set; unsubscribe-all preserves row identity.

use std::collections::HashSet;

use bot::plan::reconcile_subscriptions;
use bot::state::BranchOption;
use reviews_store::repo::subscribers::SubscriptionRow;

fn roster() -> Vec<BranchOption> {
    (1..=4)
        .map(|i| BranchOption {
            branch_id: i.to_string(),
            name: format!("Филиал {i}"),
        })
        .collect()
}

fn row(branch_id: &str, is_active: bool) -> SubscriptionRow {
    SubscriptionRow {
        user_id: "777".into(),
        branch_id: branch_id.into(),
        branch_name: format!("Филиал {branch_id}"),
        is_active,
    }
}

/// In-memory model of `apply_plan` over pair-unique rows.
fn apply(rows: &mut Vec<SubscriptionRow>, plan: &reviews_store::repo::subscribers::SubscriptionPlan) {
    for row in rows.iter_mut() {
        if plan.deactivate.contains(&row.branch_id) {
            row.is_active = false;
        }
        if plan.reactivate.contains(&row.branch_id) {
            row.is_active = true;
        }
    }
    for (branch_id, branch_name) in &plan.insert {
        rows.push(SubscriptionRow {
            user_id: "777".into(),
            branch_id: branch_id.clone(),
            branch_name: branch_name.clone(),
            is_active: true,
        });
    }
}

fn active_set(rows: &[SubscriptionRow]) -> HashSet<String> {
    rows.iter()
        .filter(|r| r.is_active)
        .map(|r| r.branch_id.clone())
        .collect()
}

#[test]
fn confirming_a_set_makes_active_exactly_that_set() {
    let mut rows: Vec<SubscriptionRow> = Vec::new();
    let chosen: Vec<String> = vec!["1".into(), "3".into(), "4".into()];

    let plan = reconcile_subscriptions(&rows, &chosen, &roster());
    apply(&mut rows, &plan);
    assert_eq!(
        active_set(&rows),
        chosen.iter().cloned().collect::<HashSet<_>>()
    );

    // Narrow the selection: dropped branches deactivate, rows survive.
    let narrowed: Vec<String> = vec!["3".into()];
    let plan = reconcile_subscriptions(&rows, &narrowed, &roster());
    apply(&mut rows, &plan);
    assert_eq!(active_set(&rows), HashSet::from(["3".to_owned()]));
    assert_eq!(rows.len(), 3, "deactivation must not delete rows");
}

#[test]
fn select_all_then_confirm_covers_the_roster() {
    let mut rows = vec![row("2", true)];
    let all: Vec<String> = roster().iter().map(|b| b.branch_id.clone()).collect();

    let plan = reconcile_subscriptions(&rows, &all, &roster());
    apply(&mut rows, &plan);
    assert_eq!(active_set(&rows).len(), roster().len());
}

#[test]
fn unsubscribe_all_then_reselect_reuses_the_same_rows() {
    let mut rows = vec![row("1", true), row("2", true), row("3", true)];

    // Unsubscribe-all is a plain deactivation of every active row.
    let plan = reconcile_subscriptions(&rows, &[], &roster());
    apply(&mut rows, &plan);
    assert!(active_set(&rows).is_empty());
    assert_eq!(rows.len(), 3);

    // Re-selecting reactivates, never inserts a duplicate.
    let again: Vec<String> = vec!["2".into()];
    let plan = reconcile_subscriptions(&rows, &again, &roster());
    assert_eq!(plan.reactivate, vec!["2".to_owned()]);
    assert!(plan.insert.is_empty());
    apply(&mut rows, &plan);
    assert_eq!(rows.len(), 3);
    assert_eq!(active_set(&rows), HashSet::from(["2".to_owned()]));
}
