//! Subscription reconciliation.
//!
//! After a confirm, the user's active set must equal exactly the chosen
//! set: dropped branches deactivate, previously deactivated ones come
//! back on their original rows, and genuinely new picks insert.

use std::collections::{HashMap, HashSet};

use reviews_store::repo::subscribers::{SubscriptionPlan, SubscriptionRow};

use crate::state::BranchOption;

pub fn reconcile_subscriptions(
    existing: &[SubscriptionRow],
    chosen: &[String],
    available: &[BranchOption],
) -> SubscriptionPlan {
    let chosen_set: HashSet<&str> = chosen.iter().map(String::as_str).collect();
    let names: HashMap<&str, &str> = available
        .iter()
        .map(|b| (b.branch_id.as_str(), b.name.as_str()))
        .collect();

    // Rows are logically unique per (user, branch); collapse any
    // historical duplicates to "active if any row is active".
    let mut active: HashSet<&str> = HashSet::new();
    let mut known: HashSet<&str> = HashSet::new();
    for row in existing {
        known.insert(row.branch_id.as_str());
        if row.is_active {
            active.insert(row.branch_id.as_str());
        }
    }

    let mut plan = SubscriptionPlan::default();
    for branch_id in &active {
        if !chosen_set.contains(branch_id) {
            plan.deactivate.push((*branch_id).to_owned());
        }
    }
    for branch_id in &chosen_set {
        if active.contains(branch_id) {
            continue;
        }
        if known.contains(branch_id) {
            plan.reactivate.push((*branch_id).to_owned());
        } else {
            let name = names.get(branch_id).copied().unwrap_or(branch_id);
            plan.insert
                .push(((*branch_id).to_owned(), name.to_owned()));
        }
    }

    plan.deactivate.sort();
    plan.reactivate.sort();
    plan.insert.sort();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(branch_id: &str, is_active: bool) -> SubscriptionRow {
        SubscriptionRow {
            user_id: "u".into(),
            branch_id: branch_id.into(),
            branch_name: format!("Branch {branch_id}"),
            is_active,
        }
    }

    fn option(branch_id: &str) -> BranchOption {
        BranchOption {
            branch_id: branch_id.into(),
            name: format!("Branch {branch_id}"),
        }
    }

    #[test]
    fn fresh_user_inserts_everything_chosen() {
        let plan = reconcile_subscriptions(
            &[],
            &["1".into(), "2".into()],
            &[option("1"), option("2"), option("3")],
        );
        assert!(plan.deactivate.is_empty());
        assert!(plan.reactivate.is_empty());
        assert_eq!(
            plan.insert,
            vec![
                ("1".to_owned(), "Branch 1".to_owned()),
                ("2".to_owned(), "Branch 2".to_owned())
            ]
        );
    }

    #[test]
    fn dropped_branches_deactivate_and_returning_ones_reactivate() {
        let existing = [row("1", true), row("2", false), row("3", true)];
        let plan = reconcile_subscriptions(
            &existing,
            &["2".into(), "3".into()],
            &[option("1"), option("2"), option("3")],
        );
        assert_eq!(plan.deactivate, vec!["1".to_owned()]);
        assert_eq!(plan.reactivate, vec!["2".to_owned()]);
        assert!(plan.insert.is_empty());
    }

    #[test]
    fn unchanged_selection_is_a_noop() {
        let existing = [row("1", true), row("2", true)];
        let plan = reconcile_subscriptions(
            &existing,
            &["1".into(), "2".into()],
            &[option("1"), option("2")],
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn empty_selection_deactivates_all_active_rows() {
        let existing = [row("1", true), row("2", true), row("3", false)];
        let plan = reconcile_subscriptions(&existing, &[], &[option("1"), option("2")]);
        assert_eq!(plan.deactivate, vec!["1".to_owned(), "2".to_owned()]);
        assert!(plan.reactivate.is_empty());
        assert!(plan.insert.is_empty());
    }

    #[test]
    fn duplicate_rows_collapse_to_pair_semantics() {
        // Two historical rows for the same pair, one active.
        let existing = [row("1", false), row("1", true)];
        let plan = reconcile_subscriptions(&existing, &["1".into()], &[option("1")]);
        assert!(plan.is_empty());
    }
}
