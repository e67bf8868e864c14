//! Row-by-row reconciliation of parsed CSV against a project tree.
//!
//! Each row names one chain of ancestors; existing nodes are matched by name
//! under their parent and missing ones are created, so re-importing the same
//! file is a no-op. Metadata lands on the deepest node of the row only.

use serde::Serialize;
use tracing::debug;

use super::parser::ParsedImport;
use crate::errors::PlanError;
use crate::registry::TypeRegistry;
use crate::tree::{FieldChange, TreeIndex};

/// One broken row and why it was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    /// 1-based data row number.
    pub row: usize,
    pub error: String,
}

/// Aggregate import result.
///
/// `items_created` counts nodes, not rows: a single row can create its whole
/// ancestor chain. `items_updated` counts rows whose target node already
/// existed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,
    pub items_created: usize,
    pub items_updated: usize,
    pub errors: Vec<RowError>,
}

/// What reconciliation did to the tree, before anything is persisted.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub summary: ImportSummary,
    /// Metadata changes observed on nodes that already existed. Changes on
    /// freshly created nodes are part of their initial state and not listed.
    pub changes: Vec<FieldChange>,
}

/// Apply parsed rows to the tree index, creating and updating in memory.
///
/// The caller decides what to do with the result: discard it for a preview,
/// or flush the index and record the changes for a real import.
pub fn reconcile(
    registry: &TypeRegistry,
    index: &mut TreeIndex,
    parsed: &ParsedImport,
) -> Result<ReconcileOutcome, PlanError> {
    let created_before = index.created_count();
    let mut summary = ImportSummary {
        total_rows: parsed.rows.len(),
        ..Default::default()
    };
    let mut changes = Vec::new();

    for row in &parsed.rows {
        if let Some(error) = &row.error {
            summary.errors.push(RowError {
                row: row.row,
                error: error.clone(),
            });
            continue;
        }
        let target_level = match row.target_level() {
            Ok(level) => level,
            Err(error) => {
                summary.errors.push(RowError {
                    row: row.row,
                    error,
                });
                continue;
            }
        };

        let mut parent_id: Option<String> = None;
        let mut target_created = false;
        for level in 1..=target_level {
            let name = match &row.levels[(level - 1) as usize] {
                Some(name) => name,
                // Levels up to the target are filled once target_level() passes
                None => break,
            };
            match index.find_child_by_name(parent_id.as_deref(), name) {
                Some(existing) => {
                    parent_id = Some(existing.id.clone());
                    target_created = false;
                }
                None => {
                    let item_type = registry.resolve_type(level)?;
                    let id = index.insert(parent_id.as_deref(), item_type, name)?;
                    debug!("Row {}: created {} '{}'", row.row, item_type.slug, name);
                    parent_id = Some(id);
                    target_created = true;
                }
            }
        }

        let target_id = match parent_id {
            Some(id) => id,
            None => continue,
        };
        let row_changes = index.apply_leaf_metadata(&target_id, &row.metadata)?;
        if !target_created {
            summary.items_updated += 1;
        }
        // Nodes created during this run have no prior state worth recording
        if !index.is_created(&target_id) {
            changes.extend(row_changes);
        }
    }

    summary.items_created = index.created_count() - created_before;
    debug!(
        "Reconciled {} rows: {} created, {} updated, {} errors",
        summary.total_rows,
        summary.items_created,
        summary.items_updated,
        summary.errors.len()
    );
    Ok(ReconcileOutcome { summary, changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entities::item_types;
    use crate::import::parser::parse;

    fn item_type(level: i32, slug: &str) -> item_types::Model {
        item_types::Model {
            id: level,
            slug: slug.to_string(),
            name: slug.to_string(),
            level,
            organization_id: None,
            is_system: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn registry() -> TypeRegistry {
        TypeRegistry::from_types(
            vec![
                item_type(1, "workstream"),
                item_type(2, "milestone"),
                item_type(3, "activity"),
            ],
            vec![],
        )
        .unwrap()
    }

    fn run(index: &mut TreeIndex, csv: &str) -> ReconcileOutcome {
        let registry = registry();
        let parsed = parse(&registry, csv).unwrap();
        reconcile(&registry, index, &parsed).unwrap()
    }

    #[test]
    fn test_one_row_creates_its_whole_chain() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream,milestone,status\nDev,Sprint 1,in_progress\n",
        );

        assert_eq!(outcome.summary.total_rows, 1);
        assert_eq!(outcome.summary.items_created, 2);
        assert_eq!(outcome.summary.items_updated, 0);
        assert!(outcome.summary.errors.is_empty());
        assert!(outcome.changes.is_empty());

        let sprint = index.find_child_by_name(None, "Dev").cloned().unwrap();
        let sprint = index
            .find_child_by_name(Some(&sprint.id), "Sprint 1")
            .unwrap();
        assert_eq!(sprint.status, "in_progress");
        assert_eq!(sprint.path, "Dev > Sprint 1");
    }

    #[test]
    fn test_second_row_reuses_and_updates_the_target() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream,milestone,status\n\
             Dev,Sprint 1,in_progress\n\
             Dev,Sprint 1,completed\n",
        );

        assert_eq!(outcome.summary.items_created, 2);
        assert_eq!(outcome.summary.items_updated, 1);
        // Both rows touched a node born this run, so nothing for the ledger
        assert!(outcome.changes.is_empty());
        let dev = index.find_child_by_name(None, "Dev").cloned().unwrap();
        let sprint = index
            .find_child_by_name(Some(&dev.id), "Sprint 1")
            .unwrap();
        assert_eq!(sprint.status, "completed");
    }

    #[test]
    fn test_changes_on_stored_nodes_are_recorded() {
        let mut index = TreeIndex::new(1);
        run(
            &mut index,
            "workstream,milestone,status\nDev,Sprint 1,in_progress\n",
        );
        index.mark_persisted();

        let outcome = run(
            &mut index,
            "workstream,milestone,status,owner\nDev,Sprint 1,completed,Ana\n",
        );

        assert_eq!(outcome.summary.items_created, 0);
        assert_eq!(outcome.summary.items_updated, 1);
        assert_eq!(outcome.changes.len(), 2);
        assert_eq!(outcome.changes[0].field, "status");
        assert_eq!(outcome.changes[0].old_value.as_deref(), Some("in_progress"));
        assert_eq!(outcome.changes[0].new_value.as_deref(), Some("completed"));
        assert_eq!(outcome.changes[1].field, "owner");
        assert_eq!(outcome.changes[1].old_value, None);
        assert_eq!(outcome.changes[1].new_value.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let mut index = TreeIndex::new(1);
        let csv = "workstream,milestone,status,owner\n\
                   Dev,Sprint 1,in_progress,Ana\n\
                   Dev,Sprint 2,not_started,\n\
                   Ops,,,\n";
        let first = run(&mut index, csv);
        assert_eq!(first.summary.items_created, 4);

        let second = run(&mut index, csv);
        assert_eq!(second.summary.items_created, 0);
        assert_eq!(second.summary.items_updated, 3);
        assert!(second.changes.is_empty());
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_sibling_match_is_case_insensitive() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream\nDesign\nDESIGN\n  design  \n",
        );

        assert_eq!(outcome.summary.items_created, 1);
        assert_eq!(outcome.summary.items_updated, 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_same_name_under_different_parents() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream,milestone\nDev,Kickoff\nOps,Kickoff\n",
        );

        assert_eq!(outcome.summary.items_created, 4);
        let dev = index.find_child_by_name(None, "Dev").cloned().unwrap();
        let ops = index.find_child_by_name(None, "Ops").cloned().unwrap();
        assert!(index.find_child_by_name(Some(&dev.id), "Kickoff").is_some());
        assert!(index.find_child_by_name(Some(&ops.id), "Kickoff").is_some());
    }

    #[test]
    fn test_broken_rows_do_not_touch_the_tree() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream,milestone,activity,start_date\n\
             Dev,,Review,\n\
             Dev,Sprint 1,,garbage\n\
             Dev,Sprint 1,,\n",
        );

        assert_eq!(outcome.summary.errors.len(), 2);
        assert_eq!(outcome.summary.errors[0].row, 1);
        assert_eq!(outcome.summary.errors[1].row, 2);
        // Only the clean third row landed
        assert_eq!(outcome.summary.items_created, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_metadata_applies_to_deepest_cell_only() {
        let mut index = TreeIndex::new(1);
        run(
            &mut index,
            "workstream,milestone,activity,status,owner\n\
             Dev,Sprint 1,Code review,completed,Ana\n",
        );

        let dev = index.find_child_by_name(None, "Dev").cloned().unwrap();
        let sprint = index
            .find_child_by_name(Some(&dev.id), "Sprint 1")
            .cloned()
            .unwrap();
        let review = index
            .find_child_by_name(Some(&sprint.id), "Code review")
            .unwrap();

        assert_eq!(dev.status, "not_started");
        assert_eq!(dev.owner, None);
        assert_eq!(sprint.status, "not_started");
        assert_eq!(review.status, "completed");
        assert_eq!(review.owner.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_row_order_does_not_change_the_tree() {
        let forward = "workstream,milestone\nDev,Sprint 1\nDev,Sprint 2\nOps,Audit\n";
        let shuffled = "workstream,milestone\nOps,Audit\nDev,Sprint 2\nDev,Sprint 1\n";

        let mut left = TreeIndex::new(1);
        let mut right = TreeIndex::new(1);
        run(&mut left, forward);
        run(&mut right, shuffled);

        assert_eq!(left.len(), right.len());
        for tree in [&left, &right] {
            let dev = tree.find_child_by_name(None, "Dev").cloned().unwrap();
            assert_eq!(tree.children_of(Some(&dev.id)).len(), 2);
            let ops = tree.find_child_by_name(None, "Ops").cloned().unwrap();
            assert_eq!(tree.children_of(Some(&ops.id)).len(), 1);
        }
    }

    #[test]
    fn test_parent_rows_can_come_after_child_rows() {
        let mut index = TreeIndex::new(1);
        let outcome = run(
            &mut index,
            "workstream,milestone,owner\n\
             Dev,Sprint 1,Ana\n\
             Dev,,Bob\n",
        );

        // Second row reuses the implicitly created workstream and owns it
        assert_eq!(outcome.summary.items_created, 2);
        assert_eq!(outcome.summary.items_updated, 1);
        let dev = index.find_child_by_name(None, "Dev").unwrap();
        assert_eq!(dev.owner.as_deref(), Some("Bob"));
    }
}
