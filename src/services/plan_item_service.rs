//! Plan item service: the boundary the HTTP layer talks to.
//!
//! Import and bulk update each run as one transaction; a failure anywhere in
//! the batch rolls the whole unit of work back. Every applied field change
//! lands in the history ledger with the actor and a reason.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::entities::plan_item_history::{self, ItemField};
use crate::database::entities::{plan_items, projects};
use crate::errors::{PlanError, PlanResult};
use crate::import::{self, ImportSummary, ParsedImport};
use crate::registry::TypeRegistry;
use crate::tree::{FieldChange, PlanTreeNode, TreeIndex};

/// One accepted field change in a bulk update batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFieldUpdate {
    pub plan_item_id: String,
    pub field: String,
    pub new_value: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub evidence_content_ids: Vec<String>,
}

/// Aggregate bulk update result.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateSummary {
    pub updated: usize,
    pub history_records: usize,
}

/// Service for plan tree operations: CSV import, bulk field updates and
/// interactive editing.
#[derive(Clone)]
pub struct PlanItemService {
    db: DatabaseConnection,
}

impl PlanItemService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn project<C>(&self, db: &C, project_id: i32) -> PlanResult<projects::Model>
    where
        C: ConnectionTrait,
    {
        projects::Entity::find_by_id(project_id)
            .one(db)
            .await?
            .ok_or(PlanError::ProjectNotFound(project_id))
    }

    async fn record_changes<C>(
        &self,
        db: &C,
        changes: &[FieldChange],
        reason: &str,
        evidence_content_ids: &[String],
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<usize>
    where
        C: ConnectionTrait,
    {
        if changes.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let records: Vec<plan_item_history::ActiveModel> = changes
            .iter()
            .map(|change| plan_item_history::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                plan_item_id: Set(change.item_id.clone()),
                field: Set(change.field.clone()),
                old_value: Set(change.old_value.clone()),
                new_value: Set(change.new_value.clone()),
                changed_by_user_id: Set(actor_id.map(str::to_string)),
                changed_by_email: Set(actor_email.map(str::to_string)),
                change_reason: Set(reason.to_string()),
                evidence_content_ids: Set(json!(evidence_content_ids)),
                created_at: Set(now),
            })
            .collect();

        let count = records.len();
        plan_item_history::Entity::insert_many(records).exec(db).await?;
        Ok(count)
    }

    /// Parse a CSV against the project's type registry without touching the
    /// tree. The result carries per-row warnings and errors for review.
    pub async fn preview_import(
        &self,
        project_id: i32,
        csv_text: &str,
    ) -> PlanResult<ParsedImport> {
        let project = self.project(&self.db, project_id).await?;
        let registry = TypeRegistry::load(&self.db, Some(project.organization_id)).await?;
        let parsed = import::parse(&registry, csv_text)?;

        debug!(
            "Preview for project {}: {} rows, {} errors",
            project_id,
            parsed.rows.len(),
            parsed.errors.len()
        );
        Ok(parsed)
    }

    /// Import a CSV into the project's plan tree in one transaction.
    ///
    /// Rows reuse existing nodes by name and create the missing ones;
    /// metadata changes on reused nodes are written to the history ledger
    /// with reason "CSV import". Broken rows are reported in the summary,
    /// never aborting the batch.
    pub async fn import_plan_items(
        &self,
        project_id: i32,
        csv_text: &str,
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<ImportSummary> {
        let txn = self.db.begin().await?;

        let project = self.project(&txn, project_id).await?;
        let registry = TypeRegistry::load(&txn, Some(project.organization_id)).await?;
        let parsed = import::parse(&registry, csv_text)?;

        let mut index = TreeIndex::load(&txn, project_id).await?;
        let outcome = import::reconcile(&registry, &mut index, &parsed)?;
        index.flush(&txn).await?;

        self.record_changes(
            &txn,
            &outcome.changes,
            "CSV import",
            &[],
            actor_id,
            actor_email,
        )
        .await?;

        txn.commit().await?;

        info!(
            "Imported {} rows into project {}: {} created, {} updated, {} errors",
            outcome.summary.total_rows,
            project_id,
            outcome.summary.items_created,
            outcome.summary.items_updated,
            outcome.summary.errors.len()
        );
        Ok(outcome.summary)
    }

    /// Apply a batch of accepted field updates atomically.
    ///
    /// Updates naming items outside the project, or inactive items, are
    /// dropped silently and do not count. An unknown field or an invalid
    /// typed value fails the whole batch with nothing applied.
    pub async fn bulk_update_plan_items(
        &self,
        project_id: i32,
        updates: Vec<BulkFieldUpdate>,
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<BulkUpdateSummary> {
        let txn = self.db.begin().await?;

        self.project(&txn, project_id).await?;
        let mut index = TreeIndex::load(&txn, project_id).await?;

        let mut summary = BulkUpdateSummary::default();
        for update in &updates {
            let field = ItemField::parse(&update.field)
                .ok_or_else(|| PlanError::InvalidField(update.field.clone()))?;

            match index.get(&update.plan_item_id) {
                Some(item) if item.is_active => {}
                Some(_) => {
                    debug!("Dropping update for inactive item {}", update.plan_item_id);
                    continue;
                }
                None => {
                    debug!("Dropping update for foreign item {}", update.plan_item_id);
                    continue;
                }
            }

            let changes =
                index.update_field(&update.plan_item_id, field, update.new_value.as_deref())?;
            if changes.is_empty() {
                continue;
            }
            summary.updated += 1;
            summary.history_records += self
                .record_changes(
                    &txn,
                    &changes,
                    &update.reason,
                    &update.evidence_content_ids,
                    actor_id,
                    actor_email,
                )
                .await?;
        }

        index.flush(&txn).await?;
        txn.commit().await?;

        info!(
            "Bulk updated {} of {} requested items in project {} ({} history records)",
            summary.updated,
            updates.len(),
            project_id,
            summary.history_records
        );
        Ok(summary)
    }

    /// The project's active plan tree, children ordered by sort_order.
    pub async fn get_plan_tree(&self, project_id: i32) -> PlanResult<Vec<PlanTreeNode>> {
        self.project(&self.db, project_id).await?;
        let index = TreeIndex::load(&self.db, project_id).await?;
        Ok(index.to_tree())
    }

    /// CSV template for an organization's column set; `None` uses the system
    /// types.
    pub async fn get_csv_template(&self, organization_id: Option<i32>) -> PlanResult<String> {
        let registry = TypeRegistry::load(&self.db, organization_id).await?;
        import::csv_template(&registry)
    }

    /// Create one item interactively. The item type is inferred from the
    /// position: level 1 for roots, parent level + 1 otherwise.
    pub async fn create_item(
        &self,
        project_id: i32,
        parent_id: Option<&str>,
        name: &str,
    ) -> PlanResult<plan_items::Model> {
        let txn = self.db.begin().await?;

        let project = self.project(&txn, project_id).await?;
        let registry = TypeRegistry::load(&txn, Some(project.organization_id)).await?;
        let mut index = TreeIndex::load(&txn, project_id).await?;

        let level = match parent_id {
            Some(pid) => {
                let parent = index
                    .get(pid)
                    .ok_or_else(|| PlanError::ItemNotFound(pid.to_string()))?;
                parent.depth + 2
            }
            None => 1,
        };
        let item_type = registry.resolve_type(level)?;
        let id = index.insert(parent_id, item_type, name)?;
        index.flush(&txn).await?;

        let item = index
            .get(&id)
            .cloned()
            .ok_or_else(|| PlanError::ItemNotFound(id.clone()))?;
        txn.commit().await?;

        info!(
            "Created {} '{}' in project {}",
            item_type.slug, item.name, project_id
        );
        Ok(item)
    }

    /// Update a single field interactively, with a history record.
    pub async fn update_item_field(
        &self,
        project_id: i32,
        item_id: &str,
        field: &str,
        value: Option<&str>,
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<plan_items::Model> {
        let field = ItemField::parse(field).ok_or_else(|| PlanError::InvalidField(field.to_string()))?;

        let txn = self.db.begin().await?;

        self.project(&txn, project_id).await?;
        let mut index = TreeIndex::load(&txn, project_id).await?;

        let changes = index.update_field(item_id, field, value)?;
        index.flush(&txn).await?;
        self.record_changes(&txn, &changes, "manual edit", &[], actor_id, actor_email)
            .await?;

        let item = index
            .get(item_id)
            .cloned()
            .ok_or_else(|| PlanError::ItemNotFound(item_id.to_string()))?;
        txn.commit().await?;
        Ok(item)
    }

    /// Move an item under a new parent at the same level, recomputing the
    /// paths of its subtree.
    pub async fn move_item(
        &self,
        project_id: i32,
        item_id: &str,
        new_parent_id: Option<&str>,
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<plan_items::Model> {
        let txn = self.db.begin().await?;

        self.project(&txn, project_id).await?;
        let mut index = TreeIndex::load(&txn, project_id).await?;

        let changes = index.reparent(item_id, new_parent_id)?;
        index.flush(&txn).await?;
        self.record_changes(&txn, &changes, "manual edit", &[], actor_id, actor_email)
            .await?;

        let item = index
            .get(item_id)
            .cloned()
            .ok_or_else(|| PlanError::ItemNotFound(item_id.to_string()))?;
        txn.commit().await?;

        info!("Moved item {} in project {}", item_id, project_id);
        Ok(item)
    }

    /// Soft-delete an item. Children keep their parent link for audit but
    /// drop out of the rendered tree.
    pub async fn delete_item(
        &self,
        project_id: i32,
        item_id: &str,
        actor_id: Option<&str>,
        actor_email: Option<&str>,
    ) -> PlanResult<()> {
        let txn = self.db.begin().await?;

        self.project(&txn, project_id).await?;
        let mut index = TreeIndex::load(&txn, project_id).await?;

        let changes = index.deactivate(item_id)?;
        index.flush(&txn).await?;
        self.record_changes(&txn, &changes, "manual edit", &[], actor_id, actor_email)
            .await?;
        txn.commit().await?;

        info!("Deactivated item {} in project {}", item_id, project_id);
        Ok(())
    }

    /// History ledger slice for one item, newest first.
    pub async fn get_item_history(
        &self,
        project_id: i32,
        item_id: &str,
        limit: Option<u64>,
    ) -> PlanResult<Vec<plan_item_history::Model>> {
        let item = plan_items::Entity::find_by_id(item_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PlanError::ItemNotFound(item_id.to_string()))?;
        if item.project_id != project_id {
            return Err(PlanError::ItemNotFound(item_id.to_string()));
        }

        let mut query = plan_item_history::Entity::find()
            .filter(plan_item_history::Column::PlanItemId.eq(item_id))
            .order_by_desc(plan_item_history::Column::CreatedAt);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.all(&self.db).await?)
    }
}
