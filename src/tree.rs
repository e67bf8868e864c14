use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::database::entities::item_types;
use crate::database::entities::plan_item_history::ItemField;
use crate::database::entities::plan_items::{self, parse_plan_date, ItemStatus, PATH_SEPARATOR};
use crate::errors::PlanError;

/// Metadata carried by the deepest node of an import row. `None` means the
/// cell was empty and the existing value is left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeafMetadata {
    pub status: Option<ItemStatus>,
    pub owner: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// One observed field mutation, input for the history ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub item_id: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A plan item with its active children, for rendering and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PlanTreeNode {
    #[serde(flatten)]
    pub item: plan_items::Model,
    pub children: Vec<PlanTreeNode>,
}

/// In-memory index over all plan items of one project. Items are held in an
/// arena keyed by id, parent links are lookup keys rather than references,
/// and active sibling names are indexed for O(1) reconciliation lookups.
///
/// Mutations accumulate in memory; `flush` writes them back in one pass so
/// the caller can wrap the whole batch in a transaction.
#[derive(Debug)]
pub struct TreeIndex {
    project_id: i32,
    items: HashMap<String, plan_items::Model>,
    children: HashMap<Option<String>, Vec<String>>,
    // (parent id, lowercased name) -> id, active items only
    name_index: HashMap<(Option<String>, String), String>,
    created: Vec<String>,
    dirty: HashSet<String>,
}

impl TreeIndex {
    pub fn new(project_id: i32) -> Self {
        TreeIndex {
            project_id,
            items: HashMap::new(),
            children: HashMap::new(),
            name_index: HashMap::new(),
            created: Vec::new(),
            dirty: HashSet::new(),
        }
    }

    /// Load every plan item of a project, active or not.
    pub async fn load<C>(db: &C, project_id: i32) -> Result<Self, PlanError>
    where
        C: ConnectionTrait,
    {
        let rows = plan_items::Entity::find()
            .filter(plan_items::Column::ProjectId.eq(project_id))
            .order_by_asc(plan_items::Column::SortOrder)
            .all(db)
            .await?;

        let mut index = TreeIndex::new(project_id);
        for item in rows {
            index.track(item);
        }
        Ok(index)
    }

    fn track(&mut self, item: plan_items::Model) {
        self.children
            .entry(item.parent_id.clone())
            .or_default()
            .push(item.id.clone());
        if item.is_active {
            self.name_index.insert(
                (item.parent_id.clone(), item.name.to_lowercase()),
                item.id.clone(),
            );
        }
        self.items.insert(item.id.clone(), item);
    }

    pub fn project_id(&self) -> i32 {
        self.project_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&plan_items::Model> {
        self.items.get(id)
    }

    /// Ids of items inserted since load, in insertion order.
    pub fn created_ids(&self) -> &[String] {
        &self.created
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn is_created(&self, id: &str) -> bool {
        self.created.iter().any(|created| created == id)
    }

    /// Forget tracked inserts and updates, treating the current in-memory
    /// state as already stored.
    pub fn mark_persisted(&mut self) {
        self.created.clear();
        self.dirty.clear();
    }

    /// Case-insensitive exact match among active children of a parent.
    pub fn find_child_by_name(
        &self,
        parent_id: Option<&str>,
        name: &str,
    ) -> Option<&plan_items::Model> {
        let key = (parent_id.map(str::to_string), name.trim().to_lowercase());
        self.name_index.get(&key).and_then(|id| self.items.get(id))
    }

    /// Active children of a parent, ordered by sort_order.
    pub fn children_of(&self, parent_id: Option<&str>) -> Vec<&plan_items::Model> {
        let key = parent_id.map(str::to_string);
        let mut result: Vec<&plan_items::Model> = self
            .children
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.items.get(id))
                    .filter(|item| item.is_active)
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by_key(|item| item.sort_order);
        result
    }

    fn next_sort_order(&self, parent_id: Option<&str>) -> i32 {
        let key = parent_id.map(str::to_string);
        self.children
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.items.get(id))
                    .map(|item| item.sort_order)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1
    }

    fn describe_parent(&self, parent_id: Option<&str>) -> String {
        match parent_id.and_then(|id| self.items.get(id)) {
            Some(parent) => format!("'{}'", parent.name),
            None => "the project root".to_string(),
        }
    }

    /// Insert a new item under a parent. Computes depth, path and sort_order,
    /// and verifies that the item type's level matches the position: one
    /// greater than the parent's level, or 1 for roots. A mismatch is a
    /// configuration error that aborts the whole operation.
    pub fn insert(
        &mut self,
        parent_id: Option<&str>,
        item_type: &item_types::Model,
        name: &str,
    ) -> Result<String, PlanError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PlanError::Validation("item name must not be empty".to_string()));
        }

        let (expected_level, parent_path, depth) = match parent_id {
            Some(pid) => {
                let parent = self
                    .items
                    .get(pid)
                    .ok_or_else(|| PlanError::ItemNotFound(pid.to_string()))?;
                if !parent.is_active {
                    return Err(PlanError::Validation(format!(
                        "cannot add children under inactive item '{}'",
                        parent.name
                    )));
                }
                (parent.depth + 2, Some(parent.path.clone()), parent.depth + 1)
            }
            None => (1, None, 0),
        };

        if item_type.level != expected_level {
            return Err(PlanError::Validation(format!(
                "item type '{}' has level {}, expected level {} at this position in the tree",
                item_type.slug, item_type.level, expected_level
            )));
        }

        if self.find_child_by_name(parent_id, trimmed).is_some() {
            return Err(PlanError::DuplicateSibling {
                name: trimmed.to_string(),
                parent: self.describe_parent(parent_id),
            });
        }

        let path = match parent_path {
            Some(parent_path) => format!("{}{}{}", parent_path, PATH_SEPARATOR, trimmed),
            None => trimmed.to_string(),
        };

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let item = plan_items::Model {
            id: id.clone(),
            project_id: self.project_id,
            parent_id: parent_id.map(str::to_string),
            item_type_id: item_type.id,
            name: trimmed.to_string(),
            status: String::from(ItemStatus::default()),
            owner: None,
            start_date: None,
            target_end_date: None,
            actual_end_date: None,
            notes: None,
            path,
            depth,
            sort_order: self.next_sort_order(parent_id),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.track(item);
        self.created.push(id.clone());
        Ok(id)
    }

    /// Merge row metadata onto an item. A populated field is never cleared by
    /// an absent input; a present input replaces the stored value. Returns the
    /// changes actually made.
    pub fn apply_leaf_metadata(
        &mut self,
        id: &str,
        metadata: &LeafMetadata,
    ) -> Result<Vec<FieldChange>, PlanError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;

        let mut changes = Vec::new();

        if let Some(status) = metadata.status {
            if item.get_status() != status {
                changes.push(FieldChange {
                    item_id: id.to_string(),
                    field: "status".to_string(),
                    old_value: Some(item.status.clone()),
                    new_value: Some(String::from(status)),
                });
                item.status = String::from(status);
            }
        }

        if let Some(owner) = &metadata.owner {
            if item.owner.as_deref() != Some(owner.as_str()) {
                changes.push(FieldChange {
                    item_id: id.to_string(),
                    field: "owner".to_string(),
                    old_value: item.owner.clone(),
                    new_value: Some(owner.clone()),
                });
                item.owner = Some(owner.clone());
            }
        }

        if let Some(start_date) = metadata.start_date {
            if item.start_date != Some(start_date) {
                changes.push(FieldChange {
                    item_id: id.to_string(),
                    field: "start_date".to_string(),
                    old_value: date_value(item.start_date),
                    new_value: date_value(Some(start_date)),
                });
                item.start_date = Some(start_date);
            }
        }

        if let Some(target_end_date) = metadata.target_end_date {
            if item.target_end_date != Some(target_end_date) {
                changes.push(FieldChange {
                    item_id: id.to_string(),
                    field: "target_end_date".to_string(),
                    old_value: date_value(item.target_end_date),
                    new_value: date_value(Some(target_end_date)),
                });
                item.target_end_date = Some(target_end_date);
            }
        }

        if let Some(notes) = &metadata.notes {
            if item.notes.as_deref() != Some(notes.as_str()) {
                changes.push(FieldChange {
                    item_id: id.to_string(),
                    field: "notes".to_string(),
                    old_value: item.notes.clone(),
                    new_value: Some(notes.clone()),
                });
                item.notes = Some(notes.clone());
            }
        }

        if !changes.is_empty() {
            item.updated_at = Utc::now();
            self.dirty.insert(id.to_string());
        }

        Ok(changes)
    }

    /// Rename an item and recompute the materialized paths of its subtree.
    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<Vec<FieldChange>, PlanError> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(PlanError::Validation("item name must not be empty".to_string()));
        }

        let (parent_id, old_name) = {
            let item = self
                .items
                .get(id)
                .ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;
            (item.parent_id.clone(), item.name.clone())
        };

        if old_name == trimmed {
            return Ok(Vec::new());
        }

        let key = (parent_id.clone(), trimmed.to_lowercase());
        if let Some(existing) = self.name_index.get(&key) {
            if existing != id {
                return Err(PlanError::DuplicateSibling {
                    name: trimmed.to_string(),
                    parent: self.describe_parent(parent_id.as_deref()),
                });
            }
        }

        self.name_index.remove(&(parent_id.clone(), old_name.to_lowercase()));
        self.name_index.insert(key, id.to_string());

        let item = self.items.get_mut(id).ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;
        item.name = trimmed.to_string();
        item.updated_at = Utc::now();
        self.dirty.insert(id.to_string());

        self.recompute_subtree_paths(id);

        Ok(vec![FieldChange {
            item_id: id.to_string(),
            field: "name".to_string(),
            old_value: Some(old_name),
            new_value: Some(trimmed.to_string()),
        }])
    }

    /// Apply one accepted field update from the bulk path. Values arrive as
    /// raw strings; typed fields are validated strictly, and `notes` appends
    /// with a timestamp marker instead of replacing.
    pub fn update_field(
        &mut self,
        id: &str,
        field: ItemField,
        value: Option<&str>,
    ) -> Result<Vec<FieldChange>, PlanError> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());

        if matches!(field, ItemField::Name) {
            let name = value.ok_or_else(|| PlanError::InvalidValue {
                field: field.to_string(),
                value: String::new(),
            })?;
            return self.rename(id, name);
        }

        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;

        let change: Option<FieldChange> = match field {
            // Handled by the early return above
            ItemField::Name => None,
            ItemField::Status => {
                let raw = value.ok_or_else(|| PlanError::InvalidValue {
                    field: field.to_string(),
                    value: String::new(),
                })?;
                let status = ItemStatus::parse(raw).ok_or_else(|| PlanError::InvalidValue {
                    field: field.to_string(),
                    value: raw.to_string(),
                })?;
                if item.get_status() != status {
                    let old = item.status.clone();
                    item.status = String::from(status);
                    Some(FieldChange {
                        item_id: id.to_string(),
                        field: field.to_string(),
                        old_value: Some(old),
                        new_value: Some(item.status.clone()),
                    })
                } else {
                    None
                }
            }
            ItemField::Owner => {
                if item.owner.as_deref() != value {
                    let old = item.owner.take();
                    item.owner = value.map(str::to_string);
                    Some(FieldChange {
                        item_id: id.to_string(),
                        field: field.to_string(),
                        old_value: old,
                        new_value: item.owner.clone(),
                    })
                } else {
                    None
                }
            }
            ItemField::StartDate => update_date_field(&mut item.start_date, field, value, id)?,
            ItemField::TargetEndDate => {
                update_date_field(&mut item.target_end_date, field, value, id)?
            }
            ItemField::ActualEndDate => {
                update_date_field(&mut item.actual_end_date, field, value, id)?
            }
            ItemField::Notes => match value {
                None => None,
                Some(text) => {
                    let stamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
                    let appended = match &item.notes {
                        Some(existing) => format!("{}\n\n[{}] {}", existing, stamp, text),
                        None => format!("[{}] {}", stamp, text),
                    };
                    let old = item.notes.take();
                    item.notes = Some(appended);
                    Some(FieldChange {
                        item_id: id.to_string(),
                        field: field.to_string(),
                        old_value: old,
                        new_value: item.notes.clone(),
                    })
                }
            },
        };

        match change {
            Some(change) => {
                item.updated_at = Utc::now();
                self.dirty.insert(id.to_string());
                Ok(vec![change])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Move an item under a new parent at the same level. Rejects moves that
    /// would make the item an ancestor of itself.
    pub fn reparent(
        &mut self,
        id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<Vec<FieldChange>, PlanError> {
        let (old_parent_id, name, depth) = {
            let item = self
                .items
                .get(id)
                .ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;
            (item.parent_id.clone(), item.name.clone(), item.depth)
        };

        if old_parent_id.as_deref() == new_parent_id {
            return Ok(Vec::new());
        }

        // Walk up from the new parent; reaching the item means a cycle
        let mut chain = vec![name.clone()];
        let mut cursor = new_parent_id.map(str::to_string);
        while let Some(ancestor_id) = cursor {
            let ancestor = self
                .items
                .get(&ancestor_id)
                .ok_or_else(|| PlanError::ItemNotFound(ancestor_id.clone()))?;
            chain.push(ancestor.name.clone());
            if ancestor_id == id {
                chain.reverse();
                return Err(PlanError::CycleDetected(chain.join(" -> ")));
            }
            cursor = ancestor.parent_id.clone();
        }

        let new_depth = match new_parent_id {
            Some(pid) => {
                let parent = self
                    .items
                    .get(pid)
                    .ok_or_else(|| PlanError::ItemNotFound(pid.to_string()))?;
                if !parent.is_active {
                    return Err(PlanError::Validation(format!(
                        "cannot move items under inactive item '{}'",
                        parent.name
                    )));
                }
                parent.depth + 1
            }
            None => 0,
        };
        if new_depth != depth {
            return Err(PlanError::Validation(format!(
                "'{}' keeps its level when moved; the new parent must sit one level above it",
                name
            )));
        }

        if self.find_child_by_name(new_parent_id, &name).is_some() {
            return Err(PlanError::DuplicateSibling {
                name: name.clone(),
                parent: self.describe_parent(new_parent_id),
            });
        }

        if let Some(ids) = self.children.get_mut(&old_parent_id) {
            ids.retain(|child| child != id);
        }
        self.name_index.remove(&(old_parent_id.clone(), name.to_lowercase()));

        let sort_order = self.next_sort_order(new_parent_id);
        let new_parent = new_parent_id.map(str::to_string);
        self.children
            .entry(new_parent.clone())
            .or_default()
            .push(id.to_string());
        self.name_index
            .insert((new_parent.clone(), name.to_lowercase()), id.to_string());

        let item = self.items.get_mut(id).ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;
        item.parent_id = new_parent.clone();
        item.sort_order = sort_order;
        item.updated_at = Utc::now();
        self.dirty.insert(id.to_string());

        self.recompute_subtree_paths(id);

        Ok(vec![FieldChange {
            item_id: id.to_string(),
            field: "parent_id".to_string(),
            old_value: old_parent_id,
            new_value: new_parent,
        }])
    }

    /// Soft-delete an item. Children keep their parent_id but drop out of
    /// traversal, and the name becomes reusable among active siblings.
    pub fn deactivate(&mut self, id: &str) -> Result<Vec<FieldChange>, PlanError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| PlanError::ItemNotFound(id.to_string()))?;

        if !item.is_active {
            return Ok(Vec::new());
        }

        item.is_active = false;
        item.updated_at = Utc::now();
        let parent_id = item.parent_id.clone();
        let name = item.name.to_lowercase();
        self.name_index.remove(&(parent_id, name));
        self.dirty.insert(id.to_string());

        Ok(vec![FieldChange {
            item_id: id.to_string(),
            field: "is_active".to_string(),
            old_value: Some("true".to_string()),
            new_value: Some("false".to_string()),
        }])
    }

    fn recompute_subtree_paths(&mut self, root_id: &str) {
        let mut stack = vec![root_id.to_string()];
        while let Some(current_id) = stack.pop() {
            let parent_path = self
                .items
                .get(&current_id)
                .and_then(|item| item.parent_id.clone())
                .and_then(|pid| self.items.get(&pid))
                .map(|parent| parent.path.clone());

            if let Some(item) = self.items.get_mut(&current_id) {
                let new_path = match &parent_path {
                    Some(parent_path) => format!("{}{}{}", parent_path, PATH_SEPARATOR, item.name),
                    None => item.name.clone(),
                };
                if item.path != new_path {
                    item.path = new_path;
                    item.updated_at = Utc::now();
                    self.dirty.insert(current_id.clone());
                }
            }

            if let Some(child_ids) = self.children.get(&Some(current_id)) {
                stack.extend(child_ids.iter().cloned());
            }
        }
    }

    /// Build the nested tree of active items, children ordered by sort_order.
    pub fn to_tree(&self) -> Vec<PlanTreeNode> {
        fn build(index: &TreeIndex, item: &plan_items::Model) -> PlanTreeNode {
            let mut node = PlanTreeNode {
                item: item.clone(),
                children: Vec::new(),
            };
            for child in index.children_of(Some(&item.id)) {
                node.children.push(build(index, child));
            }
            node
        }

        self.children_of(None)
            .into_iter()
            .map(|root| build(self, root))
            .collect()
    }

    /// Write accumulated inserts and updates back to the store. Created items
    /// go first, in insertion order, so parents always precede children.
    pub async fn flush<C>(&self, db: &C) -> Result<(), PlanError>
    where
        C: ConnectionTrait,
    {
        let created_set: HashSet<&String> = self.created.iter().collect();

        for id in &self.created {
            if let Some(item) = self.items.get(id) {
                full_active_model(item).insert(db).await?;
            }
        }

        for id in &self.dirty {
            if created_set.contains(id) {
                continue;
            }
            if let Some(item) = self.items.get(id) {
                full_active_model(item).update(db).await?;
            }
        }

        Ok(())
    }
}

fn full_active_model(item: &plan_items::Model) -> plan_items::ActiveModel {
    plan_items::ActiveModel {
        id: Set(item.id.clone()),
        project_id: Set(item.project_id),
        parent_id: Set(item.parent_id.clone()),
        item_type_id: Set(item.item_type_id),
        name: Set(item.name.clone()),
        status: Set(item.status.clone()),
        owner: Set(item.owner.clone()),
        start_date: Set(item.start_date),
        target_end_date: Set(item.target_end_date),
        actual_end_date: Set(item.actual_end_date),
        notes: Set(item.notes.clone()),
        path: Set(item.path.clone()),
        depth: Set(item.depth),
        sort_order: Set(item.sort_order),
        is_active: Set(item.is_active),
        created_at: Set(item.created_at),
        updated_at: Set(item.updated_at),
    }
}

fn date_value(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn update_date_field(
    slot: &mut Option<NaiveDate>,
    field: ItemField,
    value: Option<&str>,
    item_id: &str,
) -> Result<Option<FieldChange>, PlanError> {
    let parsed = match value {
        Some(raw) => Some(parse_plan_date(raw).ok_or_else(|| PlanError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
        })?),
        None => None,
    };
    if *slot == parsed {
        return Ok(None);
    }
    let change = FieldChange {
        item_id: item_id.to_string(),
        field: field.to_string(),
        old_value: date_value(*slot),
        new_value: date_value(parsed),
    };
    *slot = parsed;
    Ok(Some(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_type(id: i32, slug: &str, level: i32) -> item_types::Model {
        let now = Utc::now();
        item_types::Model {
            id,
            slug: slug.to_string(),
            name: slug.to_string(),
            level,
            organization_id: None,
            is_system: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn workstream() -> item_types::Model {
        test_type(1, "workstream", 1)
    }

    fn milestone() -> item_types::Model {
        test_type(2, "milestone", 2)
    }

    fn activity() -> item_types::Model {
        test_type(3, "activity", 3)
    }

    #[test]
    fn test_insert_computes_path_depth_and_sort_order() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let sprint1 = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let sprint2 = index.insert(Some(&dev), &milestone(), "Sprint 2").unwrap();

        let root = index.get(&dev).unwrap();
        assert_eq!(root.depth, 0);
        assert_eq!(root.path, "Dev");
        assert_eq!(root.sort_order, 1);

        let first = index.get(&sprint1).unwrap();
        assert_eq!(first.depth, 1);
        assert_eq!(first.path, "Dev > Sprint 1");
        assert_eq!(first.sort_order, 1);

        let second = index.get(&sprint2).unwrap();
        assert_eq!(second.sort_order, 2);
    }

    #[test]
    fn test_find_child_by_name_is_case_insensitive() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();

        assert!(index.find_child_by_name(Some(&dev), "sprint 1").is_some());
        assert!(index.find_child_by_name(Some(&dev), " SPRINT 1 ").is_some());
        assert!(index.find_child_by_name(Some(&dev), "Sprint 2").is_none());
        assert!(index.find_child_by_name(None, "dev").is_some());
    }

    #[test]
    fn test_duplicate_sibling_names_rejected() {
        let mut index = TreeIndex::new(1);
        index.insert(None, &workstream(), "Dev").unwrap();
        let err = index.insert(None, &workstream(), "dev").unwrap_err();
        assert!(matches!(err, PlanError::DuplicateSibling { .. }));
    }

    #[test]
    fn test_type_level_must_match_position() {
        let mut index = TreeIndex::new(1);
        // A milestone cannot be a root
        assert!(index.insert(None, &milestone(), "Sprint 1").is_err());

        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        // A workstream cannot sit under a workstream
        assert!(index.insert(Some(&dev), &workstream(), "Nested").is_err());
        // An activity cannot skip the milestone level
        assert!(index.insert(Some(&dev), &activity(), "Deep").is_err());
    }

    #[test]
    fn test_apply_leaf_metadata_merges_without_clearing() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();

        let first = LeafMetadata {
            status: Some(ItemStatus::InProgress),
            owner: Some("Dana".to_string()),
            ..Default::default()
        };
        let changes = index.apply_leaf_metadata(&dev, &first).unwrap();
        assert_eq!(changes.len(), 2);

        // An absent input never clears a populated field
        let empty = LeafMetadata::default();
        let changes = index.apply_leaf_metadata(&dev, &empty).unwrap();
        assert!(changes.is_empty());
        let item = index.get(&dev).unwrap();
        assert_eq!(item.get_status(), ItemStatus::InProgress);
        assert_eq!(item.owner.as_deref(), Some("Dana"));

        // A present input replaces the stored value
        let update = LeafMetadata {
            status: Some(ItemStatus::Completed),
            ..Default::default()
        };
        let changes = index.apply_leaf_metadata(&dev, &update).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "status");
        assert_eq!(changes[0].old_value.as_deref(), Some("in_progress"));
        assert_eq!(changes[0].new_value.as_deref(), Some("completed"));
    }

    #[test]
    fn test_apply_leaf_metadata_is_idempotent() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();

        let metadata = LeafMetadata {
            status: Some(ItemStatus::InProgress),
            owner: Some("Dana".to_string()),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6),
            ..Default::default()
        };
        let first = index.apply_leaf_metadata(&dev, &metadata).unwrap();
        assert_eq!(first.len(), 3);
        let second = index.apply_leaf_metadata(&dev, &metadata).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_rename_recomputes_descendant_paths() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let sprint = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let task = index.insert(Some(&sprint), &activity(), "Wire up CI").unwrap();

        let changes = index.rename(&dev, "Platform").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value.as_deref(), Some("Dev"));

        assert_eq!(index.get(&dev).unwrap().path, "Platform");
        assert_eq!(index.get(&sprint).unwrap().path, "Platform > Sprint 1");
        assert_eq!(index.get(&task).unwrap().path, "Platform > Sprint 1 > Wire up CI");
        // Identity follows the new name
        assert!(index.find_child_by_name(None, "platform").is_some());
        assert!(index.find_child_by_name(None, "dev").is_none());
    }

    #[test]
    fn test_reparent_moves_within_same_level() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let ops = index.insert(None, &workstream(), "Ops").unwrap();
        let sprint = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let task = index.insert(Some(&sprint), &activity(), "Wire up CI").unwrap();

        let changes = index.reparent(&sprint, Some(&ops)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "parent_id");

        let moved = index.get(&sprint).unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(ops.as_str()));
        assert_eq!(moved.path, "Ops > Sprint 1");
        assert_eq!(index.get(&task).unwrap().path, "Ops > Sprint 1 > Wire up CI");
        assert!(index.find_child_by_name(Some(&dev), "Sprint 1").is_none());
        assert!(index.find_child_by_name(Some(&ops), "Sprint 1").is_some());
    }

    #[test]
    fn test_reparent_rejects_level_changes() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let ops = index.insert(None, &workstream(), "Ops").unwrap();
        let sprint = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let task = index.insert(Some(&sprint), &activity(), "Wire up CI").unwrap();

        // A milestone cannot become a root
        let err = index.reparent(&sprint, None).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
        // An activity cannot hang directly off a workstream
        let err = index.reparent(&task, Some(&ops)).unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
    }

    #[test]
    fn test_reparent_detects_cycles() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let sprint = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let task = index.insert(Some(&sprint), &activity(), "Wire up CI").unwrap();

        let err = index.reparent(&sprint, Some(&task)).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
        let err = index.reparent(&dev, Some(&dev)).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
    }

    #[test]
    fn test_deactivate_frees_the_sibling_name() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let changes = index.deactivate(&dev).unwrap();
        assert_eq!(changes[0].field, "is_active");

        assert!(index.find_child_by_name(None, "Dev").is_none());
        // The name is reusable once the holder is inactive
        let replacement = index.insert(None, &workstream(), "Dev").unwrap();
        assert_ne!(replacement, dev);
        // Deactivating twice is a no-op
        assert!(index.deactivate(&dev).unwrap().is_empty());
    }

    #[test]
    fn test_to_tree_orders_children_and_hides_inactive() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        let ops = index.insert(None, &workstream(), "Ops").unwrap();
        index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();
        let sprint2 = index.insert(Some(&dev), &milestone(), "Sprint 2").unwrap();
        index.deactivate(&ops).unwrap();
        index.deactivate(&sprint2).unwrap();

        let tree = index.to_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].item.name, "Dev");
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].item.name, "Sprint 1");
    }

    #[test]
    fn test_update_field_appends_notes_with_timestamp() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();

        let changes = index
            .update_field(&dev, ItemField::Notes, Some("Kickoff done"))
            .unwrap();
        assert_eq!(changes.len(), 1);
        let notes = index.get(&dev).unwrap().notes.clone().unwrap();
        assert!(notes.starts_with('['));
        assert!(notes.contains("UTC] Kickoff done"));

        index
            .update_field(&dev, ItemField::Notes, Some("Scope cut"))
            .unwrap();
        let notes = index.get(&dev).unwrap().notes.clone().unwrap();
        assert!(notes.contains("Kickoff done\n\n["));
        assert!(notes.ends_with("Scope cut"));
    }

    #[test]
    fn test_update_field_validates_typed_values() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();

        let err = index
            .update_field(&dev, ItemField::Status, Some("finished"))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidValue { .. }));
        let err = index
            .update_field(&dev, ItemField::StartDate, Some("next week"))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidValue { .. }));
        // Nothing was applied
        let item = index.get(&dev).unwrap();
        assert_eq!(item.get_status(), ItemStatus::NotStarted);
        assert_eq!(item.start_date, None);
    }

    #[test]
    fn test_update_field_sets_and_clears_optional_fields() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();

        index
            .update_field(&dev, ItemField::TargetEndDate, Some("03/31/2025"))
            .unwrap();
        assert_eq!(
            index.get(&dev).unwrap().target_end_date,
            NaiveDate::from_ymd_opt(2025, 3, 31)
        );

        let changes = index
            .update_field(&dev, ItemField::TargetEndDate, None)
            .unwrap();
        assert_eq!(changes[0].old_value.as_deref(), Some("2025-03-31"));
        assert_eq!(changes[0].new_value, None);
        assert_eq!(index.get(&dev).unwrap().target_end_date, None);

        // Same value again is a no-op
        index.update_field(&dev, ItemField::Owner, Some("Ana")).unwrap();
        let changes = index.update_field(&dev, ItemField::Owner, Some("Ana")).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_update_field_renames_through_the_name_rules() {
        let mut index = TreeIndex::new(1);
        let dev = index.insert(None, &workstream(), "Dev").unwrap();
        index.insert(None, &workstream(), "Ops").unwrap();
        let sprint = index.insert(Some(&dev), &milestone(), "Sprint 1").unwrap();

        let err = index
            .update_field(&dev, ItemField::Name, Some("ops"))
            .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateSibling { .. }));
        let err = index.update_field(&dev, ItemField::Name, None).unwrap_err();
        assert!(matches!(err, PlanError::InvalidValue { .. }));

        index
            .update_field(&dev, ItemField::Name, Some("Platform"))
            .unwrap();
        assert_eq!(index.get(&sprint).unwrap().path, "Platform > Sprint 1");
    }
}
