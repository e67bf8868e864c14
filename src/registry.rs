use std::collections::{BTreeMap, HashMap};

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::database::entities::item_types;
use crate::errors::PlanError;

/// Effective item type set for one organization: the system types overlaid
/// with the organization's own definitions. Carries no global state, callers
/// load one per operation and pass it down.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_level: BTreeMap<i32, item_types::Model>,
    by_slug: HashMap<String, item_types::Model>,
}

impl TypeRegistry {
    pub async fn load<C>(db: &C, organization_id: Option<i32>) -> Result<Self, PlanError>
    where
        C: ConnectionTrait,
    {
        let system_types = item_types::Entity::find()
            .filter(item_types::Column::IsSystem.eq(true))
            .order_by_asc(item_types::Column::Level)
            .all(db)
            .await?;

        let org_types = match organization_id {
            Some(org_id) => {
                item_types::Entity::find()
                    .filter(item_types::Column::OrganizationId.eq(org_id))
                    .order_by_asc(item_types::Column::Level)
                    .all(db)
                    .await?
            }
            None => Vec::new(),
        };

        Self::from_types(system_types, org_types)
    }

    /// Build a registry from already loaded types. An organization type
    /// shadows any system type sharing its slug or its level.
    pub fn from_types(
        system_types: Vec<item_types::Model>,
        org_types: Vec<item_types::Model>,
    ) -> Result<Self, PlanError> {
        let mut by_level: BTreeMap<i32, item_types::Model> = BTreeMap::new();
        for item_type in system_types {
            by_level.insert(item_type.level, item_type);
        }
        for item_type in org_types {
            by_level.retain(|_, existing| !existing.slug.eq_ignore_ascii_case(&item_type.slug));
            by_level.insert(item_type.level, item_type);
        }

        if by_level.is_empty() {
            return Err(PlanError::Validation("no item types configured".to_string()));
        }

        // The effective level chain must be contiguous starting at 1
        for (position, level) in by_level.keys().enumerate() {
            if *level != position as i32 + 1 {
                return Err(PlanError::Validation(format!(
                    "item type levels must form a contiguous chain starting at 1, no type covers level {}",
                    position as i32 + 1
                )));
            }
        }

        let by_slug = by_level
            .values()
            .map(|item_type| (item_type.slug.to_lowercase(), item_type.clone()))
            .collect();

        Ok(TypeRegistry { by_level, by_slug })
    }

    /// Resolve the item type for a hierarchy level.
    pub fn resolve_type(&self, level: i32) -> Result<&item_types::Model, PlanError> {
        self.by_level.get(&level).ok_or(PlanError::LevelNotFound(level))
    }

    /// Resolve an item type by slug, case-insensitive.
    pub fn resolve_slug(&self, slug: &str) -> Option<&item_types::Model> {
        self.by_slug.get(&slug.trim().to_lowercase())
    }

    /// Map a column name to a hierarchy level, if it names one.
    pub fn level_for_column(&self, column: &str) -> Option<i32> {
        self.resolve_slug(column).map(|item_type| item_type.level)
    }

    /// Column names for the hierarchy levels, in rank order.
    pub fn hierarchy_columns(&self) -> Vec<String> {
        self.by_level
            .values()
            .map(|item_type| item_type.slug.clone())
            .collect()
    }

    pub fn max_level(&self) -> i32 {
        self.by_level.keys().next_back().copied().unwrap_or(0)
    }

    pub fn types(&self) -> impl Iterator<Item = &item_types::Model> {
        self.by_level.values()
    }
}
