//! Item type management for organizations.
//!
//! The system type chain is seeded once and shared by every tenant;
//! organizations overlay their own definitions on top of it. Any mutation
//! must leave the organization's effective chain contiguous from level 1,
//! and a type's level is frozen once plan items reference it.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::info;

use crate::database::entities::{item_types, organizations, plan_items};
use crate::errors::{PlanError, PlanResult};
use crate::registry::TypeRegistry;

/// Service for managing organization item type chains.
#[derive(Clone)]
pub struct TypeRegistryService {
    db: DatabaseConnection,
}

impl TypeRegistryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The effective type chain for an organization, in rank order.
    pub async fn list_item_types(
        &self,
        organization_id: Option<i32>,
    ) -> PlanResult<Vec<item_types::Model>> {
        let registry = TypeRegistry::load(&self.db, organization_id).await?;
        Ok(registry.types().cloned().collect())
    }

    /// Define an organization-specific item type.
    pub async fn create_item_type(
        &self,
        organization_id: i32,
        slug: &str,
        name: &str,
        level: i32,
    ) -> PlanResult<item_types::Model> {
        let slug = slug.trim().to_lowercase();
        if slug.is_empty() {
            return Err(PlanError::Validation(
                "item type slug must not be empty".to_string(),
            ));
        }

        organizations::Entity::find_by_id(organization_id)
            .one(&self.db)
            .await?
            .ok_or(PlanError::OrganizationNotFound(organization_id))?;

        let org_types = self.org_types(organization_id).await?;
        if org_types
            .iter()
            .any(|existing| existing.slug.eq_ignore_ascii_case(&slug) || existing.level == level)
        {
            return Err(PlanError::Validation(format!(
                "organization {} already defines a type for slug '{}' or level {}",
                organization_id, slug, level
            )));
        }

        let now = Utc::now();
        let candidate = item_types::Model {
            id: 0,
            slug: slug.clone(),
            name: name.trim().to_string(),
            level,
            organization_id: Some(organization_id),
            is_system: false,
            created_at: now,
            updated_at: now,
        };
        let mut chain = org_types;
        chain.push(candidate);
        self.check_chain(chain).await?;

        let created = item_types::ActiveModel {
            slug: Set(slug.clone()),
            name: Set(name.trim().to_string()),
            level: Set(level),
            organization_id: Set(Some(organization_id)),
            is_system: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(
            "Created item type '{}' at level {} for organization {}",
            created.slug, created.level, organization_id
        );
        Ok(created)
    }

    /// Rename a type, or move its level while nothing references it.
    pub async fn update_item_type(
        &self,
        item_type_id: i32,
        name: Option<&str>,
        level: Option<i32>,
    ) -> PlanResult<item_types::Model> {
        let existing = item_types::Entity::find_by_id(item_type_id)
            .one(&self.db)
            .await?
            .ok_or(PlanError::ItemTypeNotFound(item_type_id))?;
        if existing.is_system {
            return Err(PlanError::Validation(
                "system item types cannot be modified".to_string(),
            ));
        }

        if let Some(new_level) = level {
            if new_level != existing.level {
                let in_use = self.items_using(item_type_id).await?;
                if in_use > 0 {
                    return Err(PlanError::Validation(format!(
                        "item type '{}' is referenced by {} items and cannot change level",
                        existing.slug, in_use
                    )));
                }
                if let Some(organization_id) = existing.organization_id {
                    let mut chain = self.org_types(organization_id).await?;
                    for entry in &mut chain {
                        if entry.id == item_type_id {
                            entry.level = new_level;
                        }
                    }
                    self.check_chain(chain).await?;
                }
            }
        }

        let mut active: item_types::ActiveModel = existing.into();
        if let Some(name) = name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(new_level) = level {
            active.level = Set(new_level);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Remove an unreferenced organization type.
    pub async fn delete_item_type(&self, item_type_id: i32) -> PlanResult<()> {
        let existing = item_types::Entity::find_by_id(item_type_id)
            .one(&self.db)
            .await?
            .ok_or(PlanError::ItemTypeNotFound(item_type_id))?;
        if existing.is_system {
            return Err(PlanError::Validation(
                "system item types cannot be deleted".to_string(),
            ));
        }

        let in_use = self.items_using(item_type_id).await?;
        if in_use > 0 {
            return Err(PlanError::Validation(format!(
                "item type '{}' is referenced by {} items and cannot be deleted",
                existing.slug, in_use
            )));
        }
        if let Some(organization_id) = existing.organization_id {
            let mut chain = self.org_types(organization_id).await?;
            chain.retain(|entry| entry.id != item_type_id);
            self.check_chain(chain).await?;
        }

        item_types::Entity::delete_by_id(item_type_id)
            .exec(&self.db)
            .await?;

        info!("Deleted item type '{}' ({})", existing.slug, item_type_id);
        Ok(())
    }

    async fn org_types(&self, organization_id: i32) -> PlanResult<Vec<item_types::Model>> {
        Ok(item_types::Entity::find()
            .filter(item_types::Column::OrganizationId.eq(organization_id))
            .order_by_asc(item_types::Column::Level)
            .all(&self.db)
            .await?)
    }

    async fn items_using(&self, item_type_id: i32) -> PlanResult<u64> {
        Ok(plan_items::Entity::find()
            .filter(plan_items::Column::ItemTypeId.eq(item_type_id))
            .count(&self.db)
            .await?)
    }

    /// Verify that a hypothetical org type set still overlays the system
    /// chain into a contiguous sequence from level 1.
    async fn check_chain(&self, org_types: Vec<item_types::Model>) -> PlanResult<()> {
        let system_types = item_types::Entity::find()
            .filter(item_types::Column::IsSystem.eq(true))
            .order_by_asc(item_types::Column::Level)
            .all(&self.db)
            .await?;
        TypeRegistry::from_types(system_types, org_types).map(|_| ())
    }
}
