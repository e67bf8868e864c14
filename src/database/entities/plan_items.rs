use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Separator between ancestor names in the materialized `path` column.
pub const PATH_SEPARATOR: &str = " > ";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plan_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub project_id: i32,
    pub parent_id: Option<String>,
    pub item_type_id: i32,
    pub name: String,
    pub status: String,
    pub owner: Option<String>,
    pub start_date: Option<ChronoDate>,
    pub target_end_date: Option<ChronoDate>,
    pub actual_end_date: Option<ChronoDate>,
    pub notes: Option<String>,
    pub path: String, // ancestor name chain including self, joined by PATH_SEPARATOR
    pub depth: i32,   // number of ancestors, 0 for roots
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id"
    )]
    Projects,
    #[sea_orm(
        belongs_to = "super::item_types::Entity",
        from = "Column::ItemTypeId",
        to = "super::item_types::Column::Id"
    )]
    ItemTypes,
    #[sea_orm(belongs_to = "Entity", from = "Column::ParentId", to = "Column::Id")]
    Parent,
    #[sea_orm(has_many = "super::plan_item_history::Entity")]
    PlanItemHistory,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl Related<super::item_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItemTypes.def()
    }
}

impl Related<super::plan_item_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanItemHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the status as an enum
    pub fn get_status(&self) -> ItemStatus {
        ItemStatus::from(self.status.clone())
    }

    /// Check if this is a root item (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    NotStarted,
    InProgress,
    Completed,
    OnHold,
    Cancelled,
}

impl ItemStatus {
    /// Strict parse, normalizing case and treating spaces/hyphens as underscores.
    /// Returns None for values outside the status enum.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "not_started" => Some(ItemStatus::NotStarted),
            "in_progress" => Some(ItemStatus::InProgress),
            "completed" => Some(ItemStatus::Completed),
            "on_hold" => Some(ItemStatus::OnHold),
            "cancelled" => Some(ItemStatus::Cancelled),
            _ => None,
        }
    }
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::NotStarted
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::NotStarted => "not_started".to_string(),
            ItemStatus::InProgress => "in_progress".to_string(),
            ItemStatus::Completed => "completed".to_string(),
            ItemStatus::OnHold => "on_hold".to_string(),
            ItemStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

impl From<String> for ItemStatus {
    fn from(status: String) -> Self {
        ItemStatus::parse(&status).unwrap_or(ItemStatus::NotStarted)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(*self))
    }
}

/// Parse a date cell in either `YYYY-MM-DD` or `MM/DD/YYYY` form.
pub fn parse_plan_date(value: &str) -> Option<ChronoDate> {
    let trimmed = value.trim();
    ChronoDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| ChronoDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}
