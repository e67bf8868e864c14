use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plan_item_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub plan_item_id: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by_user_id: Option<String>,
    pub changed_by_email: Option<String>,
    pub change_reason: String,
    pub evidence_content_ids: Json, // JSON array of content ids
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plan_items::Entity",
        from = "Column::PlanItemId",
        to = "super::plan_items::Column::Id"
    )]
    PlanItems,
}

impl Related<super::plan_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the evidence content ids attached to this change
    pub fn evidence_ids(&self) -> Vec<String> {
        serde_json::from_value(self.evidence_content_ids.clone()).unwrap_or_default()
    }
}

/// Updatable plan item fields accepted by bulk updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemField {
    Name,
    Status,
    Owner,
    StartDate,
    TargetEndDate,
    ActualEndDate,
    Notes,
}

impl ItemField {
    /// Parse a field name as submitted by callers. Returns None for
    /// fields that are not updatable through the bulk path.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "name" => Some(ItemField::Name),
            "status" => Some(ItemField::Status),
            "owner" => Some(ItemField::Owner),
            "start_date" => Some(ItemField::StartDate),
            "target_end_date" => Some(ItemField::TargetEndDate),
            "actual_end_date" => Some(ItemField::ActualEndDate),
            "notes" => Some(ItemField::Notes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemField::Name => "name",
            ItemField::Status => "status",
            ItemField::Owner => "owner",
            ItemField::StartDate => "start_date",
            ItemField::TargetEndDate => "target_end_date",
            ItemField::ActualEndDate => "actual_end_date",
            ItemField::Notes => "notes",
        }
    }
}

impl From<ItemField> for String {
    fn from(field: ItemField) -> Self {
        field.as_str().to_string()
    }
}

impl std::fmt::Display for ItemField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
