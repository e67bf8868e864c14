use anyhow::Result;
use chrono::Utc;
use sea_orm::*;
use tracing::info;

use crate::database::entities::{item_types, organizations, projects};
use crate::services::PlanItemService;

const EXAMPLE_PLAN_CSV: &str = "\
workstream,milestone,activity,task,status,owner,start_date,target_end_date,notes
Design,Brand Refresh,Moodboards,,in_progress,Dana,2025-01-06,2025-01-17,First round shared with stakeholders
Design,Brand Refresh,Logo Variants,,not_started,Dana,2025-01-20,2025-01-31,
Design,Page Templates,Landing Page,Hero Section,in_progress,Priya,2025-02-03,2025-02-07,
Design,Page Templates,Landing Page,Pricing Table,not_started,Priya,2025-02-10,2025-02-14,
Content,Copy Audit,Inventory Existing Pages,,completed,Sam,2025-01-06,2025-01-10,Spreadsheet in shared drive
Content,Copy Audit,Gap Analysis,,in_progress,Sam,2025-01-13,2025-01-24,
Engineering,CMS Migration,Schema Design,,in_progress,Lee,2025-01-06,2025-01-17,
Engineering,CMS Migration,Content Import Scripts,,not_started,Lee,2025-01-20,2025-02-07,
Engineering,Launch Readiness,Load Testing,,not_started,,2025-03-03,2025-03-07,
";

pub async fn create_system_item_types(db: &DatabaseConnection) -> Result<()> {
    // Check if the system type set already exists
    let existing = item_types::Entity::find()
        .filter(item_types::Column::IsSystem.eq(true))
        .one(db)
        .await?;

    if existing.is_some() {
        info!("System item types already exist, skipping seed data creation");
        return Ok(());
    }

    info!("Creating system item types");

    let now = Utc::now();
    let types_data = vec![
        ("workstream", "Workstream", 1),
        ("milestone", "Milestone", 2),
        ("activity", "Activity", 3),
        ("task", "Task", 4),
        ("subtask", "Subtask", 5),
    ];

    let mut type_models = Vec::new();
    let type_count = types_data.len();
    for (slug, name, level) in types_data {
        type_models.push(item_types::ActiveModel {
            slug: Set(slug.to_string()),
            name: Set(name.to_string()),
            level: Set(level),
            organization_id: Set(None),
            is_system: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        });
    }

    item_types::Entity::insert_many(type_models).exec(db).await?;
    info!("Created {} system item types", type_count);
    Ok(())
}

pub async fn create_example_project(db: &DatabaseConnection) -> Result<()> {
    create_system_item_types(db).await?;

    // First check if the example organization already exists
    let existing_org = organizations::Entity::find()
        .filter(organizations::Column::Slug.eq("acme"))
        .one(db)
        .await?;

    if existing_org.is_some() {
        info!("Example organization already exists, skipping seed data creation");
        return Ok(());
    }

    info!("Creating example project: Website Relaunch");

    let now = Utc::now();
    let organization = organizations::ActiveModel {
        name: Set("Acme".to_string()),
        slug: Set("acme".to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let org_result = organizations::Entity::insert(organization).exec(db).await?;
    let organization_id = org_result.last_insert_id;

    let project = projects::ActiveModel {
        organization_id: Set(organization_id),
        name: Set("Website Relaunch".to_string()),
        description: Set(Some(
            "Example project demonstrating a typical plan tree: design, content and engineering workstreams broken down into milestones, activities and tasks.".to_string(),
        )),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let project_result = projects::Entity::insert(project).exec(db).await?;
    let project_id = project_result.last_insert_id;

    info!("Created project with ID: {}", project_id);

    // Seed the plan tree through the regular import path
    let service = PlanItemService::new(db.clone());
    let summary = service
        .import_plan_items(project_id, EXAMPLE_PLAN_CSV, None, None)
        .await?;

    info!(
        "Seeded example plan: {} items created from {} rows",
        summary.items_created, summary.total_rows
    );
    Ok(())
}
