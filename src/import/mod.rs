//! CSV import pipeline: parse rows against the type registry, reconcile them
//! into the plan tree, and build the template users download to get the
//! column contract right.

pub mod parser;
pub mod reconciler;

pub use parser::{parse, ParsedImport, RawRow, METADATA_COLUMNS};
pub use reconciler::{reconcile, ImportSummary, ReconcileOutcome, RowError};

use crate::errors::PlanError;
use crate::registry::TypeRegistry;

/// Build the downloadable import template: the recognized header row plus one
/// example row showing a partial chain with leaf metadata.
pub fn csv_template(registry: &TypeRegistry) -> Result<String, PlanError> {
    let hierarchy = registry.hierarchy_columns();
    let mut header = hierarchy.clone();
    header.extend(METADATA_COLUMNS.iter().map(|column| column.to_string()));

    let example_chain = ["Customer Portal", "Discovery", "Stakeholder interviews"];
    let mut example = vec![String::new(); header.len()];
    for (index, name) in example_chain.iter().take(hierarchy.len()).enumerate() {
        example[index] = name.to_string();
    }
    let metadata_start = hierarchy.len();
    example[metadata_start] = "in_progress".to_string();
    example[metadata_start + 1] = "Jane Doe".to_string();
    example[metadata_start + 2] = "2025-01-06".to_string();
    example[metadata_start + 3] = "2025-01-31".to_string();
    example[metadata_start + 4] = "Kickoff scheduled".to_string();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    writer.write_record(&example)?;
    let bytes = writer
        .into_inner()
        .map_err(|err| PlanError::Validation(format!("csv buffer error: {}", err)))?;
    String::from_utf8(bytes)
        .map_err(|err| PlanError::Validation(format!("csv buffer error: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::entities::item_types;

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

    #[test]
    fn test_template_lists_hierarchy_then_metadata() {
        let registry = TypeRegistry::from_types(
            vec![
                item_type(1, "workstream"),
                item_type(2, "milestone"),
                item_type(3, "activity"),
                item_type(4, "task"),
                item_type(5, "subtask"),
            ],
            vec![],
        )
        .unwrap();

        let template = csv_template(&registry).unwrap();
        let mut lines = template.lines();
        assert_eq!(
            lines.next(),
            Some(
                "workstream,milestone,activity,task,subtask,\
                 status,owner,start_date,target_end_date,notes"
            )
        );
        assert!(lines.next().unwrap().starts_with("Customer Portal,Discovery"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_template_round_trips_through_the_parser() {
        let registry = TypeRegistry::from_types(
            vec![item_type(1, "workstream"), item_type(2, "milestone")],
            vec![],
        )
        .unwrap();

        let template = csv_template(&registry).unwrap();
        let parsed = parse(&registry, &template).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].target_level(), Ok(2));
        assert_eq!(parsed.rows[0].metadata.owner.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_template_follows_custom_type_names() {
        let registry = TypeRegistry::from_types(
            vec![item_type(1, "workstream"), item_type(2, "milestone")],
            vec![item_types::Model {
                id: 10,
                slug: "epic".to_string(),
                name: "Epic".to_string(),
                level: 1,
                organization_id: Some(7),
                is_system: false,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            }],
        )
        .unwrap();

        let template = csv_template(&registry).unwrap();
        assert!(template.starts_with("epic,milestone,"));
    }
}
