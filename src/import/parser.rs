//! CSV parsing for plan imports.
//!
//! Turns raw CSV text into typed rows against a [`TypeRegistry`]: hierarchy
//! columns are matched to item-type slugs, metadata columns to the fixed
//! metadata set, and everything else is kept verbatim as extra data. Parsing
//! never touches the database, so previews and dry runs are cheap.

use csv::ReaderBuilder;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::database::entities::plan_items::{parse_plan_date, ItemStatus};
use crate::errors::PlanError;
use crate::registry::TypeRegistry;
use crate::tree::LeafMetadata;

/// Metadata columns recognized next to the hierarchy columns, in template order.
pub const METADATA_COLUMNS: [&str; 5] =
    ["status", "owner", "start_date", "target_end_date", "notes"];

/// One data row of an import file, resolved against the registry columns.
#[derive(Debug, Clone, Serialize)]
pub struct RawRow {
    /// 1-based data row number, header excluded.
    pub row: usize,
    /// Hierarchy cells indexed by level rank. `None` is an empty cell or a
    /// column the file does not carry.
    pub levels: Vec<Option<String>>,
    /// Metadata for the deepest filled cell of this row.
    pub metadata: LeafMetadata,
    /// Unrecognized columns, preserved verbatim.
    pub extra: IndexMap<String, String>,
    /// Non-fatal oddities, e.g. an invalid status that was defaulted.
    pub warnings: Vec<String>,
    /// Set when the row cannot be applied at all.
    pub error: Option<String>,
}

impl RawRow {
    /// Level rank of the deepest filled hierarchy cell.
    ///
    /// Errors when no hierarchy cell is filled, or when a cell is filled
    /// below an empty one and the chain of ancestors is ambiguous.
    pub fn target_level(&self) -> Result<i32, String> {
        let deepest = match self.levels.iter().rposition(Option::is_some) {
            Some(index) => index,
            None => return Err("row has no hierarchy data".to_string()),
        };
        for (index, cell) in self.levels[..deepest].iter().enumerate() {
            if cell.is_none() {
                return Err(format!(
                    "gap in hierarchy: level {} is empty but level {} is filled",
                    index + 1,
                    deepest + 1
                ));
            }
        }
        Ok(deepest as i32 + 1)
    }
}

/// Parse result shared by preview and import.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedImport {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Row-level errors, one line per broken row.
    pub errors: Vec<String>,
}

/// Where each recognized column sits in the record.
#[derive(Debug)]
struct ColumnMap {
    levels: Vec<Option<usize>>,
    status: Option<usize>,
    owner: Option<usize>,
    start_date: Option<usize>,
    target_end_date: Option<usize>,
    notes: Option<usize>,
    extra: Vec<(usize, String)>,
}

/// Parse CSV text into rows resolved against the registry's columns.
///
/// Fails only when the input is unreadable or no hierarchy column is present;
/// per-row problems are reported on the rows themselves.
pub fn parse(registry: &TypeRegistry, csv_text: &str) -> Result<ParsedImport, PlanError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();
    let columns = map_columns(registry, &headers);

    if columns.levels.iter().all(Option::is_none) {
        return Err(PlanError::MissingColumn(format!(
            "at least one hierarchy column ({})",
            registry.hierarchy_columns().join(", ")
        )));
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = index + 1;

        if record.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Skipping blank row {}", row_number);
            continue;
        }

        let row = parse_row(&columns, &record, row_number);
        if let Some(error) = &row.error {
            errors.push(format!("Row {}: {}", row_number, error));
        }
        rows.push(row);
    }

    debug!(
        "Parsed {} rows ({} with errors) against {} hierarchy columns",
        rows.len(),
        errors.len(),
        columns.levels.iter().flatten().count()
    );
    Ok(ParsedImport {
        headers,
        rows,
        errors,
    })
}

/// Match headers against registry slugs and the metadata set. First occurrence
/// wins; duplicates and unknown headers land in `extra`.
fn map_columns(registry: &TypeRegistry, headers: &[String]) -> ColumnMap {
    let mut columns = ColumnMap {
        levels: vec![None; registry.max_level().max(0) as usize],
        status: None,
        owner: None,
        start_date: None,
        target_end_date: None,
        notes: None,
        extra: Vec::new(),
    };

    for (index, header) in headers.iter().enumerate() {
        if let Some(level) = registry.level_for_column(header) {
            let slot = &mut columns.levels[(level - 1) as usize];
            if slot.is_none() {
                *slot = Some(index);
                continue;
            }
        } else {
            let recognized = match header.to_lowercase().as_str() {
                "status" if columns.status.is_none() => {
                    columns.status = Some(index);
                    true
                }
                "owner" if columns.owner.is_none() => {
                    columns.owner = Some(index);
                    true
                }
                "start_date" if columns.start_date.is_none() => {
                    columns.start_date = Some(index);
                    true
                }
                "target_end_date" if columns.target_end_date.is_none() => {
                    columns.target_end_date = Some(index);
                    true
                }
                "notes" if columns.notes.is_none() => {
                    columns.notes = Some(index);
                    true
                }
                _ => false,
            };
            if recognized {
                continue;
            }
        }
        columns.extra.push((index, header.clone()));
    }
    columns
}

fn parse_row(columns: &ColumnMap, record: &csv::StringRecord, row_number: usize) -> RawRow {
    let mut warnings = Vec::new();
    let mut row_errors = Vec::new();

    let levels: Vec<Option<String>> = columns
        .levels
        .iter()
        .map(|index| cell_value(record, *index))
        .collect();

    let mut metadata = LeafMetadata::default();
    if let Some(value) = cell_value(record, columns.status) {
        match ItemStatus::parse(&value) {
            Some(status) => metadata.status = Some(status),
            None => {
                warnings.push(format!(
                    "invalid status '{}', defaulting to not_started",
                    value
                ));
                metadata.status = Some(ItemStatus::NotStarted);
            }
        }
    }
    metadata.owner = cell_value(record, columns.owner);
    if let Some(value) = cell_value(record, columns.start_date) {
        match parse_plan_date(&value) {
            Some(date) => metadata.start_date = Some(date),
            None => row_errors.push(format!(
                "invalid start_date '{}' (expected YYYY-MM-DD or MM/DD/YYYY)",
                value
            )),
        }
    }
    if let Some(value) = cell_value(record, columns.target_end_date) {
        match parse_plan_date(&value) {
            Some(date) => metadata.target_end_date = Some(date),
            None => row_errors.push(format!(
                "invalid target_end_date '{}' (expected YYYY-MM-DD or MM/DD/YYYY)",
                value
            )),
        }
    }
    metadata.notes = cell_value(record, columns.notes);

    let mut extra = IndexMap::new();
    for (index, name) in &columns.extra {
        if let Some(value) = cell_value(record, Some(*index)) {
            extra.insert(name.clone(), value);
        }
    }

    let mut row = RawRow {
        row: row_number,
        levels,
        metadata,
        extra,
        warnings,
        error: None,
    };
    if let Err(error) = row.target_level() {
        row_errors.insert(0, error);
    }
    if !row_errors.is_empty() {
        row.error = Some(row_errors.join("; "));
    }
    row
}

fn cell_value(record: &csv::StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
