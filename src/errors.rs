//! Plan tree error types
//!
//! This module provides structured error types for plan tree operations,
//! including item management, CSV import, and bulk updates.
//!
//! # Examples
//!
//! ```rust
//! use plantree::errors::PlanError;
//!
//! // Create a not found error
//! let err = PlanError::ProjectNotFound(42);
//!
//! // Create a validation error
//! let err = PlanError::Validation("Metadata is only allowed on leaf items".to_string());
//!
//! // Create a cycle detection error
//! let err = PlanError::CycleDetected("Sprint 1 -> Dev -> Sprint 1".to_string());
//! ```

#![allow(dead_code)]

use thiserror::Error;

/// Plan tree operation errors
#[derive(Error, Debug)]
pub enum PlanError {
    /// Organization not found by ID
    #[error("Organization {0} not found")]
    OrganizationNotFound(i32),

    /// Project not found by ID
    #[error("Project {0} not found")]
    ProjectNotFound(i32),

    /// Plan item not found by ID
    #[error("Plan item '{0}' not found")]
    ItemNotFound(String),

    /// Item type not found by ID
    #[error("Item type {0} not found")]
    ItemTypeNotFound(i32),

    /// No item type registered for a hierarchy level
    #[error("No item type registered for level {0}")]
    LevelNotFound(i32),

    /// Sibling name collision under the same parent
    #[error("An item named '{name}' already exists under {parent}")]
    DuplicateSibling {
        /// Conflicting item name
        name: String,
        /// Parent description (item name or "the project root")
        parent: String,
    },

    /// Unknown field in a bulk update request
    #[error("Unknown updatable field: {0}")]
    InvalidField(String),

    /// Value rejected for a bulk update field
    #[error("Invalid value '{value}' for field {field}")]
    InvalidValue {
        /// Field the value was submitted for
        field: String,
        /// Rejected raw value
        value: String,
    },

    /// Cycle detected while moving an item
    #[error("Cycle detected in plan tree: {0}")]
    CycleDetected(String),

    /// Required CSV column missing
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// CSV parsing/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl PlanError {
    /// Check if this is a client error (400-series)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PlanError::DuplicateSibling { .. }
                | PlanError::InvalidField(_)
                | PlanError::InvalidValue { .. }
                | PlanError::CycleDetected(_)
                | PlanError::MissingColumn(_)
                | PlanError::Validation(_)
                | PlanError::Csv(_)
        )
    }

    /// Check if this is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PlanError::OrganizationNotFound(_)
                | PlanError::ProjectNotFound(_)
                | PlanError::ItemNotFound(_)
                | PlanError::ItemTypeNotFound(_)
                | PlanError::LevelNotFound(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PlanError::OrganizationNotFound(_)
            | PlanError::ProjectNotFound(_)
            | PlanError::ItemNotFound(_)
            | PlanError::ItemTypeNotFound(_)
            | PlanError::LevelNotFound(_) => "NOT_FOUND",
            PlanError::DuplicateSibling { .. } => "CONFLICT",
            PlanError::InvalidField(_)
            | PlanError::InvalidValue { .. }
            | PlanError::MissingColumn(_)
            | PlanError::Validation(_) => "VALIDATION_FAILED",
            PlanError::CycleDetected(_) => "CYCLE_DETECTED",
            PlanError::Csv(_) => "CSV_ERROR",
            PlanError::Serialization(_) => "SERIALIZATION_ERROR",
            PlanError::Database(_) => "DATABASE_ERROR",
        }
    }
}

/// Result type for plan tree operations
pub type PlanResult<T> = Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_not_found() {
        let err = PlanError::ProjectNotFound(42);
        assert_eq!(err.to_string(), "Project 42 not found");
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_duplicate_sibling() {
        let err = PlanError::DuplicateSibling {
            name: "Sprint 1".to_string(),
            parent: "'Dev'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "An item named 'Sprint 1' already exists under 'Dev'"
        );
        assert!(err.is_client_error());
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_invalid_value() {
        let err = PlanError::InvalidValue {
            field: "target_date".to_string(),
            value: "soon".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value 'soon' for field target_date");
        assert!(err.is_client_error());
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_cycle_detected() {
        let err = PlanError::CycleDetected("Dev -> Sprint 1 -> Dev".to_string());
        assert_eq!(
            err.to_string(),
            "Cycle detected in plan tree: Dev -> Sprint 1 -> Dev"
        );
        assert!(err.is_client_error());
        assert_eq!(err.error_code(), "CYCLE_DETECTED");
    }

    #[test]
    fn test_level_not_found() {
        let err = PlanError::LevelNotFound(4);
        assert_eq!(err.to_string(), "No item type registered for level 4");
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
