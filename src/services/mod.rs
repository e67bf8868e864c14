pub mod plan_item_service;
pub mod type_registry_service;

pub use plan_item_service::*;
pub use type_registry_service::*;
