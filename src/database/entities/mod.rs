pub mod organizations;
pub mod projects;
pub mod item_types;
pub mod plan_items;
pub mod plan_item_history;

pub use organizations::*;
pub use projects::*;
pub use item_types::*;
pub use plan_items::*;
pub use plan_item_history::*;
