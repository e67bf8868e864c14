pub mod database;
pub mod errors;
pub mod import;
pub mod registry;
pub mod services;
pub mod tree;
