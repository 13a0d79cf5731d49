//! Core configuration management types.

mod builder;
mod manager;
mod record;
mod scope;
mod settings;

pub use builder::ConfigManagerBuilder;
pub use manager::ConfigManager;
pub use record::ChangeRecord;
pub use scope::{KeyLayout, ScopeTag};
pub use settings::{DuplicatePolicy, ManagerSettings};
