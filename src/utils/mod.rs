pub mod format;
pub mod format_registry;
