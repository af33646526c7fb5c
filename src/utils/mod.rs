/// Shared helpers
pub mod value;
