pub mod export;
pub mod types;

pub use export::{render, write_summary};
pub use types::{ExportFormat, Report};
