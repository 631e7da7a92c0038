pub mod aggregator;
pub mod analytics;
pub mod artifacts;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod fuzzy_matcher;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod taxonomy;
pub mod time;
pub mod types;

pub use cleaner::{CleanedRecord, CleanedTable, TableCleaner};
pub use config::{PipelineConfig, SourceKind, SourceSpec};
pub use error::{PipelineError, Result};
pub use pipeline::PipelineRunner;
pub use report::{RunReport, StageLog, StageStatus};
pub use resolver::{EntityResolver, NameMapping, ReviewEntry};
pub use types::{CanonicalEntity, EntityKey, Granularity};
