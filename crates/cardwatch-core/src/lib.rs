pub mod canonical;
pub mod config;
pub mod record;
pub mod rotation;

pub use canonical::{canonicalize, lookup_path, values_equal, FieldPath};
pub use config::{ConfigError, PipelineConfig};
pub use record::{
    AppliedChange, AppliedChangeSet, ChangeProposal, Confidence, Evidence, Record, RecordChanges,
};
pub use rotation::{day_index, select, CoveragePool, Selection};
