//! Storage layer: one YAML file per card, patched in place with text surgery.

mod emit;
mod error;
mod files;
pub mod patch;

pub use emit::{emit_field, render_scalar, BlockStyle, QuoteStyle};
pub use error::{PatchError, StoreError};
pub use files::RecordStore;
pub use patch::{apply, apply_change, FieldShape, PatchOutcome, SkippedChange};
