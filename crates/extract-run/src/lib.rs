//! Run orchestration: preflight, per-module pull dispatch, the
//! product/variant join, and output rendering (spec §4.10-§4.15).

pub mod error;
pub mod manager;
pub mod preflight;
pub mod sink;
pub mod template;

pub use error::RunError;
pub use manager::{RunManager, RunStage};
pub use preflight::PreflightResult;
pub use sink::{RowFormat, RowSink, SinkError};
pub use template::OutputTemplate;
