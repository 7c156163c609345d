use thiserror::Error;

use extract_client::ClientError;
use extract_core::CoreError;
use extract_modules::ModuleError;
use extract_store::StoreError;

use crate::sink::SinkError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
