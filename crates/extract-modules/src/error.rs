use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Client(#[from] extract_client::ClientError),
    #[error(transparent)]
    Store(#[from] extract_store::StoreError),
    #[error(transparent)]
    Core(#[from] extract_core::CoreError),
    #[error("parse error in module {module}: {reason}")]
    Parse { module: &'static str, reason: String },
}

/// Per-module pull counters (spec §4.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct PullStats {
    pub products: u64,
    pub variants: u64,
    pub pages: u64,
    pub warnings: u64,
    pub errors: u64,
}
