use thiserror::Error;

/// Config/bootstrap errors — ambient, not part of the §7 taxonomy proper.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors raised by [`crate::settings::Settings`], [`crate::filters::FilterManager`],
/// and [`crate::gid::Gid`] parsing — the `ValidationError`, `PermissionError`, and
/// `InfraError` kinds of spec §7 that originate below the bulk/REST client layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad user input. Report; no retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing OAuth scope, raised during preflight. Report; no retry.
    #[error("permission error: missing scope(s) {0:?}")]
    Permission(Vec<String>),

    /// File/IO failures at utility boundaries. Report; no retry.
    #[error("infra error: {0}")]
    Infra(String),
}

impl CoreError {
    #[must_use]
    pub fn truncated_message(&self) -> String {
        const MAX_LEN: usize = 2048;
        let msg = self.to_string();
        if msg.len() > MAX_LEN {
            format!("{}...", &msg[..MAX_LEN])
        } else {
            msg
        }
    }
}
