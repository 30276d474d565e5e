use crate::registry::InteractionMode;

/// Why a channel was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The name is empty or contains characters outside `[a-zA-Z0-9._:-]`.
    InvalidName,
    /// The name is well-formed but not in the mode's allow-list.
    NotAllowed,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::InvalidName => f.write_str("invalid channel name"),
            DenyReason::NotAllowed => f.write_str("not in allow-list"),
        }
    }
}

/// Errors raised by the gatekeeper and its transports.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The channel failed the shape or allow-list check.
    #[error("blocked IPC channel for {mode}: {channel} ({reason})")]
    AccessDenied {
        mode: InteractionMode,
        channel: String,
        reason: DenyReason,
    },

    /// No invoke handler is registered on the privileged side.
    #[error("no handler registered for channel {0}")]
    NoHandler(String),

    /// The privileged side failed while handling a call.
    #[error("transport error: {0}")]
    Transport(String),

    /// A registry file could not be loaded.
    #[error("failed to load registry: {0}")]
    LoadFailed(String),

    /// A registry table contains an unusable entry.
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    /// Registry JSON could not be parsed.
    #[error("registry is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl GateError {
    /// True for allow-list and shape rejections, false for ordinary failures.
    pub fn is_access_violation(&self) -> bool {
        matches!(self, GateError::AccessDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
