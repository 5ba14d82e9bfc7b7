//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means a frame did not fit the grammar. It never
//! says anything about sockets or sessions; those live in other crates.

/// Errors that can occur while parsing a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame does not start with any directive this direction knows.
    #[error("unrecognized frame: {0:?}")]
    Unrecognized(String),

    /// The frame names a known directive but its arguments are malformed.
    #[error("malformed {directive}: {reason}")]
    Malformed {
        /// The directive keyword, e.g. `"To"`.
        directive: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl ProtocolError {
    pub(crate) fn malformed(
        directive: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Malformed {
            directive,
            reason: reason.into(),
        }
    }
}
