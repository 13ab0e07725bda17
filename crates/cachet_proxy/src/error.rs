#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Rejected before any I/O (bad origin URL, unbuildable request).
    #[error("invalid forward input: {0}")]
    InvalidInput(String),

    /// Connect failure, transport error or timeout while talking to the origin.
    #[error("origin unreachable: {0}")]
    OriginUnreachable(String),

    /// The origin answered but its body could not be read in full.
    #[error("failed to read origin response body: {0}")]
    BodyRead(String),
}
