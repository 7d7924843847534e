/// Errors raised by the tile renderer before any work is submitted.
///
/// A frame either validates fully and is submitted, or one of these is
/// returned and nothing reaches the GPU.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("out of range: requested {requested}, available {available}")]
    OutOfRange { requested: u64, available: u64 },
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("{0} has edits that were not uploaded")]
    NotUploaded(&'static str),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
}
