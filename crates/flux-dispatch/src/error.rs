use thiserror::Error;

/// Grounded on `everruns_openai`/`everruns_anthropic`'s provider client
/// error enums (wraps `reqwest::Error`, one variant for the server telling
/// us a subject is gone).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("scheduler request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The scheduler answered 410 Gone for a `Process` update — tolerated,
    /// since the remote work simply no longer exists.
    #[error("process no longer exists")]
    Gone,

    #[error("scheduler returned {status}: {body}")]
    Scheduler { status: u16, body: String },
}
