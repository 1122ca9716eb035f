use thiserror::Error;

/// Errors raised by the retrieval, answer and diagram stages.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("no API credential configured (set LLM_API_KEY)")]
    MissingCredential,

    #[error("the model service rejected the API credential")]
    Unauthorized,

    #[error("rate limited by the model service")]
    RateLimited,

    #[error("model service error {status}: {body}")]
    Service { status: u16, body: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model output did not match the answer schema: {0}")]
    Schema(String),

    #[error("question is empty")]
    EmptyQuery,

    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("no diagram produced: the model did not call the diagram tool")]
    NoDiagram,

    #[error("model called an unexpected tool: {0}")]
    UnexpectedTool(String),

    #[error("invalid diagram tool arguments: {0}")]
    InvalidToolArguments(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
