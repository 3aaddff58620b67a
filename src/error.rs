use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification error: {0}")]
    Classify(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("{program} failed: {detail}")]
    Encode { program: String, detail: String },

    #[error("Post-processing error: {0}")]
    PostProcess(String),
}

pub type Result<T> = std::result::Result<T, CompressError>;
