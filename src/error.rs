use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] rusqlite::Error),

    #[error("Duplicate job id: {0}")]
    DuplicateJob(String),

    #[error("Unknown job id: {0}")]
    UnknownJob(String),

    #[error("Missing header line in {0}")]
    MissingHeader(String),

    #[error("Data generation error: {0}")]
    Datagen(String),
}

pub type Result<T> = std::result::Result<T, SalesError>;
