use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("entry too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}
