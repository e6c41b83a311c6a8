use cachegrab_engine::GrabError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Grab(#[from] GrabError),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
