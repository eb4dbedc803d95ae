use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Source(#[from] igloo_common::Error),

    #[error("Bundle task did not complete")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
