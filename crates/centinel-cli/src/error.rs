use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] centinel_config::ConfigError),
    #[error("configuration invalid:\n{0}")]
    Validation(#[from] centinel_core::ValidationErrors),
    #[error(transparent)]
    Dispatch(#[from] centinel_dispatch::DispatchError),
    #[error(transparent)]
    Persistence(#[from] centinel_dispatch::PersistenceError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
