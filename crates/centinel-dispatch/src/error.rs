use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to launch check command: {0}")]
    LaunchFailed(#[from] std::io::Error),
    #[error("check timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("concurrency cap reached, check deferred")]
    CapacityExceeded,
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("perfdata sink io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CommandFileError {
    #[error("command file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("command buffer full, {dropped} command(s) dropped since last drain")]
    BufferFull { dropped: u64 },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("persistence io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DispatchError>;
