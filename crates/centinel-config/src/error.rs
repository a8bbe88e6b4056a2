use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid environment override {key}: {message}")]
    Env { key: String, message: String },
    #[error("malformed resource file line {line}: {text}")]
    ResourceLine { line: usize, text: String },
    #[error("resource macro index out of range: ${0}")]
    ResourceIndexOutOfRange(u32),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
