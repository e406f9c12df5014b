pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cluster api error: {message}")]
    Api { message: String },

    #[error("invalid upid: {upid}")]
    InvalidUpid { upid: String },
}
