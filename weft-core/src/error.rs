use thiserror::Error;

/// Errors a service implementation may report from `init` or its own logic.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad launch parameter: {0}")]
    BadParameter(String),

    #[error("{0}")]
    Other(String),
}

impl From<String> for ServiceError {
    fn from(msg: String) -> Self {
        ServiceError::Other(msg)
    }
}

impl From<&str> for ServiceError {
    fn from(msg: &str) -> Self {
        ServiceError::Other(msg.to_string())
    }
}

/// Errors produced while launching a new service.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("init of module {module} failed: {source}")]
    Init {
        module: String,
        #[source]
        source: ServiceError,
    },
}

/// Errors from the name directory and global-name registration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("name already bound: {0}")]
    Exists(String),

    #[error("global name must not be numeric-only: {0}")]
    Numeric(String),

    #[error("no transport service registered for global name {0}")]
    NoTransport(String),
}

/// Errors from the environment store.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("environment key already set: {0}")]
    Duplicate(String),
}

/// Errors from the socket reactor pass-throughs.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not supported by this reactor")]
    Unsupported,
}
