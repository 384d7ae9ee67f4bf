use thiserror::Error;

/// Reason reported for every failure that the store did not explain itself.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cannot coerce parameter '{parameter}' of module '{module}' (element {element:?}): {source}")]
    Coercion {
        module: String,
        parameter: String,
        element: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{message}")]
    Store { message: String },

    #[error("Store responded with status {status} and no error message")]
    UnrecognizedResponse { status: u16 },

    #[error("Malformed project document: {message}")]
    MalformedDocument { message: String },

    #[error("Unknown module: {name}")]
    UnknownModule { name: String },

    #[error("Module '{module}' has no parameter '{name}'")]
    UnknownParameter { module: String, name: String },

    #[error("Pipeline and handles are out of step: {message}")]
    Lockstep { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

impl ProjectError {
    /// The reason surfaced to callers once the error leaves the gateway.
    pub fn rejection_reason(&self) -> String {
        match self {
            ProjectError::Store { message } => message.clone(),
            ProjectError::Coercion { .. }
            | ProjectError::Yaml(_)
            | ProjectError::MalformedDocument { .. } => self.to_string(),
            _ => UNKNOWN_ERROR_MESSAGE.to_string(),
        }
    }
}

/// A settled gateway failure: one human readable reason, nothing else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl From<ProjectError> for Rejection {
    fn from(err: ProjectError) -> Self {
        Rejection {
            reason: err.rejection_reason(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;
