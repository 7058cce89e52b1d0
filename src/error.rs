use crate::pipeline::stage::StageRole;
use std::fmt;

/// Where a stage was declared, so an operator can find it in a large configuration tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    /// Path inside the declaration, e.g. `pipeline/transformers[1]`
    pub description: Option<String>,
}

impl Location {
    pub fn new(uri: impl Into<String>) -> Self {
        Location {
            uri: uri.into(),
            line: None,
            column: None,
            description: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(column) = self.column {
                write!(f, ":{}", column)?;
            }
        }
        if let Some(description) = &self.description {
            write!(f, " ({})", description)?;
        }
        Ok(())
    }
}

fn located(location: &Option<Location>) -> String {
    match location {
        Some(location) => format!(" at {}", location),
        None => String::new(),
    }
}

/// Errors raised while a pipeline is being assembled
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Duplicate {role} '{kind}' (already set: '{existing}'){}", located(.location))]
    DuplicateStage {
        role: StageRole,
        kind: String,
        existing: String,
        location: Option<Location>,
    },

    #[error("Unknown {role} '{kind}'{}", located(.location))]
    UnknownStage {
        role: StageRole,
        kind: String,
        location: Option<Location>,
    },

    #[error("Invalid declaration: {message}{}", located(.location))]
    InvalidDeclaration {
        message: String,
        location: Option<Location>,
    },

    #[error("Syntax error in {location}: {message}")]
    Syntax { message: String, location: Location },

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl ConfigurationError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            ConfigurationError::DuplicateStage { location, .. }
            | ConfigurationError::UnknownStage { location, .. }
            | ConfigurationError::InvalidDeclaration { location, .. } => location.as_ref(),
            ConfigurationError::Syntax { location, .. } => Some(location),
            ConfigurationError::FileNotFound(_) => None,
        }
    }
}

/// Errors raised while preparing or executing a pipeline
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Duplicate preparePipeline call")]
    DuplicatePrepare,

    #[error("Failed to set up {role} '{kind}'{}: {source}", located(.location))]
    Setup {
        role: StageRole,
        kind: String,
        location: Option<Location>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to execute pipeline.")]
    Execution {
        #[source]
        source: anyhow::Error,
    },

    #[error("Attempted to process incomplete pipeline: {0}")]
    IncompletePipeline(String),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl ProcessingError {
    /// Convert a stage failure, keeping errors that already are processing errors intact
    pub fn from_stage(err: anyhow::Error) -> Self {
        match err.downcast::<ProcessingError>() {
            Ok(processing) => processing,
            Err(other) => ProcessingError::Execution { source: other },
        }
    }

    pub fn is_setup(&self) -> bool {
        matches!(self, ProcessingError::Setup { .. })
    }
}

impl From<std::io::Error> for ProcessingError {
    fn from(err: std::io::Error) -> Self {
        ProcessingError::Execution { source: err.into() }
    }
}
