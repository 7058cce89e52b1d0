use crate::error::ProcessingError;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::declaration::PipelineDeclaration;
use crate::pipeline::processing::ProcessingPipeline;
use crate::pipeline::registry::StageRegistry;
use std::error::Error as _;
use std::sync::Arc;

/// Builds a replacement pipeline from a failure
pub trait ErrorHandler: Send {
    /// `Ok(None)` declines; the original failure then reaches the caller.
    fn prepare_error_pipeline(
        &mut self,
        error: &ProcessingError,
    ) -> Result<Option<ProcessingPipeline>, ProcessingError>;
}

impl<F> ErrorHandler for F
where
    F: FnMut(&ProcessingError) -> Result<Option<ProcessingPipeline>, ProcessingError> + Send,
{
    fn prepare_error_pipeline(
        &mut self,
        error: &ProcessingError,
    ) -> Result<Option<ProcessingPipeline>, ProcessingError> {
        self(error)
    }
}

/// A failure as seen by an error pipeline's stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Innermost cause
    pub description: String,
    /// Every cause, outermost first
    pub causes: Vec<String>,
    /// Declaration of the failing stage, if known
    pub location: Option<String>,
}

impl Notification {
    pub fn from_error(error: &ProcessingError) -> Self {
        let title = match error {
            ProcessingError::Setup { .. } => "Pipeline setup failed",
            ProcessingError::Execution { .. } => "Pipeline execution failed",
            ProcessingError::Configuration(_) => "Pipeline configuration error",
            _ => "Pipeline failed",
        };

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let location = match error {
            ProcessingError::Setup { location, .. } => location.as_ref().map(|l| l.to_string()),
            ProcessingError::Configuration(config) => config.location().map(|l| l.to_string()),
            _ => None,
        };

        Notification {
            kind: "error".to_string(),
            title: title.to_string(),
            message: error.to_string(),
            description: causes.last().cloned().unwrap_or_else(|| error.to_string()),
            causes,
            location,
        }
    }
}

/// Error handler that assembles a declared error pipeline for every failure
pub struct DeclaredErrorHandler {
    registry: Arc<StageRegistry>,
    declaration: PipelineDeclaration,
    config: PipelineConfig,
}

impl DeclaredErrorHandler {
    pub fn new(
        registry: Arc<StageRegistry>,
        declaration: PipelineDeclaration,
        config: PipelineConfig,
    ) -> Self {
        DeclaredErrorHandler {
            registry,
            declaration,
            config,
        }
    }
}

impl ErrorHandler for DeclaredErrorHandler {
    fn prepare_error_pipeline(
        &mut self,
        error: &ProcessingError,
    ) -> Result<Option<ProcessingPipeline>, ProcessingError> {
        tracing::debug!("assembling declared error pipeline for: {}", error);
        let pipeline = self
            .declaration
            .assemble(Arc::clone(&self.registry), self.config.clone())?;
        Ok(Some(pipeline))
    }
}
