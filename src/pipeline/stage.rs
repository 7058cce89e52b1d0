use crate::error::{Location, ProcessingError};
use crate::events::{XmlConsumer, XmlEvent};
use crate::pipeline::context::{Parameters, SetupContext};
use crate::pipeline::error_handler::Notification;
use crate::pipeline::validity::Cacheable;
use std::fmt;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    Generator,
    Transformer,
    Serializer,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageRole::Generator => "generator",
            StageRole::Transformer => "transformer",
            StageRole::Serializer => "serializer",
        })
    }
}

/// Common lifecycle of every pipeline stage
pub trait Stage: Send {
    fn name(&self) -> &str;

    /// Called once per execution, before any event flows
    fn setup(&mut self, _ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Caching capability; `None` makes the whole event pipeline uncacheable
    fn cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }

    /// Clear per-execution state before the instance goes back to the registry
    fn recycle(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Origin of the event stream
pub trait Generator: Stage {
    fn generate(&mut self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()>;
}

/// In-stream filter: receives each event and forwards whatever it wants to `next`
pub trait Transformer: Stage {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()>;
}

/// Sink of the event stream, rendering events to bytes
pub trait Serializer: Stage {
    fn mime_type(&self) -> &str;

    /// Whether the whole output must be measured before it is sent
    fn should_set_content_length(&self) -> bool {
        false
    }

    fn serialize(&mut self, event: XmlEvent, output: &mut dyn Write) -> anyhow::Result<()>;
}

/// How a stage was requested: kind, source, parameters and where it was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDeclaration {
    pub kind: String,
    pub source: Option<String>,
    pub parameters: Parameters,
    /// Only meaningful for serializers
    pub mime_type: Option<String>,
    pub location: Option<Location>,
}

impl StageDeclaration {
    pub fn new(kind: impl Into<String>) -> Self {
        StageDeclaration {
            kind: kind.into(),
            source: None,
            parameters: Parameters::new(),
            mime_type: None,
            location: None,
        }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name, value);
        self
    }

    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn located(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// A leased stage instance together with its declaration
pub struct StageInstance<T: ?Sized> {
    pub role: StageRole,
    pub declaration: StageDeclaration,
    pub instance: Box<T>,
}

impl<T: ?Sized + Stage> StageInstance<T> {
    pub(crate) fn setup(
        &mut self,
        request: &Parameters,
        notification: Option<&Notification>,
    ) -> Result<(), ProcessingError> {
        let resolved = self.resolve(request).and_then(|(source, parameters)| {
            let ctx = SetupContext {
                source: source.as_deref(),
                parameters: &parameters,
                request,
                notification,
            };
            self.instance.setup(&ctx)
        });
        resolved.map_err(|source| ProcessingError::Setup {
            role: self.role,
            kind: self.declaration.kind.clone(),
            location: self.declaration.location.clone(),
            source,
        })
    }

    fn resolve(&self, request: &Parameters) -> anyhow::Result<(Option<String>, Parameters)> {
        let source = match &self.declaration.source {
            Some(source) => Some(request.resolve(source)?),
            None => None,
        };
        let parameters = self.declaration.parameters.resolve_all(request)?;
        Ok((source, parameters))
    }
}
