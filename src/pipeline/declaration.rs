use crate::error::{ConfigurationError, Location};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::Parameters;
use crate::pipeline::error_handler::DeclaredErrorHandler;
use crate::pipeline::processing::ProcessingPipeline;
use crate::pipeline::registry::StageRegistry;
use crate::pipeline::stage::{StageDeclaration, StageRole};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::sync::Arc;

/// A pipeline as written in a YAML declaration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PipelineDeclaration {
    #[serde(default)]
    pub generator: Option<StageSpec>,
    #[serde(default)]
    pub transformers: Vec<StageSpec>,
    #[serde(default)]
    pub serializer: Option<StageSpec>,
    /// Pipeline rendering failures of this one
    #[serde(default)]
    pub error: Option<Box<PipelineDeclaration>>,
    #[serde(skip)]
    uri: String,
    #[serde(skip)]
    scope: String,
}

/// One stage entry of a declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StageSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default, deserialize_with = "scalar_parameters")]
    pub parameters: Parameters,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Bool(b) => b.to_string(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

// Parameter values may be written unquoted (`indent: true`, `limit: 10`)
fn scalar_parameters<'de, D>(deserializer: D) -> Result<Parameters, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name, value.into_string()))
        .collect())
}

impl StageSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        StageSpec {
            kind: kind.into(),
            src: None,
            parameters: Parameters::new(),
            mime_type: None,
        }
    }

    fn declaration(&self, role: StageRole, location: Location) -> Result<StageDeclaration, ConfigurationError> {
        if self.mime_type.is_some() && role != StageRole::Serializer {
            return Err(ConfigurationError::InvalidDeclaration {
                message: format!("mime-type is only allowed on serializers, not on {} '{}'", role, self.kind),
                location: Some(location),
            });
        }
        let mut declaration = StageDeclaration::new(&self.kind)
            .parameters(self.parameters.clone())
            .located(location);
        declaration.source = self.src.clone();
        declaration.mime_type = self.mime_type.clone();
        Ok(declaration)
    }
}

impl PipelineDeclaration {
    pub fn from_yaml_str(yaml: &str, uri: &str) -> Result<Self, ConfigurationError> {
        let mut declaration: PipelineDeclaration =
            serde_yaml::from_str(yaml).map_err(|e| syntax_error(e, uri))?;
        declaration.place(uri, "");
        Ok(declaration)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml, &path.display().to_string())
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn place(&mut self, uri: &str, scope: &str) {
        self.uri = uri.to_string();
        self.scope = scope.to_string();
        if let Some(error) = self.error.as_mut() {
            error.place(uri, &format!("{}error/", scope));
        }
    }

    /// Uri plus path inside the declaration; serde_yaml gives no line for deserialized values
    fn location(&self, path: &str) -> Location {
        Location::new(&self.uri).described(format!("{}{}", self.scope, path))
    }

    /// Look up every declared stage and build a pipeline from them
    pub fn assemble(
        &self,
        registry: Arc<StageRegistry>,
        config: PipelineConfig,
    ) -> Result<ProcessingPipeline, ConfigurationError> {
        let mut pipeline = ProcessingPipeline::new(Arc::clone(&registry), config.clone());

        if let Some(spec) = &self.generator {
            pipeline.set_generator(spec.declaration(StageRole::Generator, self.location("generator"))?)?;
        }
        for (index, spec) in self.transformers.iter().enumerate() {
            let location = self.location(&format!("transformers[{}]", index));
            pipeline.add_transformer(spec.declaration(StageRole::Transformer, location)?)?;
        }
        if let Some(spec) = &self.serializer {
            pipeline.set_serializer(spec.declaration(StageRole::Serializer, self.location("serializer"))?)?;
        }
        if let Some(error) = &self.error {
            let handler = DeclaredErrorHandler::new(registry, (**error).clone(), config);
            pipeline.set_error_handler(Box::new(handler));
        }

        Ok(pipeline)
    }
}

fn syntax_error(err: serde_yaml::Error, uri: &str) -> ConfigurationError {
    let mut location = Location::new(uri);
    if let Some(position) = err.location() {
        location = location.at(position.line(), position.column());
    }
    ConfigurationError::Syntax {
        message: err.to_string(),
        location,
    }
}
