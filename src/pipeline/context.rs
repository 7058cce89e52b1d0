use crate::pipeline::error_handler::Notification;
use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::time::Duration;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder pattern is valid"));

/// Ordered string parameters, used both for stage configuration and request values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(IndexMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Parameters(IndexMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Read a boolean parameter, accepting true/false, yes/no and 1/0
    pub fn get_bool(&self, name: &str, default: bool) -> anyhow::Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => match value.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                other => bail!("parameter '{}' must be a boolean, got '{}'", name, other),
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute `{name}` placeholders in `template` with values from `self`
    ///
    /// Names start with a letter or underscore, so regex repetitions like
    /// `{2}` or `{1,3}` pass through untouched.
    pub fn resolve(&self, template: &str) -> anyhow::Result<String> {
        let mut resolved = String::with_capacity(template.len());
        let mut last = 0;
        for captures in PLACEHOLDER.captures_iter(template) {
            let whole = captures.get(0).ok_or_else(|| anyhow!("empty placeholder match"))?;
            let name = &captures[1];
            let value = self
                .get(name)
                .ok_or_else(|| anyhow!("unknown parameter '{{{}}}' in '{}'", name, template))?;
            resolved.push_str(&template[last..whole.start()]);
            resolved.push_str(value);
            last = whole.end();
        }
        resolved.push_str(&template[last..]);
        Ok(resolved)
    }

    /// Resolve every value against `request`
    pub fn resolve_all(&self, request: &Parameters) -> anyhow::Result<Parameters> {
        let mut resolved = Parameters::new();
        for (name, value) in self.iter() {
            resolved.insert(name, request.resolve(value)?);
        }
        Ok(resolved)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameters(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// The request a pipeline is executed for
pub trait Environment {
    /// Request parameters
    fn parameters(&self) -> &Parameters;
    /// Final byte destination
    fn output(&mut self) -> &mut dyn Write;
    fn set_content_length(&mut self, length: usize);
}

/// Environment over any writer
pub struct Request<W: Write> {
    parameters: Parameters,
    output: W,
    content_length: Option<usize>,
}

impl<W: Write> Request<W> {
    pub fn new(output: W) -> Self {
        Request {
            parameters: Parameters::new(),
            output,
            content_length: None,
        }
    }

    pub fn with_parameters(output: W, parameters: Parameters) -> Self {
        Request {
            parameters,
            output,
            content_length: None,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn get_output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<W: Write> Environment for Request<W> {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn output(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    fn set_content_length(&mut self, length: usize) {
        self.content_length = Some(length);
    }
}

/// What a stage sees during setup
pub struct SetupContext<'a> {
    /// The declared `src`, placeholders resolved
    pub source: Option<&'a str>,
    /// The declared parameters, placeholders resolved
    pub parameters: &'a Parameters,
    pub request: &'a Parameters,
    /// The failure an error pipeline is rendering
    pub notification: Option<&'a Notification>,
}

impl SetupContext<'_> {
    pub fn require_source(&self) -> anyhow::Result<&str> {
        self.source.ok_or_else(|| anyhow!("a 'src' is required"))
    }
}

/// Runtime statistics
#[derive(Debug, Default, Clone)]
pub struct ExecutionStats {
    /// Events delivered to the sink
    pub events: usize,
    pub bytes_written: usize,
    pub processing_time: Duration,
    /// An error pipeline produced the output
    pub substituted: bool,
}
