use crate::events::{Attributes, XmlConsumer, XmlEvent};
use crate::generators::{check_element_name, is_element_name, FileSource};
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Generator, Stage};
use crate::pipeline::validity::{CacheInfo, Cacheable};
use anyhow::{anyhow, Context};
use serde_json::Value;

/// Turns a JSON file into an element tree
///
/// Objects become elements named after their keys (keys that are not valid
/// names become `<entry key="...">`), array items become `<item>` children,
/// scalars become text and `null` produces an empty element.
pub struct JsonGenerator {
    source: Option<FileSource>,
    root: String,
    cache: Option<CacheInfo>,
}

impl JsonGenerator {
    pub fn new() -> Self {
        JsonGenerator {
            source: None,
            root: "document".to_string(),
            cache: None,
        }
    }

    fn emit_value(&self, value: &Value, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Bool(b) => consumer.event(XmlEvent::text(b.to_string())),
            Value::Number(n) => consumer.event(XmlEvent::text(n.to_string())),
            Value::String(s) => consumer.event(XmlEvent::text(s.as_str())),
            Value::Array(items) => {
                for item in items {
                    self.emit_element("item", Attributes::new(), item, consumer)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                for (key, item) in map {
                    if is_element_name(key) {
                        self.emit_element(key, Attributes::new(), item, consumer)?;
                    } else {
                        self.emit_element("entry", Attributes::new().with("key", key.as_str()), item, consumer)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn emit_element(
        &self,
        name: &str,
        attributes: Attributes,
        value: &Value,
        consumer: &mut dyn XmlConsumer,
    ) -> anyhow::Result<()> {
        consumer.event(XmlEvent::start_with(name, attributes))?;
        self.emit_value(value, consumer)?;
        consumer.event(XmlEvent::end(name))
    }
}

impl Default for JsonGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for JsonGenerator {
    fn name(&self) -> &str {
        "json"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let source = FileSource::open(ctx.require_source()?)?;
        let root = ctx.parameters.get_or("root", "document");
        check_element_name("root", root)?;

        self.root = root.to_string();
        self.cache = Some(source.cache_info());
        self.source = Some(source);
        Ok(())
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        self.cache.as_ref().map(|cache| cache as &dyn Cacheable)
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        *self = Self::new();
        Ok(())
    }
}

impl Generator for JsonGenerator {
    fn generate(&mut self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("json generator used before setup"))?;
        let text = source.read()?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in '{}'", source.path.display()))?;

        consumer.event(XmlEvent::StartDocument)?;
        self.emit_element(&self.root, Attributes::new(), &value, consumer)?;
        consumer.event(XmlEvent::EndDocument)
    }
}
