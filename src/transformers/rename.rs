use crate::events::{QName, XmlConsumer, XmlEvent};
use crate::generators::is_element_name;
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Stage, Transformer};
use crate::pipeline::validity::{CacheInfo, Cacheable, Validity};
use anyhow::{anyhow, bail, Context};
use regex::Regex;

/// Renames elements whose local name matches `from`, using `to` as the
/// replacement (`$1` style group references allowed)
pub struct RenameTransformer {
    pattern: Option<Regex>,
    replacement: String,
    cache: Option<CacheInfo>,
}

impl RenameTransformer {
    pub fn new() -> Self {
        RenameTransformer {
            pattern: None,
            replacement: String::new(),
            cache: None,
        }
    }

    fn rename(&self, name: QName) -> anyhow::Result<QName> {
        let pattern = match &self.pattern {
            Some(pattern) if pattern.is_match(&name.local_name) => pattern,
            _ => return Ok(name),
        };
        let renamed = pattern
            .replace_all(&name.local_name, self.replacement.as_str())
            .into_owned();
        if !is_element_name(&renamed) {
            bail!("renaming '{}' produced an invalid element name '{}'", name, renamed);
        }
        Ok(QName {
            prefix: name.prefix,
            local_name: renamed,
        })
    }
}

impl Default for RenameTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for RenameTransformer {
    fn name(&self) -> &str {
        "rename"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let from = ctx
            .parameters
            .get("from")
            .ok_or_else(|| anyhow!("missing required parameter 'from'"))?;
        let to = ctx
            .parameters
            .get("to")
            .ok_or_else(|| anyhow!("missing required parameter 'to'"))?;
        let pattern = Regex::new(from).with_context(|| format!("invalid 'from' pattern '{}'", from))?;

        self.pattern = Some(pattern);
        self.replacement = to.to_string();
        self.cache = Some(CacheInfo::new(format!("{}->{}", from, to), Validity::Always));
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

impl Transformer for RenameTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        let event = match event {
            XmlEvent::StartElement { name, attributes } => XmlEvent::StartElement {
                name: self.rename(name)?,
                attributes,
            },
            XmlEvent::EndElement { name } => XmlEvent::EndElement {
                name: self.rename(name)?,
            },
            other => other,
        };
        next.event(event)
    }
}
