use crate::events::{XmlConsumer, XmlEvent};
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Stage, Transformer};
use crate::pipeline::validity::{CacheInfo, Cacheable, Validity};
use anyhow::{anyhow, Context};
use regex::Regex;

/// Drops elements whose qualified name matches `element`, subtree included
pub struct StripTransformer {
    pattern: Option<Regex>,
    // Open elements inside the subtree being dropped
    depth: usize,
    stripped: usize,
    cache: Option<CacheInfo>,
}

impl StripTransformer {
    pub fn new() -> Self {
        StripTransformer {
            pattern: None,
            depth: 0,
            stripped: 0,
            cache: None,
        }
    }

    /// Elements dropped since setup
    pub fn stripped(&self) -> usize {
        self.stripped
    }
}

impl Default for StripTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for StripTransformer {
    fn name(&self) -> &str {
        "strip"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let element = ctx
            .parameters
            .get("element")
            .ok_or_else(|| anyhow!("missing required parameter 'element'"))?;
        let pattern = Regex::new(&format!("^(?:{})$", element))
            .with_context(|| format!("invalid 'element' pattern '{}'", element))?;

        self.pattern = Some(pattern);
        self.depth = 0;
        self.stripped = 0;
        self.cache = Some(CacheInfo::new(element, Validity::Always));
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

impl Transformer for StripTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        if self.depth > 0 {
            match &event {
                XmlEvent::StartElement { .. } => self.depth += 1,
                XmlEvent::EndElement { .. } => self.depth -= 1,
                _ => {}
            }
            return Ok(());
        }

        if let (XmlEvent::StartElement { name, .. }, Some(pattern)) = (&event, &self.pattern) {
            if pattern.is_match(&name.qualified()) {
                self.depth = 1;
                self.stripped += 1;
                return Ok(());
            }
        }
        next.event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBuffer;
    use crate::pipeline::context::Parameters;

    #[test]
    fn test_strips_matching_subtrees() {
        let parameters = Parameters::new().with("element", "secret|draft");
        let request = Parameters::new();
        let mut transformer = StripTransformer::new();
        transformer
            .setup(&SetupContext {
                source: None,
                parameters: &parameters,
                request: &request,
                notification: None,
            })
            .unwrap();

        let input = vec![
            XmlEvent::start("doc"),
            XmlEvent::start("secret"),
            XmlEvent::start("secret"),
            XmlEvent::text("hidden"),
            XmlEvent::end("secret"),
            XmlEvent::end("secret"),
            XmlEvent::start("secrets"),
            XmlEvent::end("secrets"),
            XmlEvent::start("draft"),
            XmlEvent::end("draft"),
            XmlEvent::end("doc"),
        ];
        let mut out = EventBuffer::new();
        for event in input {
            transformer.transform(event, &mut out).unwrap();
        }

        assert_eq!(
            out.events(),
            &[
                XmlEvent::start("doc"),
                XmlEvent::start("secrets"),
                XmlEvent::end("secrets"),
                XmlEvent::end("doc"),
            ]
        );
        assert_eq!(transformer.stripped(), 2);
    }
}
