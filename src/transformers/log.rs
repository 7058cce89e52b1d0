use crate::events::{XmlConsumer, XmlEvent};
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Stage, Transformer};

/// Forwards events unchanged, logging each one at debug level
pub struct LogTransformer {
    label: String,
    count: usize,
}

impl LogTransformer {
    pub fn new() -> Self {
        LogTransformer {
            label: "log".to_string(),
            count: 0,
        }
    }
}

impl Default for LogTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for LogTransformer {
    fn name(&self) -> &str {
        "log"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        self.label = ctx.parameters.get_or("label", "log").to_string();
        self.count = 0;
        Ok(())
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        if self.count > 0 {
            tracing::debug!(target: "xmlpipe::log", label = %self.label, events = self.count, "stream finished");
        }
        self.count = 0;
        Ok(())
    }
}

impl Transformer for LogTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        self.count += 1;
        tracing::debug!(target: "xmlpipe::log", label = %self.label, seq = self.count, "{:?}", event);
        next.event(event)
    }
}
