use crate::events::{XmlConsumer, XmlEvent};
use crate::pipeline::stage::{Stage, Transformer};
use crate::pipeline::validity::{CacheInfo, Cacheable, Validity};

/// Forwards every event unchanged
pub struct IdentityTransformer {
    cache: CacheInfo,
}

impl IdentityTransformer {
    pub fn new() -> Self {
        IdentityTransformer {
            cache: CacheInfo::new("identity", Validity::Always),
        }
    }
}

impl Default for IdentityTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for IdentityTransformer {
    fn name(&self) -> &str {
        "identity"
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        Some(&self.cache)
    }
}

impl Transformer for IdentityTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        next.event(event)
    }
}
