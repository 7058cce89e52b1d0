// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, bail};
use std::sync::{Arc, Mutex};
use xmlpipe::{
    CacheInfo, Cacheable, Generator, ProcessingError, SetupContext, Stage, StageRegistry, Transformer, Validity,
    XmlConsumer, XmlEvent,
};

/// Shared record of stage lifecycle calls, in order
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// `<a><b/></a>` as a document
pub fn doc_a_b() -> Vec<XmlEvent> {
    vec![
        XmlEvent::StartDocument,
        XmlEvent::start("a"),
        XmlEvent::start("b"),
        XmlEvent::end("b"),
        XmlEvent::end("a"),
        XmlEvent::EndDocument,
    ]
}

/// Emits a fixed event list
///
/// Parameters: `fail-after` (error after N events), `fail-setup`, `key`
/// (makes it cacheable), `label` (journal name).
pub struct ScriptedGenerator {
    events: Vec<XmlEvent>,
    journal: Journal,
    label: String,
    fail_after: Option<usize>,
    cache: Option<CacheInfo>,
}

impl ScriptedGenerator {
    pub fn new(events: Vec<XmlEvent>, journal: Journal) -> Self {
        ScriptedGenerator {
            events,
            journal,
            label: "generator".to_string(),
            fail_after: None,
            cache: None,
        }
    }
}

impl Stage for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        self.label = ctx.parameters.get_or("label", "generator").to_string();
        self.journal.lock().unwrap().push(format!("setup:{}", self.label));
        if ctx.parameters.get_bool("fail-setup", false)? {
            bail!("scripted setup failure");
        }
        self.fail_after = match ctx.parameters.get("fail-after") {
            Some(n) => Some(n.parse()?),
            None => None,
        };
        self.cache = ctx
            .parameters
            .get("key")
            .map(|key| CacheInfo::new(key, Validity::Always));
        Ok(())
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        self.cache.as_ref().map(|cache| cache as &dyn Cacheable)
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(format!("recycle:{}", self.label));
        self.fail_after = None;
        self.cache = None;
        Ok(())
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&mut self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        for (index, event) in self.events.iter().enumerate() {
            if self.fail_after == Some(index) {
                bail!("scripted failure after {} events", index);
            }
            consumer.event(event.clone())?;
        }
        Ok(())
    }
}

/// Forwards events, journaling lifecycle calls and the elements it sees
///
/// Parameters: `label`, `key` (makes it cacheable), `fail-on` (element name
/// that raises a plain error), `raise-on` (element name that raises a
/// `ProcessingError::InvalidState`).
pub struct RecordingTransformer {
    journal: Journal,
    label: String,
    fail_on: Option<String>,
    raise_on: Option<String>,
    cache: Option<CacheInfo>,
}

impl RecordingTransformer {
    pub fn new(journal: Journal) -> Self {
        RecordingTransformer {
            journal,
            label: "transformer".to_string(),
            fail_on: None,
            raise_on: None,
            cache: None,
        }
    }
}

impl Stage for RecordingTransformer {
    fn name(&self) -> &str {
        "recording"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        self.label = ctx.parameters.get_or("label", "transformer").to_string();
        self.journal.lock().unwrap().push(format!("setup:{}", self.label));
        self.fail_on = ctx.parameters.get("fail-on").map(str::to_string);
        self.raise_on = ctx.parameters.get("raise-on").map(str::to_string);
        self.cache = ctx
            .parameters
            .get("key")
            .map(|key| CacheInfo::new(key, Validity::Always));
        Ok(())
    }

    fn cacheable(&self) -> Option<&dyn Cacheable> {
        self.cache.as_ref().map(|cache| cache as &dyn Cacheable)
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push(format!("recycle:{}", self.label));
        Ok(())
    }
}

impl Transformer for RecordingTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        if let XmlEvent::StartElement { name, .. } = &event {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:<{}>", self.label, name));
            if self.fail_on.as_deref() == Some(name.local_name.as_str()) {
                return Err(anyhow!("{} rejected <{}>", self.label, name));
            }
            if self.raise_on.as_deref() == Some(name.local_name.as_str()) {
                return Err(ProcessingError::InvalidState(format!("{} raised", self.label)).into());
            }
        }
        next.event(event)
    }
}

/// A transformer whose release hook always fails
pub struct BrokenRecycleTransformer;

impl Stage for BrokenRecycleTransformer {
    fn name(&self) -> &str {
        "broken-recycle"
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        bail!("cannot recycle")
    }
}

impl Transformer for BrokenRecycleTransformer {
    fn transform(&mut self, event: XmlEvent, next: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        next.event(event)
    }
}

/// Built-in stages plus `scripted`, `error-doc`, `recording` and `broken-recycle`
pub fn registry(journal: &Journal) -> Arc<StageRegistry> {
    let mut registry = StageRegistry::with_builtins();
    let scripted = Arc::clone(journal);
    let error_doc = Arc::clone(journal);
    let recording = Arc::clone(journal);
    registry
        .register_generator("scripted", move || {
            Box::new(ScriptedGenerator::new(doc_a_b(), Arc::clone(&scripted)))
        })
        .register_generator("error-doc", move || {
            let events = vec![
                XmlEvent::StartDocument,
                XmlEvent::start("error"),
                XmlEvent::end("error"),
                XmlEvent::EndDocument,
            ];
            Box::new(ScriptedGenerator::new(events, Arc::clone(&error_doc)))
        })
        .register_transformer("recording", move || {
            Box::new(RecordingTransformer::new(Arc::clone(&recording)))
        })
        .register_transformer("broken-recycle", || Box::new(BrokenRecycleTransformer));
    Arc::new(registry)
}
