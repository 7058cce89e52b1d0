// src/events.rs
use std::fmt;

/// A possibly prefixed element or attribute name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QName {
    pub fn new(local_name: impl Into<String>) -> Self {
        QName {
            prefix: None,
            local_name: local_name.into(),
        }
    }

    pub fn prefixed(prefix: impl Into<String>, local_name: impl Into<String>) -> Self {
        QName {
            prefix: Some(prefix.into()),
            local_name: local_name.into(),
        }
    }

    /// The name as written in markup (`prefix:local` or `local`)
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, self.local_name),
            _ => self.local_name.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

impl From<&str> for QName {
    fn from(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) => QName::prefixed(prefix, local),
            None => QName::new(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

/// Attributes of a start tag, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Attributes(Vec::new())
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set an attribute, replacing an existing one with the same name
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = QName::from(name);
        let value = value.into();
        match self.0.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Attribute { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = QName::from(name);
        self.0
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One structured document event
///
/// Producers must emit events in well-formed order: the document events
/// bracket everything and every element start has a matching end in LIFO order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartDocument,
    EndDocument,
    StartPrefixMapping { prefix: String, uri: String },
    EndPrefixMapping { prefix: String },
    StartElement { name: QName, attributes: Attributes },
    EndElement { name: QName },
    Characters(String),
    IgnorableWhitespace(String),
    ProcessingInstruction { target: String, data: String },
    Comment(String),
    StartCData,
    EndCData,
}

impl XmlEvent {
    pub fn start(name: &str) -> Self {
        XmlEvent::StartElement {
            name: QName::from(name),
            attributes: Attributes::new(),
        }
    }

    pub fn start_with(name: &str, attributes: Attributes) -> Self {
        XmlEvent::StartElement {
            name: QName::from(name),
            attributes,
        }
    }

    pub fn end(name: &str) -> Self {
        XmlEvent::EndElement {
            name: QName::from(name),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        XmlEvent::Characters(text.into())
    }
}

/// Receives a document event stream
pub trait XmlConsumer {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()>;
}

impl<C: XmlConsumer + ?Sized> XmlConsumer for &mut C {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()> {
        (**self).event(event)
    }
}

/// Consumer that drops every event
#[derive(Debug, Default)]
pub struct NullConsumer;

impl XmlConsumer for NullConsumer {
    fn event(&mut self, _event: XmlEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records events so they can be replayed into another consumer later
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<XmlEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        EventBuffer { events: Vec::new() }
    }

    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Send the recorded events to `consumer`, keeping the buffer
    pub fn replay(&self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        for event in &self.events {
            consumer.event(event.clone())?;
        }
        Ok(())
    }

    /// Send the recorded events to `consumer`, consuming the buffer
    pub fn drain_into(self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        for event in self.events {
            consumer.event(event)?;
        }
        Ok(())
    }
}

impl XmlConsumer for EventBuffer {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()> {
        self.events.push(event);
        Ok(())
    }
}
