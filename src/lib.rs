// src/lib.rs
pub mod error;
pub mod events;
pub mod generators;
pub mod pipeline;
pub mod serializers;
pub mod transformers;

pub use error::*;
pub use pipeline::*;

pub use events::{Attribute, Attributes, EventBuffer, NullConsumer, QName, XmlConsumer, XmlEvent};
pub use generators::{CsvGenerator, JsonGenerator, NotifyingGenerator};
pub use serializers::{TextSerializer, XmlSerializer};
pub use transformers::{IdentityTransformer, LogTransformer, RenameTransformer, StripTransformer};
