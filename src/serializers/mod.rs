pub mod text;
pub mod xml;

pub use self::text::TextSerializer;
pub use self::xml::XmlSerializer;
