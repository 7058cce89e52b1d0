use crate::events::XmlEvent;
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Serializer, Stage};
use std::io::Write;

/// Writes only character data; markup is dropped
pub struct TextSerializer {
    set_content_length: bool,
}

impl TextSerializer {
    pub fn new() -> Self {
        TextSerializer {
            set_content_length: false,
        }
    }
}

impl Default for TextSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TextSerializer {
    fn name(&self) -> &str {
        "text"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        self.set_content_length = ctx.parameters.get_bool("set-content-length", false)?;
        Ok(())
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        self.set_content_length = false;
        Ok(())
    }
}

impl Serializer for TextSerializer {
    fn mime_type(&self) -> &str {
        "text/plain"
    }

    fn should_set_content_length(&self) -> bool {
        self.set_content_length
    }

    fn serialize(&mut self, event: XmlEvent, output: &mut dyn Write) -> anyhow::Result<()> {
        match event {
            XmlEvent::Characters(text) | XmlEvent::IgnorableWhitespace(text) => {
                output.write_all(text.as_bytes())?;
            }
            XmlEvent::EndDocument => output.flush()?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_text() {
        let mut serializer = TextSerializer::new();
        let mut output = Vec::new();
        for event in [
            XmlEvent::start("p"),
            XmlEvent::text("a & "),
            XmlEvent::start("b"),
            XmlEvent::text("b"),
            XmlEvent::end("b"),
            XmlEvent::end("p"),
        ] {
            serializer.serialize(event, &mut output).unwrap();
        }
        assert_eq!(output, b"a & b");
    }
}
