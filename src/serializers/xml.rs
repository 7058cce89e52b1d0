// src/serializers/xml.rs
use crate::events::{Attributes, QName, XmlEvent};
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Serializer, Stage};
use anyhow::bail;
use std::io::Write;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Writes the event stream as XML markup
///
/// Elements without content are collapsed to `<name/>`. The stream is checked
/// for well-formedness as it goes: end tags must match their start tags and
/// every element must be closed at the end of the document.
pub struct XmlSerializer {
    omit_declaration: bool,
    set_content_length: bool,
    open: Vec<String>,
    // A start tag was written without its closing `>`
    tag_pending: bool,
    mappings: Vec<(String, String)>,
    in_cdata: bool,
}

impl XmlSerializer {
    pub fn new() -> Self {
        XmlSerializer {
            omit_declaration: false,
            set_content_length: false,
            open: Vec::new(),
            tag_pending: false,
            mappings: Vec::new(),
            in_cdata: false,
        }
    }

    fn reset(&mut self) {
        self.open.clear();
        self.tag_pending = false;
        self.mappings.clear();
        self.in_cdata = false;
    }

    fn close_pending(&mut self, output: &mut dyn Write) -> anyhow::Result<()> {
        if self.tag_pending {
            output.write_all(b">")?;
            self.tag_pending = false;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attributes: &Attributes, output: &mut dyn Write) -> anyhow::Result<()> {
        self.close_pending(output)?;
        let qualified = name.qualified();
        write!(output, "<{}", qualified)?;
        for (prefix, uri) in self.mappings.drain(..) {
            if prefix.is_empty() {
                write!(output, " xmlns=\"{}\"", escape(&uri, true))?;
            } else {
                write!(output, " xmlns:{}=\"{}\"", prefix, escape(&uri, true))?;
            }
        }
        for attribute in attributes.iter() {
            write!(output, " {}=\"{}\"", attribute.name.qualified(), escape(&attribute.value, true))?;
        }
        self.open.push(qualified);
        self.tag_pending = true;
        Ok(())
    }

    fn end_element(&mut self, name: &QName, output: &mut dyn Write) -> anyhow::Result<()> {
        let qualified = name.qualified();
        match self.open.pop() {
            Some(open) if open == qualified => {}
            Some(open) => bail!("end tag </{}> does not match open element <{}>", qualified, open),
            None => bail!("end tag </{}> without open element", qualified),
        }
        if self.tag_pending {
            output.write_all(b"/>")?;
            self.tag_pending = false;
        } else {
            write!(output, "</{}>", qualified)?;
        }
        Ok(())
    }

    fn characters(&mut self, text: &str, output: &mut dyn Write) -> anyhow::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.close_pending(output)?;
        if self.in_cdata {
            output.write_all(text.replace("]]>", "]]]]><![CDATA[>").as_bytes())?;
        } else {
            output.write_all(escape(text, false).as_bytes())?;
        }
        Ok(())
    }
}

impl Default for XmlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            '\n' if attribute => escaped.push_str("&#10;"),
            '\t' if attribute => escaped.push_str("&#9;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl Stage for XmlSerializer {
    fn name(&self) -> &str {
        "xml"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let encoding = ctx.parameters.get_or("encoding", "UTF-8");
        if !encoding.eq_ignore_ascii_case("UTF-8") {
            bail!("unsupported encoding '{}', only UTF-8 is written", encoding);
        }
        self.omit_declaration = ctx.parameters.get_bool("omit-xml-declaration", false)?;
        self.set_content_length = ctx.parameters.get_bool("set-content-length", false)?;
        self.reset();
        Ok(())
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        *self = Self::new();
        Ok(())
    }
}

impl Serializer for XmlSerializer {
    fn mime_type(&self) -> &str {
        "text/xml"
    }

    fn should_set_content_length(&self) -> bool {
        self.set_content_length
    }

    fn serialize(&mut self, event: XmlEvent, output: &mut dyn Write) -> anyhow::Result<()> {
        match event {
            XmlEvent::StartDocument => {
                self.reset();
                if !self.omit_declaration {
                    output.write_all(DECLARATION.as_bytes())?;
                }
            }
            XmlEvent::EndDocument => {
                if let Some(open) = self.open.last() {
                    bail!("document ended with <{}> still open", open);
                }
                output.flush()?;
            }
            XmlEvent::StartPrefixMapping { prefix, uri } => self.mappings.push((prefix, uri)),
            XmlEvent::EndPrefixMapping { .. } => {}
            XmlEvent::StartElement { name, attributes } => self.start_element(&name, &attributes, output)?,
            XmlEvent::EndElement { name } => self.end_element(&name, output)?,
            XmlEvent::Characters(text) | XmlEvent::IgnorableWhitespace(text) => self.characters(&text, output)?,
            XmlEvent::ProcessingInstruction { target, data } => {
                self.close_pending(output)?;
                if data.is_empty() {
                    write!(output, "<?{}?>", target)?;
                } else {
                    write!(output, "<?{} {}?>", target, data)?;
                }
            }
            XmlEvent::Comment(text) => {
                self.close_pending(output)?;
                write!(output, "<!--{}-->", text.replace("--", "- -"))?;
            }
            XmlEvent::StartCData => {
                self.close_pending(output)?;
                output.write_all(b"<![CDATA[")?;
                self.in_cdata = true;
            }
            XmlEvent::EndCData => {
                if !self.in_cdata {
                    bail!("end of CDATA section without start");
                }
                output.write_all(b"]]>")?;
                self.in_cdata = false;
            }
        }
        Ok(())
    }
}
