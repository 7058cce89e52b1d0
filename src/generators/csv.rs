use crate::events::{Attributes, XmlConsumer, XmlEvent};
use crate::generators::{check_element_name, is_element_name, FileSource};
use crate::pipeline::context::SetupContext;
use crate::pipeline::stage::{Generator, Stage};
use crate::pipeline::validity::{CacheInfo, Cacheable};
use anyhow::{anyhow, bail, Context};

/// Turns a CSV file into `<rows><row>...</row></rows>`
///
/// With a header line every cell is an element named after its column,
/// or `<cell name="...">` when the column name is not a valid element name.
/// Without headers cells are plain `<cell>` elements.
pub struct CsvGenerator {
    source: Option<FileSource>,
    delimiter: u8,
    has_headers: bool,
    root: String,
    row: String,
    cache: Option<CacheInfo>,
}

impl CsvGenerator {
    pub fn new() -> Self {
        CsvGenerator {
            source: None,
            delimiter: b',',
            has_headers: true,
            root: "rows".to_string(),
            row: "row".to_string(),
            cache: None,
        }
    }

    fn emit_cell(
        &self,
        column: Option<&str>,
        value: &str,
        consumer: &mut dyn XmlConsumer,
    ) -> anyhow::Result<()> {
        let (name, attributes) = match column {
            Some(column) if is_element_name(column) => (column, Attributes::new()),
            Some(column) => ("cell", Attributes::new().with("name", column)),
            None => ("cell", Attributes::new()),
        };
        consumer.event(XmlEvent::start_with(name, attributes))?;
        if !value.is_empty() {
            consumer.event(XmlEvent::text(value))?;
        }
        consumer.event(XmlEvent::end(name))
    }
}

impl Default for CsvGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_delimiter(value: &str) -> anyhow::Result<u8> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        _ if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        _ => bail!("delimiter must be a single ASCII character, got '{}'", value),
    }
}

impl Stage for CsvGenerator {
    fn name(&self) -> &str {
        "csv"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let source = FileSource::open(ctx.require_source()?)?;
        let root = ctx.parameters.get_or("root", "rows");
        let row = ctx.parameters.get_or("row", "row");
        check_element_name("root", root)?;
        check_element_name("row", row)?;

        self.delimiter = parse_delimiter(ctx.parameters.get_or("delimiter", ","))?;
        self.has_headers = ctx.parameters.get_bool("header", true)?;
        self.root = root.to_string();
        self.row = row.to_string();
        self.cache = Some(source.cache_info());
        self.source = Some(source);
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

impl Generator for CsvGenerator {
    fn generate(&mut self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("csv generator used before setup"))?;
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .from_path(&source.path)
            .with_context(|| format!("cannot read '{}'", source.path.display()))?;

        let headers: Option<Vec<String>> = if self.has_headers {
            let headers = reader
                .headers()
                .with_context(|| format!("invalid CSV header in '{}'", source.path.display()))?;
            Some(headers.iter().map(|h| h.trim().to_string()).collect())
        } else {
            None
        };

        consumer.event(XmlEvent::StartDocument)?;
        consumer.event(XmlEvent::start(&self.root))?;
        for (index, record) in reader.records().enumerate() {
            let record = record.with_context(|| {
                format!("invalid CSV record {} in '{}'", index + 1, source.path.display())
            })?;
            consumer.event(XmlEvent::start(&self.row))?;
            for (position, value) in record.iter().enumerate() {
                let column = headers
                    .as_ref()
                    .and_then(|headers| headers.get(position))
                    .map(|h| h.as_str());
                self.emit_cell(column, value, consumer)?;
            }
            consumer.event(XmlEvent::end(&self.row))?;
        }
        consumer.event(XmlEvent::end(&self.root))?;
        consumer.event(XmlEvent::EndDocument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBuffer;
    use crate::pipeline::context::Parameters;
    use std::io::Write;

    fn generate(content: &str, parameters: Parameters) -> anyhow::Result<Vec<XmlEvent>> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let request = Parameters::new();

        let mut generator = CsvGenerator::new();
        generator.setup(&SetupContext {
            source: Some(&path),
            parameters: &parameters,
            request: &request,
            notification: None,
        })?;
        let mut buffer = EventBuffer::new();
        generator.generate(&mut buffer)?;
        Ok(buffer.events().to_vec())
    }

    #[test]
    fn test_rows_with_headers() {
        let events = generate("name,full name\nalice,Alice A\n", Parameters::new()).unwrap();
        assert_eq!(
            events,
            vec![
                XmlEvent::StartDocument,
                XmlEvent::start("rows"),
                XmlEvent::start("row"),
                XmlEvent::start("name"),
                XmlEvent::text("alice"),
                XmlEvent::end("name"),
                XmlEvent::start_with("cell", Attributes::new().with("name", "full name")),
                XmlEvent::text("Alice A"),
                XmlEvent::end("cell"),
                XmlEvent::end("row"),
                XmlEvent::end("rows"),
                XmlEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn test_rows_without_headers_and_semicolons() {
        let parameters = Parameters::new().with("header", "false").with("delimiter", ";");
        let events = generate("1;2\n", parameters).unwrap();
        let cells = events
            .iter()
            .filter(|e| matches!(e, XmlEvent::StartElement { name, .. } if name.local_name == "cell"))
            .count();
        assert_eq!(cells, 2);
    }

    #[test]
    fn test_ragged_rows_fail() {
        let err = generate("a,b\n1,2,3\n", Parameters::new()).unwrap_err();
        assert!(err.to_string().contains("invalid CSV record 1"), "{}", err);
    }

    #[test]
    fn test_bad_delimiter() {
        assert!(parse_delimiter("::").is_err());
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
    }
}
