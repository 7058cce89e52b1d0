use crate::pipeline::validity::{CacheInfo, Validity};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

pub mod csv;
pub mod json;
pub mod notifying;

pub use self::csv::CsvGenerator;
pub use self::json::JsonGenerator;
pub use self::notifying::NotifyingGenerator;

static ELEMENT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9._\-]*$").expect("element name pattern is valid")
});

/// Whether `name` can be used as an unprefixed element name
pub fn is_element_name(name: &str) -> bool {
    ELEMENT_NAME.is_match(name) && !name.to_ascii_lowercase().starts_with("xml")
}

pub(crate) fn check_element_name(parameter: &str, name: &str) -> anyhow::Result<()> {
    if !is_element_name(name) {
        bail!("parameter '{}' is not a valid element name: '{}'", parameter, name);
    }
    Ok(())
}

/// A file a generator reads, checked during setup
pub(crate) struct FileSource {
    pub path: PathBuf,
    modified: Option<DateTime<Utc>>,
}

impl FileSource {
    pub fn open(src: &str) -> anyhow::Result<Self> {
        let path = PathBuf::from(src);
        let metadata = std::fs::metadata(&path).with_context(|| format!("cannot read '{}'", src))?;
        if !metadata.is_file() {
            bail!("'{}' is not a file", src);
        }
        Ok(FileSource {
            path,
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Key is the resolved path; files without a modification time are never cached
    pub fn cache_info(&self) -> CacheInfo {
        let validity = match self.modified {
            Some(modified) => Validity::Timestamp(modified),
            None => Validity::Never,
        };
        CacheInfo::new(self.path.display().to_string(), validity)
    }

    pub fn read(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read '{}'", self.path.display()))
    }
}
