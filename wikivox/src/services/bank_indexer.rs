//! Bank descriptor indexing
//!
//! The XML bank descriptor lists media entries with a sequential index
//! (`ix="…"`) followed by a short-id field (`ty="sid" … va="…"`). The
//! decoded waveform filename carries only the positional index, while the
//! event JSON carries only the short id; this mapping is the bridge.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Bank indexing errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error while reading the descriptor
    #[error("I/O error reading bank descriptor: {0}")]
    Io(#[from] std::io::Error),
}

/// Mapping short-id -> sequential index for one spoken language
#[derive(Debug, Clone, Default)]
pub struct BankIndex {
    entries: HashMap<String, u32>,
}

impl BankIndex {
    /// Parse one XML bank descriptor, line by line.
    ///
    /// Binding rule: the most recently seen `ix` value is associated with
    /// the next observed `sid` value. Later observations of the same short
    /// id overwrite earlier ones. A missing file yields an empty index,
    /// which callers treat as "this language unavailable".
    pub fn from_xml(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            debug!(path = %path.display(), "Bank descriptor absent, language unavailable");
            return Ok(Self::default());
        }

        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut entries = HashMap::new();
        let mut pending_index: Option<u32> = None;

        for line in reader.lines() {
            let line = line?;
            if let Some(ix) = scan_attr(&line, "ix=\"") {
                if let Ok(value) = ix.parse::<u32>() {
                    pending_index = Some(value);
                }
            }
            if line.contains("ty=\"sid\"") {
                if let (Some(sid), Some(index)) = (scan_attr(&line, "va=\""), pending_index) {
                    entries.insert(sid.to_string(), index);
                }
            }
        }

        debug!(path = %path.display(), entries = entries.len(), "Indexed bank descriptor");
        Ok(Self { entries })
    }

    pub fn from_entries(entries: HashMap<String, u32>) -> Self {
        Self { entries }
    }

    /// Sequential index of a short id, rendered the way waveform file names
    /// carry it: zero-padded 4-digit decimal.
    pub fn lookup(&self, short_id: &str) -> Option<String> {
        self.entries.get(short_id).map(|ix| format!("{:04}", ix))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Value of the first `<marker><digits>"` attribute occurrence on a line
fn scan_attr<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_descriptor(lines: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cn_banks.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn binds_latest_ix_to_next_sid() {
        let (_dir, path) = write_descriptor(&[
            r#"<object name="media" ix="42">"#,
            r#"  <field ty="sid" name="id" va="1234567890"/>"#,
            r#"<object name="media" ix="43">"#,
            r#"  <field ty="tid" name="other" va="99"/>"#,
            r#"  <field ty="sid" name="id" va="555"/>"#,
        ]);
        let index = BankIndex::from_xml(&path).unwrap();
        assert_eq!(index.lookup("1234567890").as_deref(), Some("0042"));
        assert_eq!(index.lookup("555").as_deref(), Some("0043"));
        assert_eq!(index.lookup("0"), None);
    }

    #[test]
    fn later_observation_overwrites() {
        let (_dir, path) = write_descriptor(&[
            r#"<o ix="1"><f ty="sid" va="777"/>"#,
            r#"<o ix="9"><f ty="sid" va="777"/>"#,
        ]);
        let index = BankIndex::from_xml(&path).unwrap();
        assert_eq!(index.lookup("777").as_deref(), Some("0009"));
    }

    #[test]
    fn missing_file_is_empty_index() {
        let index = BankIndex::from_xml(Path::new("/nonexistent/banks.xml")).unwrap();
        assert!(index.is_empty());
    }
}
