//! Decoded-waveform cataloguing
//!
//! Decoded files are named `<bank>-<NNNN>-<suffix>.wav`; the leading token
//! before the first `-` keys the file under its bank. Directory insertion
//! order is retained so the resolver's "first match wins" is stable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Mapping bank name -> ordered waveform paths for one spoken language
#[derive(Debug, Clone, Default)]
pub struct WaveformCatalog {
    banks: HashMap<String, Vec<PathBuf>>,
}

impl WaveformCatalog {
    /// Index one language's decoded-waveform directory. A missing directory
    /// yields an empty catalog.
    pub fn from_dir(dir: &Path) -> Self {
        let mut banks: HashMap<String, Vec<PathBuf>> = HashMap::new();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Waveform directory absent");
            return Self { banks };
        }

        for entry in WalkDir::new(dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let bank = match name.split('-').next() {
                Some(token) if !token.is_empty() => token.to_string(),
                _ => continue,
            };
            banks.entry(bank).or_default().push(entry.into_path());
        }

        debug!(dir = %dir.display(), banks = banks.len(), "Indexed waveform directory");
        Self { banks }
    }

    pub fn from_entries(banks: HashMap<String, Vec<PathBuf>>) -> Self {
        Self { banks }
    }

    /// Files catalogued under one bank, in insertion order
    pub fn files(&self, bank: &str) -> &[PathBuf] {
        self.banks.get(bank).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }
}
