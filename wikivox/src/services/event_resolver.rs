//! Audio-event resolution
//!
//! Four-stage lookup chain: event JSON -> required bank + short id ->
//! bank index -> positional index -> waveform file. The result is a pure
//! function of (event file, bank index, waveform catalog).

use crate::models::EventDescriptor;
use crate::services::bank_indexer::BankIndex;
use crate::services::waveform_library::WaveformCatalog;
use std::path::PathBuf;
use tracing::debug;
use wikivox_common::RootLayout;

/// Resolves event names to concrete waveform files for one spoken language
pub struct EventResolver<'a> {
    layout: &'a RootLayout,
    index: &'a BankIndex,
    waveforms: &'a WaveformCatalog,
}

impl<'a> EventResolver<'a> {
    pub fn new(layout: &'a RootLayout, index: &'a BankIndex, waveforms: &'a WaveformCatalog) -> Self {
        Self {
            layout,
            index,
            waveforms,
        }
    }

    /// Locate the decoded waveform for an event name.
    ///
    /// Returns `None` when the event JSON is absent, the short id is not in
    /// this language's bank index, or no catalogued file carries the index.
    /// All three are recoverable: the caller records a missing localization.
    pub fn resolve(&self, event: &str) -> Option<PathBuf> {
        let event_path = self.layout.audio_event_file(event);
        let content = std::fs::read_to_string(&event_path).ok()?;
        let descriptor: EventDescriptor = match serde_json::from_str(&content) {
            Ok(d) => d,
            Err(e) => {
                debug!(event, error = %e, "Malformed event descriptor");
                return None;
            }
        };

        let bank = descriptor.required_bank.bank_name()?;
        let index = self.index.lookup(&descriptor.short_id.to_string())?;
        let needle = format!("-{}-", index);

        self.waveforms
            .files(bank)
            .iter()
            .find(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
    }
}
