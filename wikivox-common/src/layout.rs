//! On-disk layout of the game export tree
//!
//! Every path consumed or produced by the pipeline is derived here, so no
//! component hard-codes directory names and workers never collide: each
//! writes only into paths derived from its own language or file input.

use crate::lang::{SpokenLang, UiLang};
use std::path::{Path, PathBuf};

/// Resolved root of the export tree plus derived locations
#[derive(Debug, Clone)]
pub struct RootLayout {
    root: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Central directory holding one XML bank descriptor per spoken language
    pub fn banks_dir(&self) -> PathBuf {
        self.root.join("audio").join("banks")
    }

    /// XML bank descriptor for one spoken language
    pub fn bank_xml(&self, lang: SpokenLang) -> PathBuf {
        self.banks_dir().join(format!("{}.xml", lang.bank_stem()))
    }

    /// XML bank descriptor for the SFX pseudo-language
    pub fn sfx_bank_xml(&self) -> PathBuf {
        self.banks_dir().join("sfx_banks.xml")
    }

    /// Decoded-waveform directory for one spoken language
    pub fn audio_dir(&self, lang: SpokenLang) -> PathBuf {
        self.root.join("audio").join(lang.audio_dir())
    }

    /// Decoded-waveform directory for SFX
    pub fn sfx_audio_dir(&self) -> PathBuf {
        self.root.join("audio").join("Sfx")
    }

    /// Per-event JSON descriptors exported from the game
    pub fn audio_event_dir(&self) -> PathBuf {
        self.root.join("audio_event")
    }

    pub fn audio_event_file(&self, event: &str) -> PathBuf {
        self.audio_event_dir().join(format!("{}.json", event))
    }

    /// Game table JSON (RoleVoice.json, InGameVoiceTrigger.json, ...)
    pub fn table_file(&self, name: &str) -> PathBuf {
        self.root.join("tables").join(format!("{}.json", name))
    }

    /// UI string map for one UI language
    pub fn ui_strings_file(&self, lang: UiLang) -> PathBuf {
        self.root.join("strings").join(format!("{}.json", lang.key()))
    }

    /// Persistent voice store, one JSON file per character
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("voice_data")
    }

    pub fn store_file(&self, role_id: u32) -> PathBuf {
        self.store_dir().join(format!("{}.json", role_id))
    }

    /// Cache for transcoded uploads and downloaded wiki copies
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_partition_by_language() {
        let layout = RootLayout::new("/tmp/export");
        let cn = layout.audio_dir(SpokenLang::Cn);
        let jp = layout.audio_dir(SpokenLang::Jp);
        assert_ne!(cn, jp);
        assert!(cn.ends_with("audio/Chinese"));
        assert!(layout.bank_xml(SpokenLang::Jp).ends_with("audio/banks/jp_banks.xml"));
    }
}
