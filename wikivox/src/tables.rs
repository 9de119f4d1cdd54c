//! Typed readers for exported game tables and UI string maps
//!
//! Tables are JSON objects keyed by integer id. Readers are constructed
//! once at startup and passed through the pipeline; nothing here is cached
//! in module-level state.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use wikivox_common::{Error, Result, RootLayout, UiLang};

/// One row of `RoleVoice.json`
#[derive(Debug, Clone, Deserialize)]
pub struct RoleVoiceRow {
    #[serde(rename = "RoleId", default)]
    pub role_id: u32,
    #[serde(rename = "Quality", default)]
    pub quality: u32,
    /// Audio-event name; the canonical voice path
    #[serde(rename = "AkEvent")]
    pub ak_event: String,
    /// UI-string key of the display title
    #[serde(rename = "Title", default)]
    pub title_key: String,
    /// UI-string key of the transcription text
    #[serde(rename = "Content", default)]
    pub content_key: String,
}

/// One row of `InGameVoiceTrigger.json`; either a singleton voice or a
/// random list plays when the trigger fires.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceTriggerRow {
    #[serde(rename = "Name", default)]
    pub name_key: String,
    #[serde(rename = "Desc", default)]
    pub desc_key: String,
    /// 0 means the trigger applies to all characters
    #[serde(rename = "RoleId", default)]
    pub role_id: u32,
    #[serde(rename = "VoiceId", default)]
    pub voice_id: Option<u32>,
    #[serde(rename = "RandomVoiceIds", default)]
    pub random_voice_ids: Vec<u32>,
}

/// One row of `InGameVoiceUpgrade.json`
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceUpgradeRow {
    #[serde(rename = "TriggerId", default)]
    pub trigger_id: u32,
    #[serde(rename = "SkinIds", default)]
    pub skin_ids: Vec<u32>,
    #[serde(rename = "VoiceIds", default)]
    pub voice_ids: Vec<u32>,
}

/// One row of `Role.json`, used to name characters on the wiki
#[derive(Debug, Clone, Deserialize)]
pub struct RoleRow {
    /// UI-string key of the character name
    #[serde(rename = "Name", default)]
    pub name_key: String,
}

/// Load one table: a JSON object mapping integer ids to rows
pub fn load_table<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<u32, T>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read table {}: {}", path.display(), e)))?;
    let raw: BTreeMap<String, T> = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("malformed table {}: {}", path.display(), e)))?;
    let mut table = BTreeMap::new();
    for (key, row) in raw {
        let id: u32 = key.parse().map_err(|_| {
            Error::InvalidInput(format!("non-integer id '{}' in {}", key, path.display()))
        })?;
        table.insert(id, row);
    }
    debug!(path = %path.display(), rows = table.len(), "Loaded table");
    Ok(table)
}

/// All game tables the voice catalog consumes
#[derive(Debug, Clone)]
pub struct GameTables {
    pub role_voice: BTreeMap<u32, RoleVoiceRow>,
    pub voice_trigger: BTreeMap<u32, VoiceTriggerRow>,
    pub voice_upgrade: BTreeMap<u32, VoiceUpgradeRow>,
    pub roles: BTreeMap<u32, RoleRow>,
}

impl GameTables {
    pub fn load(layout: &RootLayout) -> Result<Self> {
        Ok(Self {
            role_voice: load_table(&layout.table_file("RoleVoice"))?,
            voice_trigger: load_table(&layout.table_file("InGameVoiceTrigger"))?,
            voice_upgrade: load_table(&layout.table_file("InGameVoiceUpgrade"))?,
            roles: load_table(&layout.table_file("Role"))?,
        })
    }
}

/// Per-UI-language key -> string maps
#[derive(Debug, Clone, Default)]
pub struct UiStrings {
    maps: BTreeMap<UiLang, BTreeMap<String, String>>,
}

impl UiStrings {
    /// Load every available UI language; a missing language file means that
    /// language is unavailable, not an error.
    pub fn load(layout: &RootLayout) -> Result<Self> {
        let mut maps = BTreeMap::new();
        for lang in UiLang::ALL {
            let path = layout.ui_strings_file(lang);
            if !path.exists() {
                debug!(lang = %lang, "UI strings unavailable");
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let map: BTreeMap<String, String> = serde_json::from_str(&content).map_err(|e| {
                Error::InvalidInput(format!("malformed strings {}: {}", path.display(), e))
            })?;
            maps.insert(lang, map);
        }
        Ok(Self { maps })
    }

    pub fn from_maps(maps: BTreeMap<UiLang, BTreeMap<String, String>>) -> Self {
        Self { maps }
    }

    /// Localized string for a key; empty key or unknown key yields None
    pub fn get(&self, lang: UiLang, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.maps.get(&lang)?.get(key).map(String::as_str)
    }

    /// All localizations of one key, skipping languages that lack it
    pub fn localize(&self, key: &str) -> BTreeMap<UiLang, String> {
        let mut out = BTreeMap::new();
        for (&lang, map) in &self.maps {
            if let Some(value) = map.get(key) {
                out.insert(lang, value.clone());
            }
        }
        out
    }

    pub fn langs(&self) -> impl Iterator<Item = UiLang> + '_ {
        self.maps.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_table_parses_integer_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RoleVoice.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"101": {{"RoleId": 1021, "Quality": 3, "AkEvent": "Vo_lee_105",
                  "Title": "VO_TITLE_101", "Content": "VO_TEXT_101"}}}}"#
        )
        .unwrap();

        let table: BTreeMap<u32, RoleVoiceRow> = load_table(&path).unwrap();
        assert_eq!(table[&101].role_id, 1021);
        assert_eq!(table[&101].ak_event, "Vo_lee_105");
    }

    #[test]
    fn load_table_rejects_noninteger_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"abc": {"RoleId": 1}}"#).unwrap();
        let result: Result<BTreeMap<u32, RoleVoiceRow>> = load_table(&path);
        assert!(result.is_err());
    }

    #[test]
    fn ui_strings_localize_skips_missing() {
        let mut maps = BTreeMap::new();
        maps.insert(
            UiLang::En,
            BTreeMap::from([("K1".to_string(), "Hello".to_string())]),
        );
        maps.insert(UiLang::Ja, BTreeMap::new());
        let strings = UiStrings::from_maps(maps);

        let localized = strings.localize("K1");
        assert_eq!(localized.get(&UiLang::En).map(String::as_str), Some("Hello"));
        assert!(!localized.contains_key(&UiLang::Ja));
    }
}
