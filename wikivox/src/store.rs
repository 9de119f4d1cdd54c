//! Persistent voice store
//!
//! One JSON file per character, holding the authoritative editorial fields
//! (titles, transcriptions, translations). Regeneration merges the fresh
//! catalog with the previous snapshot; editor text always survives.

use crate::models::Voice;
use crate::services::voice_catalog::VoiceCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};
use wikivox_common::{Error, Result, RootLayout, SpokenLang, UiLang};

/// On-disk record for one voice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredVoice {
    pub id: u32,
    pub path: String,
    #[serde(default)]
    pub file: BTreeMap<SpokenLang, String>,
    #[serde(default)]
    pub title: BTreeMap<UiLang, String>,
    #[serde(default)]
    pub transcription: BTreeMap<SpokenLang, String>,
    #[serde(default)]
    pub translation: BTreeMap<SpokenLang, BTreeMap<UiLang, String>>,
    /// Record exists only on the wiki; optional in the file format
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub non_local: bool,
}

impl StoredVoice {
    pub fn from_voice(voice: &Voice) -> Self {
        Self {
            id: voice.ids.first().copied().unwrap_or_default(),
            path: voice.path.clone(),
            file: voice.files.clone(),
            title: voice.title.clone(),
            transcription: voice.transcription.clone(),
            translation: voice.translation.clone(),
            non_local: voice.non_local,
        }
    }
}

/// One character's snapshot: id -> record, stable key order on disk
pub type Snapshot = BTreeMap<u32, StoredVoice>;

/// Fresh snapshot for one character from the in-memory catalog
pub fn snapshot_from_catalog(catalog: &VoiceCatalog, role: u32) -> Snapshot {
    catalog
        .voices_for(role)
        .map(StoredVoice::from_voice)
        .map(|record| (record.id, record))
        .collect()
}

/// Load a character's snapshot; a missing file is an empty snapshot
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::new());
    }
    let content = std::fs::read_to_string(path)?;
    let raw: BTreeMap<String, StoredVoice> = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("malformed store {}: {}", path.display(), e)))?;
    let mut snapshot = Snapshot::new();
    for (key, record) in raw {
        let id: u32 = key.parse().map_err(|_| {
            Error::InvalidInput(format!("non-integer id '{}' in {}", key, path.display()))
        })?;
        snapshot.insert(id, record);
    }
    Ok(snapshot)
}

/// Write a snapshot via temp file + rename so a crash never truncates the
/// previous file. Pretty-printed with stable key order for reviewable diffs.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let keyed: BTreeMap<String, &StoredVoice> = snapshot
        .iter()
        .map(|(id, record)| (id.to_string(), record))
        .collect();
    let json = serde_json::to_string_pretty(&keyed)?;

    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), records = snapshot.len(), "Saved store snapshot");
    Ok(())
}

/// Merge a freshly generated snapshot with the previous on-disk one.
///
/// For ids in both: editorial fields (transcription, title, translation)
/// keep the previous value whenever it is non-empty; `path` must agree or
/// the merge fails. Ids only in `previous` are dropped when
/// `discard_non_local`, otherwise retained with `non_local = true`. Ids
/// only in `current` pass through unchanged.
pub fn merge_snapshots(
    current: Snapshot,
    previous: Snapshot,
    discard_non_local: bool,
) -> Result<Snapshot> {
    let mut merged = current;

    for (id, prev) in previous {
        match merged.get_mut(&id) {
            Some(cur) => {
                if cur.path != prev.path {
                    return Err(Error::MergeConflict {
                        field: "path".to_string(),
                        key: id.to_string(),
                        left: cur.path.clone(),
                        right: prev.path,
                    });
                }
                previous_wins(&mut cur.title, prev.title);
                previous_wins(&mut cur.transcription, prev.transcription);
                for (spoken, prev_map) in prev.translation {
                    previous_wins(cur.translation.entry(spoken).or_default(), prev_map);
                }
            }
            None => {
                if discard_non_local {
                    debug!(id, path = prev.path, "Dropped non-local record");
                } else {
                    let mut kept = prev;
                    kept.non_local = true;
                    merged.insert(id, kept);
                }
            }
        }
    }

    Ok(merged)
}

/// Previous (persisted editor) text overrides the re-derived text whenever
/// it is non-empty.
fn previous_wins<K: Ord>(current: &mut BTreeMap<K, String>, previous: BTreeMap<K, String>) {
    for (key, prev_value) in previous {
        if prev_value.is_empty() {
            continue;
        }
        current.insert(key, prev_value);
    }
}

/// Apply a wiki-side editorial value during reverse sync: non-empty and
/// different overwrites the store. Returns whether anything changed.
pub fn apply_edit<K: Ord>(map: &mut BTreeMap<K, String>, key: K, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    match map.get(&key) {
        Some(existing) if existing == value => false,
        _ => {
            map.insert(key, value.to_string());
            true
        }
    }
}

/// Merge and persist every character's snapshot from the catalog
pub fn write_merged(
    layout: &RootLayout,
    catalog: &VoiceCatalog,
    discard_non_local: bool,
) -> Result<usize> {
    let mut written = 0;
    for role in catalog.roles() {
        let path = layout.store_file(role);
        let previous = load_snapshot(&path)?;
        let current = snapshot_from_catalog(catalog, role);
        let merged = merge_snapshots(current, previous, discard_non_local)?;
        save_snapshot(&path, &merged)?;
        written += 1;
    }
    info!(characters = written, "Persistent store updated");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, path: &str) -> StoredVoice {
        StoredVoice {
            id,
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn previous_editor_text_survives_regeneration() {
        let mut current = Snapshot::new();
        let mut fresh = record(10, "Vo_lee_105");
        fresh
            .transcription
            .insert(SpokenLang::En, String::new()); // re-derived came back empty
        current.insert(10, fresh);

        let mut previous = Snapshot::new();
        let mut prev = record(10, "Vo_lee_105");
        prev.transcription
            .insert(SpokenLang::En, "Hello there".to_string());
        prev.translation
            .entry(SpokenLang::Cn)
            .or_default()
            .insert(UiLang::En, "Good morning".to_string());
        previous.insert(10, prev);

        let merged = merge_snapshots(current, previous, false).unwrap();
        assert_eq!(merged[&10].transcription[&SpokenLang::En], "Hello there");
        assert_eq!(
            merged[&10].translation[&SpokenLang::Cn][&UiLang::En],
            "Good morning"
        );
    }

    #[test]
    fn path_disagreement_is_fatal() {
        let mut current = Snapshot::new();
        current.insert(10, record(10, "Vo_lee_105"));
        let mut previous = Snapshot::new();
        previous.insert(10, record(10, "Vo_other_201"));

        let err = merge_snapshots(current, previous, false).unwrap_err();
        assert!(err.to_string().contains("Vo_lee_105"));
        assert!(err.to_string().contains("Vo_other_201"));
    }

    #[test]
    fn previous_only_records_become_non_local() {
        let current = Snapshot::new();
        let mut previous = Snapshot::new();
        previous.insert(10, record(10, "Vo_lee_105"));

        let merged = merge_snapshots(current.clone(), previous.clone(), false).unwrap();
        assert!(merged[&10].non_local);

        let discarded = merge_snapshots(current, previous, true).unwrap();
        assert!(discarded.is_empty());
    }

    #[test]
    fn snapshot_roundtrip_preserves_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1021.json");

        let mut snapshot = Snapshot::new();
        let mut rec = record(10, "Vo_lee_105");
        rec.file.insert(SpokenLang::Cn, "VO_CN-0001-a.wav".to_string());
        rec.title.insert(UiLang::En, "Greeting".to_string());
        snapshot.insert(10, rec);

        save_snapshot(&path, &snapshot).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        // Spoken-language keys are lowercase codes; non_local omitted when false
        assert!(text.contains("\"cn\""));
        assert!(!text.contains("non_local"));

        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn wiki_edit_overwrites_when_nonempty_and_different() {
        let mut map = BTreeMap::from([(UiLang::En, "old".to_string())]);
        assert!(apply_edit(&mut map, UiLang::En, "new"));
        assert!(!apply_edit(&mut map, UiLang::En, "new"));
        assert!(!apply_edit(&mut map, UiLang::En, ""));
        assert_eq!(map[&UiLang::En], "new");
    }
}
