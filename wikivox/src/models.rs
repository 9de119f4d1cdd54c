//! Core voice catalog records
//!
//! Every record here is a closed schema: all optional fields are declared
//! and default-empty, and merging is a total function over the schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wikivox_common::{Error, Result, SpokenLang, UiLang};

/// Role id the game tables use as "not yet assigned"; yields to any
/// concrete role id during merge.
pub const PLACEHOLDER_ROLE: u32 = 999;

/// Voice-type bucket, determined from the three-digit segment embedded in
/// the canonical voice path. Section order on rendered pages follows the
/// variant order here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VoiceTypeTag {
    Dormitory,
    Battle,
    Communications,
    System,
    Other,
}

impl VoiceTypeTag {
    pub const ALL: [VoiceTypeTag; 5] = [
        VoiceTypeTag::Dormitory,
        VoiceTypeTag::Battle,
        VoiceTypeTag::Communications,
        VoiceTypeTag::System,
        VoiceTypeTag::Other,
    ];

    /// Classify a path-digit segment into its bucket
    pub fn from_digits(digits: u32) -> Self {
        match digits / 100 {
            1 => VoiceTypeTag::Dormitory,
            2 => VoiceTypeTag::Battle,
            3 => VoiceTypeTag::Communications,
            4 => VoiceTypeTag::System,
            _ => VoiceTypeTag::Other,
        }
    }

    /// Section heading used on rendered pages
    pub fn heading(self) -> &'static str {
        match self {
            VoiceTypeTag::Dormitory => "Dormitory",
            VoiceTypeTag::Battle => "Battle",
            VoiceTypeTag::Communications => "Communications",
            VoiceTypeTag::System => "System",
            VoiceTypeTag::Other => "Other",
        }
    }
}

impl Default for VoiceTypeTag {
    fn default() -> Self {
        VoiceTypeTag::Other
    }
}

/// Skin-dependent variant of a base voice line, detected by substring
/// markers in the voice path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceUpgrade {
    #[default]
    Regular,
    Org,
    Red,
}

impl VoiceUpgrade {
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        if lower.contains("org") {
            VoiceUpgrade::Org
        } else if lower.contains("red") {
            VoiceUpgrade::Red
        } else {
            VoiceUpgrade::Regular
        }
    }
}

/// Extract the last three-digit group that ends the path or precedes an
/// underscore. Longer digit runs do not count: the group must be exactly
/// three digits.
pub fn path_digits(path: &str) -> Option<u32> {
    let bytes = path.as_bytes();
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let run_ok = i - start == 3;
            let boundary_ok = i == bytes.len() || bytes[i] == b'_';
            if run_ok && boundary_ok {
                found = Some(path[start..i].parse().ok()?);
            }
        } else {
            i += 1;
        }
    }
    found
}

/// The central voice record. One record may cover several catalog keys
/// when multiple RoleVoice rows share the same playable artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Voice {
    /// Catalog keys that collapsed into this record
    pub ids: Vec<u32>,
    /// Owning character (0 = global/shared)
    pub role: u32,
    /// Quality tier
    pub quality: u32,
    /// Canonical voice-event name, stable across spoken languages
    pub path: String,
    pub upgrade: VoiceUpgrade,
    /// Decoded-waveform basename per spoken language; empty string marks a
    /// missing localization
    pub files: BTreeMap<SpokenLang, String>,
    /// Localized display title
    pub title: BTreeMap<UiLang, String>,
    /// In-language transcription of the spoken line
    pub transcription: BTreeMap<SpokenLang, String>,
    /// Spoken language -> UI language -> translated text
    pub translation: BTreeMap<SpokenLang, BTreeMap<UiLang, String>>,
    /// Record exists only on the wiki; its file is gone from local exports
    #[serde(default)]
    pub non_local: bool,
}

impl Voice {
    /// Target file title on the wiki for one spoken language
    pub fn wiki_file_name(&self, lang: SpokenLang) -> String {
        format!("{}_{}.ogg", lang.code(), self.path)
    }

    /// Spoken languages with a present (non-empty) waveform file
    pub fn present_langs(&self) -> impl Iterator<Item = SpokenLang> + '_ {
        SpokenLang::ALL
            .into_iter()
            .filter(|l| self.files.get(l).map(|f| !f.is_empty()).unwrap_or(false))
    }

    /// Fold another catalog observation of the same path into this record.
    ///
    /// String fields take the non-empty side; two differing non-empty values
    /// are a contract violation and abort instead of silently picking one.
    /// A placeholder role yields to any concrete role id.
    pub fn merge_from(&mut self, other: Voice) -> Result<()> {
        debug_assert_eq!(self.path, other.path);
        for id in other.ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
        self.role = merge_role(&self.path.clone(), self.role, other.role)?;
        merge_text_map(&self.path, "title", &mut self.title, other.title)?;
        merge_text_map(
            &self.path,
            "transcription",
            &mut self.transcription,
            other.transcription,
        )?;
        for (lang, file) in other.files {
            let entry = self.files.entry(lang).or_default();
            if entry.is_empty() {
                *entry = file;
            }
        }
        for (spoken, map) in other.translation {
            let entry = self.translation.entry(spoken).or_default();
            merge_text_map(&self.path, "translation", entry, map)?;
        }
        Ok(())
    }
}

fn merge_role(path: &str, left: u32, right: u32) -> Result<u32> {
    match (left, right) {
        (l, r) if l == r => Ok(l),
        (PLACEHOLDER_ROLE, r) => Ok(r),
        (l, PLACEHOLDER_ROLE) => Ok(l),
        (l, r) => Err(Error::MergeConflict {
            field: "role".to_string(),
            key: path.to_string(),
            left: l.to_string(),
            right: r.to_string(),
        }),
    }
}

/// Non-empty wins; two differing non-empty values abort the merge.
fn merge_text_map<K: Ord + std::fmt::Debug>(
    path: &str,
    field: &str,
    into: &mut BTreeMap<K, String>,
    from: BTreeMap<K, String>,
) -> Result<()> {
    for (key, value) in from {
        match into.get_mut(&key) {
            None => {
                into.insert(key, value);
            }
            Some(existing) if existing.is_empty() => *existing = value,
            Some(existing) => {
                if !value.is_empty() && *existing != value {
                    return Err(Error::MergeConflict {
                        field: format!("{}[{:?}]", field, key),
                        key: path.to_string(),
                        left: existing.clone(),
                        right: value,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Condition under which voices play
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub id: u32,
    pub voice_type: VoiceTypeTag,
    pub name: BTreeMap<UiLang, String>,
    pub description: BTreeMap<UiLang, String>,
    /// Role filter; 0 applies to all characters
    pub role: u32,
    /// Skin-conditional override children
    pub upgrades: Vec<UpgradeTrigger>,
    /// Attached voice catalog keys; always present, possibly empty
    pub voices: Vec<u32>,
}

/// Child of a trigger: override voice ids active only when one of the
/// listed skins is equipped.
#[derive(Debug, Clone, Default)]
pub struct UpgradeTrigger {
    pub id: u32,
    pub skin_ids: Vec<u32>,
    pub voice_ids: Vec<u32>,
}

/// Audio-event JSON record exported from the game
#[derive(Debug, Clone, Deserialize)]
pub struct EventDescriptor {
    #[serde(rename = "RequiredBank")]
    pub required_bank: RequiredBank,
    #[serde(rename = "ShortID")]
    pub short_id: u64,
    /// Per-language media list; informational fallback when the bank-index
    /// path is unavailable
    #[serde(rename = "Media", default)]
    pub media: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredBank {
    /// Of the form `WwiseBank'VO_CN'`; the quoted tail is the bank name
    #[serde(rename = "ObjectName")]
    pub object_name: String,
}

impl RequiredBank {
    /// Bank name stripped of its type prefix and quotes
    pub fn bank_name(&self) -> Option<&str> {
        let start = self.object_name.find('\'')? + 1;
        let end = self.object_name.rfind('\'')?;
        if start <= end {
            Some(&self.object_name[start..end])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_digits_takes_last_three_digit_group() {
        assert_eq!(path_digits("Vo_lee_105_hello"), Some(105));
        assert_eq!(path_digits("Vo_lee_105_hello_213"), Some(213));
        assert_eq!(path_digits("Vo_lee_1050_hello"), None); // four digits
        assert_eq!(path_digits("Vo_lee_hello"), None);
        assert_eq!(path_digits("Vo_lee_105a_hello"), None); // not at boundary
    }

    #[test]
    fn voice_type_buckets() {
        assert_eq!(VoiceTypeTag::from_digits(105), VoiceTypeTag::Dormitory);
        assert_eq!(VoiceTypeTag::from_digits(213), VoiceTypeTag::Battle);
        assert_eq!(VoiceTypeTag::from_digits(301), VoiceTypeTag::Communications);
        assert_eq!(VoiceTypeTag::from_digits(404), VoiceTypeTag::System);
        assert_eq!(VoiceTypeTag::from_digits(777), VoiceTypeTag::Other);
    }

    #[test]
    fn upgrade_markers() {
        assert_eq!(VoiceUpgrade::from_path("Vo_lee_org_105"), VoiceUpgrade::Org);
        assert_eq!(VoiceUpgrade::from_path("Vo_lee_red_105"), VoiceUpgrade::Red);
        assert_eq!(VoiceUpgrade::from_path("Vo_lee_105"), VoiceUpgrade::Regular);
    }

    #[test]
    fn bank_name_strips_type_prefix() {
        let bank = RequiredBank {
            object_name: "WwiseBank'VO_CN'".to_string(),
        };
        assert_eq!(bank.bank_name(), Some("VO_CN"));
    }

    #[test]
    fn merge_appends_ids_and_prefers_nonempty() {
        let mut a = Voice {
            ids: vec![10],
            role: PLACEHOLDER_ROLE,
            path: "Vo_lee_105".to_string(),
            ..Default::default()
        };
        a.transcription.insert(SpokenLang::En, String::new());

        let mut b = Voice {
            ids: vec![11],
            role: 1021,
            path: "Vo_lee_105".to_string(),
            ..Default::default()
        };
        b.transcription
            .insert(SpokenLang::En, "Hello there".to_string());

        a.merge_from(b).unwrap();
        assert_eq!(a.ids, vec![10, 11]);
        assert_eq!(a.role, 1021);
        assert_eq!(a.transcription[&SpokenLang::En], "Hello there");
    }

    #[test]
    fn merge_conflict_is_fatal() {
        let mut a = Voice {
            ids: vec![10],
            path: "Vo_lee_105".to_string(),
            ..Default::default()
        };
        a.transcription.insert(SpokenLang::Cn, "你好".to_string());
        let mut b = a.clone();
        b.ids = vec![11];
        b.transcription.insert(SpokenLang::Cn, "再见".to_string());

        let err = a.merge_from(b).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("你好") && msg.contains("再见"), "{}", msg);
    }
}
