//! Voice catalog construction
//!
//! Builds merged `Voice` records and `Trigger` attachments from the game
//! tables, the multilingual UI strings and the per-language event
//! resolvers. Chinese audio is the reference: a RoleVoice row without a
//! resolvable Chinese waveform is skipped entirely.

use crate::models::{path_digits, Trigger, UpgradeTrigger, Voice, VoiceTypeTag, VoiceUpgrade};
use crate::services::event_resolver::EventResolver;
use crate::tables::{GameTables, UiStrings};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use wikivox_common::{Result, SpokenLang, UiLang};

/// Static conversion table behind the custom triggers: path-digit segment
/// -> display name. The voice-type bucket of each digit follows from
/// `VoiceTypeTag::from_digits`, so classification is total over the table.
const CUSTOM_TRIGGERS: &[(u32, &str, &str)] = &[
    // (digits, zh name, en name)
    (101, "问候", "Greeting"),
    (102, "待机", "Standby"),
    (103, "赠礼", "Gift"),
    (104, "邮件", "Mail"),
    (105, "闲聊", "Idle Chat"),
    (201, "战斗开始", "Battle Start"),
    (202, "技能", "Skill"),
    (203, "终结技", "Ultimate"),
    (204, "受击", "Injured"),
    (205, "胜利", "Victory"),
    (301, "登录", "Login"),
    (302, "互动", "Interaction"),
    (401, "升级", "Level Up"),
    (402, "武器强化", "Weapon Enhance"),
];

/// Synthetic id offset for custom triggers, clear of the game tables
const CUSTOM_TRIGGER_ID_BASE: u32 = 9000;

/// The built catalog: merged voices keyed by canonical path, with catalog
/// keys mapped back onto them, plus all triggers.
#[derive(Debug, Default)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, Voice>,
    key_to_path: BTreeMap<u32, String>,
    triggers: Vec<Trigger>,
}

impl VoiceCatalog {
    /// Build the catalog. Resolvers are per spoken language; a language
    /// missing from the map is treated as unavailable.
    pub fn build(
        tables: &GameTables,
        strings: &UiStrings,
        resolvers: &BTreeMap<SpokenLang, EventResolver<'_>>,
    ) -> Result<Self> {
        let mut catalog = VoiceCatalog::default();

        for (&id, row) in &tables.role_voice {
            let path = row.ak_event.clone();
            if path.is_empty() {
                warn!(id, "RoleVoice row without event name, skipped");
                continue;
            }

            // Chinese is required; a row without it has no playable artifact
            let cn_file = resolvers
                .get(&SpokenLang::Cn)
                .and_then(|r| r.resolve(&path))
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
            let cn_file = match cn_file {
                Some(f) => f,
                None => {
                    debug!(id, path, "No Chinese waveform, row skipped");
                    continue;
                }
            };

            let mut files = BTreeMap::new();
            files.insert(SpokenLang::Cn, cn_file);
            for lang in [SpokenLang::Jp, SpokenLang::En] {
                let file = resolvers
                    .get(&lang)
                    .and_then(|r| r.resolve(&path))
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .unwrap_or_default();
                files.insert(lang, file);
            }

            let mut transcription = BTreeMap::new();
            for lang in SpokenLang::ALL {
                let text = strings
                    .get(lang.transcript_lang(), &row.content_key)
                    .unwrap_or_default();
                transcription.insert(lang, text.to_string());
            }

            let voice = Voice {
                ids: vec![id],
                role: row.role_id,
                quality: row.quality,
                upgrade: VoiceUpgrade::from_path(&path),
                files,
                title: strings.localize(&row.title_key),
                transcription,
                translation: BTreeMap::new(),
                non_local: false,
                path,
            };

            catalog.insert_merged(id, voice)?;
        }

        catalog.build_game_triggers(tables, strings);
        catalog.build_custom_triggers();

        debug!(
            voices = catalog.voices.len(),
            keys = catalog.key_to_path.len(),
            triggers = catalog.triggers.len(),
            "Voice catalog built"
        );
        Ok(catalog)
    }

    fn insert_merged(&mut self, key: u32, voice: Voice) -> Result<()> {
        self.key_to_path.insert(key, voice.path.clone());
        match self.voices.get_mut(&voice.path) {
            Some(existing) => existing.merge_from(voice)?,
            None => {
                self.voices.insert(voice.path.clone(), voice);
            }
        }
        Ok(())
    }

    /// In-game triggers from the singleton and random-list table variants
    fn build_game_triggers(&mut self, tables: &GameTables, strings: &UiStrings) {
        for (&id, row) in &tables.voice_trigger {
            let mut voices: Vec<u32> = Vec::new();
            if let Some(v) = row.voice_id {
                voices.push(v);
            }
            for &v in &row.random_voice_ids {
                if !voices.contains(&v) {
                    voices.push(v);
                }
            }

            // Bucket from the first attached voice's path digits
            let voice_type = voices
                .iter()
                .find_map(|v| self.key_to_path.get(v))
                .and_then(|path| path_digits(path))
                .map(VoiceTypeTag::from_digits)
                .unwrap_or_default();

            let upgrades = tables
                .voice_upgrade
                .iter()
                .filter(|(_, u)| u.trigger_id == id)
                .map(|(&uid, u)| UpgradeTrigger {
                    id: uid,
                    skin_ids: u.skin_ids.clone(),
                    voice_ids: u.voice_ids.clone(),
                })
                .collect();

            self.triggers.push(Trigger {
                id,
                voice_type,
                name: strings.localize(&row.name_key),
                description: strings.localize(&row.desc_key),
                role: row.role_id,
                upgrades,
                voices,
            });
        }
    }

    /// Custom triggers from the static conversion table. A voice attaches
    /// to at most one custom trigger; duplicates across catalog keys are
    /// suppressed because attachment iterates merged records.
    fn build_custom_triggers(&mut self) {
        let mut by_digits: BTreeMap<u32, Trigger> = BTreeMap::new();

        for voice in self.voices.values() {
            let digits = match path_digits(&voice.path) {
                Some(d) => d,
                None => continue,
            };
            let def = match CUSTOM_TRIGGERS.iter().find(|(d, _, _)| *d == digits) {
                Some(def) => def,
                None => continue,
            };
            let key = match voice.ids.first() {
                Some(&k) => k,
                None => continue,
            };

            let trigger = by_digits.entry(digits).or_insert_with(|| {
                let mut name = BTreeMap::new();
                name.insert(UiLang::Zh, def.1.to_string());
                name.insert(UiLang::En, def.2.to_string());
                Trigger {
                    id: CUSTOM_TRIGGER_ID_BASE + digits,
                    voice_type: VoiceTypeTag::from_digits(digits),
                    name,
                    description: BTreeMap::new(),
                    role: 0,
                    upgrades: Vec::new(),
                    voices: Vec::new(),
                }
            });
            trigger.voices.push(key);
        }

        self.triggers.extend(by_digits.into_values());
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.values()
    }

    pub fn get_by_path(&self, path: &str) -> Option<&Voice> {
        self.voices.get(path)
    }

    pub fn get_by_key(&self, key: u32) -> Option<&Voice> {
        self.voices.get(self.key_to_path.get(&key)?)
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Triggers applying to a character (role filter 0 matches all)
    pub fn triggers_for(&self, role: u32) -> impl Iterator<Item = &Trigger> {
        self.triggers
            .iter()
            .filter(move |t| t.role == 0 || t.role == role)
    }

    /// Role ids with at least one catalogued voice (0 excluded)
    pub fn roles(&self) -> BTreeSet<u32> {
        self.voices
            .values()
            .map(|v| v.role)
            .filter(|&r| r != 0)
            .collect()
    }

    /// Voices owned by one character, in path order
    pub fn voices_for(&self, role: u32) -> impl Iterator<Item = &Voice> {
        self.voices.values().filter(move |v| v.role == role)
    }

    /// Diagnostics: voices attached to no trigger at all
    pub fn orphan_voices(&self) -> Vec<&Voice> {
        let attached: BTreeSet<u32> = self
            .triggers
            .iter()
            .flat_map(|t| t.voices.iter().copied())
            .collect();
        self.voices
            .values()
            .filter(|v| !v.ids.iter().any(|id| attached.contains(id)))
            .collect()
    }

    /// Diagnostics: paths attached to more than one custom trigger, or
    /// twice to the same trigger. Expected to be empty.
    pub fn duplicate_attachments(&self) -> Vec<String> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for trigger in self.triggers.iter().filter(|t| t.id >= CUSTOM_TRIGGER_ID_BASE) {
            for key in &trigger.voices {
                if let Some(path) = self.key_to_path.get(key) {
                    *seen.entry(path.as_str()).or_default() += 1;
                }
            }
        }
        seen.into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(path, _)| path.to_string())
            .collect()
    }
}
