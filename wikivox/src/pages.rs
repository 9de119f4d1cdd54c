//! Audio page rendering and reverse sync
//!
//! Pages are one section per voice type, each a sequence of `VoiceRow`
//! template invocations. Saving is diff-gated, so an unchanged page costs
//! no edit. The pull path parses the same template arguments back and
//! reconciles them into the persistent store without clobbering anything.

use crate::models::{Trigger, VoiceTypeTag};
use crate::services::voice_catalog::VoiceCatalog;
use crate::store::{apply_edit, Snapshot, StoredVoice};
use crate::wiki::{WikiError, WikiRepo};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info};
use wikivox_common::{SpokenLang, UiLang};

/// Wiki page title for a character's audio page in one UI language.
/// The base (Chinese) page has no language suffix.
pub fn page_title(character: &str, ui: UiLang) -> String {
    match ui {
        UiLang::Zh => format!("{}/audio", character),
        other => format!("{}/audio/{}", character, other.key()),
    }
}

/// Default title derived from the voice path; a wiki title equal to this
/// is never promoted to an editorial override.
pub fn default_title(path: &str) -> String {
    path.to_string()
}

/// Renders one character's audio page in one UI language
pub struct PageRenderer<'a> {
    catalog: &'a VoiceCatalog,
    ui: UiLang,
}

impl<'a> PageRenderer<'a> {
    pub fn new(catalog: &'a VoiceCatalog, ui: UiLang) -> Self {
        Self { catalog, ui }
    }

    /// Render the full page text. Sections follow the voice-type variant
    /// order; a voice type with no rows emits no section.
    pub fn render(&self, role: u32, snapshot: &Snapshot) -> String {
        let by_path: BTreeMap<&str, &StoredVoice> = snapshot
            .values()
            .map(|record| (record.path.as_str(), record))
            .collect();

        let mut page = String::new();
        for tag in VoiceTypeTag::ALL {
            let mut section = String::new();
            let mut seen_paths: Vec<String> = Vec::new();

            for trigger in self
                .catalog
                .triggers_for(role)
                .filter(|t| t.voice_type == tag)
            {
                for &key in &trigger.voices {
                    let voice = match self.catalog.get_by_key(key) {
                        Some(v) => v,
                        None => continue,
                    };
                    if seen_paths.iter().any(|p| p == &voice.path) {
                        continue;
                    }
                    let record = match by_path.get(voice.path.as_str()) {
                        Some(r) => r,
                        None => continue,
                    };
                    section.push_str(&self.render_row(trigger, record));
                    seen_paths.push(voice.path.clone());
                }
            }

            if !section.is_empty() {
                page.push_str(&format!("== {} ==\n", tag.heading()));
                page.push_str(&section);
                page.push('\n');
            }
        }
        page
    }

    /// One `VoiceRow` invocation. Title is the trigger name overridden by
    /// the voice title when non-empty; languages without a file emit no
    /// File/Text/Trans arguments.
    fn render_row(&self, trigger: &Trigger, record: &StoredVoice) -> String {
        let title = record
            .title
            .get(&self.ui)
            .filter(|t| !t.is_empty())
            .cloned()
            .or_else(|| trigger.name.get(&self.ui).filter(|t| !t.is_empty()).cloned())
            .unwrap_or_else(|| default_title(&record.path));

        let mut row = String::from("{{VoiceRow\n");
        row.push_str(&format!("|Title={}\n", title));
        for lang in SpokenLang::ALL {
            let present = record
                .file
                .get(&lang)
                .map(|f| !f.is_empty())
                .unwrap_or(false);
            if !present {
                continue;
            }
            let code = lang.code();
            row.push_str(&format!("|File{}={}_{}.ogg\n", code, code, record.path));
            row.push_str(&format!(
                "|Text{}={}\n",
                code,
                record.transcription.get(&lang).map(String::as_str).unwrap_or("")
            ));
            row.push_str(&format!(
                "|Trans{}={}\n",
                code,
                record
                    .translation
                    .get(&lang)
                    .and_then(|m| m.get(&self.ui))
                    .map(String::as_str)
                    .unwrap_or("")
            ));
        }
        row.push_str("}}\n");
        row
    }
}

/// Save a page only when its text actually changed. Returns whether an
/// edit happened.
pub async fn save_if_changed<W: WikiRepo>(
    repo: &W,
    title: &str,
    text: &str,
) -> Result<bool, WikiError> {
    let current = repo.get_page(title).await?;
    if current.as_deref() == Some(text) {
        debug!(title, "Page unchanged, no edit");
        return Ok(false);
    }
    repo.save_page(title, text, "Sync audio page from game data").await?;
    info!(title, "Page saved");
    Ok(true)
}

/// One parsed `VoiceRow` invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRow {
    /// Voice path recovered from the first File argument
    pub path: String,
    pub title: String,
    pub text: BTreeMap<SpokenLang, String>,
    pub trans: BTreeMap<SpokenLang, String>,
}

fn row_regex() -> &'static Regex {
    static ROW_RE: OnceLock<Regex> = OnceLock::new();
    // Rows never nest templates, so a lazy match up to the closing braces
    // is sufficient
    ROW_RE.get_or_init(|| Regex::new(r"(?s)\{\{VoiceRow\n(.*?)\}\}").expect("valid pattern"))
}

/// Parse every `VoiceRow` invocation out of a page
pub fn parse_rows(page: &str) -> Vec<ParsedRow> {
    let mut rows = Vec::new();

    for cap in row_regex().captures_iter(page) {
        let body = &cap[1];
        let mut row = ParsedRow::default();
        for line in body.lines() {
            let Some(rest) = line.strip_prefix('|') else {
                continue;
            };
            let Some((key, value)) = rest.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key {
                "Title" => row.title = value.to_string(),
                _ => {
                    if let Some(code) = key.strip_prefix("File") {
                        if let Ok(lang) = code.parse::<SpokenLang>() {
                            // `CN_<path>.ogg` carries the canonical path
                            if row.path.is_empty() {
                                row.path = value
                                    .strip_prefix(&format!("{}_", lang.code()))
                                    .and_then(|v| v.strip_suffix(".ogg"))
                                    .unwrap_or("")
                                    .to_string();
                            }
                        }
                    } else if let Some(code) = key.strip_prefix("Text") {
                        if let Ok(lang) = code.parse::<SpokenLang>() {
                            row.text.insert(lang, value.to_string());
                        }
                    } else if let Some(code) = key.strip_prefix("Trans") {
                        if let Ok(lang) = code.parse::<SpokenLang>() {
                            row.trans.insert(lang, value.to_string());
                        }
                    }
                }
            }
        }
        if !row.path.is_empty() {
            rows.push(row);
        }
    }
    rows
}

/// Reconcile parsed rows into a character's snapshot. Wiki-side values
/// overwrite the store when non-empty and different; a title equal to the
/// path-derived default is never promoted to an override. Returns the
/// number of changed fields.
pub fn reconcile(snapshot: &mut Snapshot, rows: &[ParsedRow], ui: UiLang) -> usize {
    let mut changed = 0;

    for row in rows {
        let record = match snapshot.values_mut().find(|r| r.path == row.path) {
            Some(r) => r,
            None => {
                debug!(path = row.path, "Parsed row without store record, ignored");
                continue;
            }
        };

        if row.title != default_title(&row.path) && apply_edit(&mut record.title, ui, &row.title) {
            changed += 1;
        }
        for (&lang, text) in &row.text {
            if apply_edit(&mut record.transcription, lang, text) {
                changed += 1;
            }
        }
        for (&lang, trans) in &row.trans {
            if apply_edit(record.translation.entry(lang).or_default(), ui, trans) {
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, path: &str) -> StoredVoice {
        let mut r = StoredVoice {
            id,
            path: path.to_string(),
            ..Default::default()
        };
        r.file.insert(SpokenLang::Cn, format!("VO_CN-0001-{}.wav", id));
        r
    }

    #[test]
    fn parse_roundtrips_rendered_row() {
        let page = "== Dormitory ==\n{{VoiceRow\n|Title=Greeting\n\
                    |FileCN=CN_Vo_lee_105.ogg\n|TextCN=你好\n|TransCN=Hello\n}}\n";
        let rows = parse_rows(page);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "Vo_lee_105");
        assert_eq!(rows[0].title, "Greeting");
        assert_eq!(rows[0].text[&SpokenLang::Cn], "你好");
        assert_eq!(rows[0].trans[&SpokenLang::Cn], "Hello");
    }

    #[test]
    fn reconcile_overwrites_only_nonempty_changes() {
        let mut snapshot = Snapshot::new();
        let mut rec = record(10, "Vo_lee_105");
        rec.transcription.insert(SpokenLang::Cn, "旧".to_string());
        snapshot.insert(10, rec);

        let row = ParsedRow {
            path: "Vo_lee_105".to_string(),
            title: "Morning Greeting".to_string(),
            text: BTreeMap::from([(SpokenLang::Cn, "新".to_string())]),
            trans: BTreeMap::from([(SpokenLang::Cn, "Hello".to_string())]),
        };
        let changed = reconcile(&mut snapshot, &[row.clone()], UiLang::En);
        assert_eq!(changed, 3);
        assert_eq!(snapshot[&10].transcription[&SpokenLang::Cn], "新");
        assert_eq!(snapshot[&10].title[&UiLang::En], "Morning Greeting");

        // Second pass is a no-op
        assert_eq!(reconcile(&mut snapshot, &[row], UiLang::En), 0);
    }

    #[test]
    fn default_title_is_not_promoted() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(10, record(10, "Vo_lee_105"));

        let row = ParsedRow {
            path: "Vo_lee_105".to_string(),
            title: default_title("Vo_lee_105"),
            ..Default::default()
        };
        assert_eq!(reconcile(&mut snapshot, &[row], UiLang::En), 0);
        assert!(snapshot[&10].title.is_empty());
    }

    #[test]
    fn empty_wiki_fields_never_clobber() {
        let mut snapshot = Snapshot::new();
        let mut rec = record(10, "Vo_lee_105");
        rec.transcription
            .insert(SpokenLang::Cn, "保留".to_string());
        snapshot.insert(10, rec);

        let row = ParsedRow {
            path: "Vo_lee_105".to_string(),
            title: String::new(),
            text: BTreeMap::from([(SpokenLang::Cn, String::new())]),
            ..Default::default()
        };
        assert_eq!(reconcile(&mut snapshot, &[row], UiLang::En), 0);
        assert_eq!(snapshot[&10].transcription[&SpokenLang::Cn], "保留");
    }
}
