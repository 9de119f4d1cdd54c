//! Spoken and UI language code sets
//!
//! Voice audio exists in three spoken languages; wiki pages are rendered in
//! a larger set of UI translation languages. The two sets are deliberately
//! separate types: waveform files and transcriptions are keyed on
//! [`SpokenLang`], page rendering and translations on [`UiLang`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A language the game records voice audio in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpokenLang {
    /// Chinese (the reference language; every catalogued voice has a CN file)
    Cn,
    /// Japanese
    Jp,
    /// English
    En,
}

impl SpokenLang {
    /// All spoken languages, in catalog order (CN first: it is mandatory)
    pub const ALL: [SpokenLang; 3] = [SpokenLang::Cn, SpokenLang::Jp, SpokenLang::En];

    /// Two-letter uppercase code used in wiki file titles
    pub fn code(self) -> &'static str {
        match self {
            SpokenLang::Cn => "CN",
            SpokenLang::Jp => "JP",
            SpokenLang::En => "EN",
        }
    }

    /// Lowercase key used in the persistent store and page templates
    pub fn key(self) -> &'static str {
        match self {
            SpokenLang::Cn => "cn",
            SpokenLang::Jp => "jp",
            SpokenLang::En => "en",
        }
    }

    /// Directory name of the decoded-waveform tree for this language
    pub fn audio_dir(self) -> &'static str {
        match self {
            SpokenLang::Cn => "Chinese",
            SpokenLang::Jp => "Japanese",
            SpokenLang::En => "English",
        }
    }

    /// Basename (without extension) of the XML bank descriptor
    pub fn bank_stem(self) -> &'static str {
        match self {
            SpokenLang::Cn => "cn_banks",
            SpokenLang::Jp => "jp_banks",
            SpokenLang::En => "en_banks",
        }
    }

    /// The UI language whose string table carries this spoken language's
    /// transcription text
    pub fn transcript_lang(self) -> UiLang {
        match self {
            SpokenLang::Cn => UiLang::Zh,
            SpokenLang::Jp => UiLang::Ja,
            SpokenLang::En => UiLang::En,
        }
    }
}

impl fmt::Display for SpokenLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SpokenLang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cn" | "zh" => Ok(SpokenLang::Cn),
            "jp" | "ja" => Ok(SpokenLang::Jp),
            "en" => Ok(SpokenLang::En),
            other => Err(format!("unknown spoken language: {}", other)),
        }
    }
}

/// A language the wiki renders pages and translations in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiLang {
    Zh,
    En,
    Ja,
    Ko,
    Ru,
    De,
    Fr,
    Es,
}

impl UiLang {
    /// All UI languages, in page-rendering order
    pub const ALL: [UiLang; 8] = [
        UiLang::Zh,
        UiLang::En,
        UiLang::Ja,
        UiLang::Ko,
        UiLang::Ru,
        UiLang::De,
        UiLang::Fr,
        UiLang::Es,
    ];

    /// Lowercase key used in UI string files, the store and page subpaths
    pub fn key(self) -> &'static str {
        match self {
            UiLang::Zh => "zh",
            UiLang::En => "en",
            UiLang::Ja => "ja",
            UiLang::Ko => "ko",
            UiLang::Ru => "ru",
            UiLang::De => "de",
            UiLang::Fr => "fr",
            UiLang::Es => "es",
        }
    }
}

impl fmt::Display for UiLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for UiLang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "cn" => Ok(UiLang::Zh),
            "en" => Ok(UiLang::En),
            "ja" | "jp" => Ok(UiLang::Ja),
            "ko" => Ok(UiLang::Ko),
            "ru" => Ok(UiLang::Ru),
            "de" => Ok(UiLang::De),
            "fr" => Ok(UiLang::Fr),
            "es" => Ok(UiLang::Es),
            other => Err(format!("unknown UI language: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spoken_codes_are_wiki_prefixes() {
        assert_eq!(SpokenLang::Cn.code(), "CN");
        assert_eq!(SpokenLang::Jp.code(), "JP");
        assert_eq!(SpokenLang::En.code(), "EN");
    }

    #[test]
    fn spoken_serde_roundtrip() {
        let json = serde_json::to_string(&SpokenLang::Jp).unwrap();
        assert_eq!(json, "\"jp\"");
        let back: SpokenLang = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SpokenLang::Jp);
    }

    #[test]
    fn ja_parses_as_ui_and_spoken() {
        assert_eq!("ja".parse::<UiLang>().unwrap(), UiLang::Ja);
        assert_eq!("ja".parse::<SpokenLang>().unwrap(), SpokenLang::Jp);
    }
}
