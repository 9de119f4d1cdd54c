//! Bank export orchestration
//!
//! Populates the per-language decoded-waveform directories from raw binary
//! banks. Pure orchestration: the bank generator and the waveform
//! converter do the heavy lifting. Six stages, each a fan-out bounded by
//! CPU count, with a hard barrier between stages:
//!
//! 1. media relocation (SHA-256 skip-if-equal)
//! 2. bank -> XML descriptor (priority-ordered config file)
//! 3. bank -> TXTP play-lists
//! 4. TXTP -> WAV
//! 5. silence prune
//! 6. announcer SFX duplication
//!
//! A failed tool invocation is fatal for its language; the other languages
//! proceed. A missing tool binary aborts the whole run before stage 1.

mod stage_banks;
mod stage_media;
mod stage_wav;

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};
use wikivox_common::{RootLayout, SpokenLang};

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Tool binary not found in PATH; aborts the run
    #[error("Required tool not found in PATH: {0}")]
    ToolMissing(String),

    /// Tool exited non-zero; fatal for the containing language
    #[error("{tool} failed for {lang}: {stderr}")]
    ToolFailed {
        tool: String,
        lang: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    Join(String),
}

/// Spoken languages plus the SFX pseudo-language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportLang {
    Spoken(SpokenLang),
    Sfx,
}

impl ExportLang {
    pub const ALL: [ExportLang; 4] = [
        ExportLang::Spoken(SpokenLang::Cn),
        ExportLang::Spoken(SpokenLang::Jp),
        ExportLang::Spoken(SpokenLang::En),
        ExportLang::Sfx,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExportLang::Spoken(l) => l.code(),
            ExportLang::Sfx => "SFX",
        }
    }
}

/// Per-language export job: where banks live, what the central XML is
/// called, where the waveforms land.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub lang: ExportLang,
    /// Directory holding this language's .bnk files
    pub bank_dir: PathBuf,
    /// Basename of the XML descriptor in the central banks directory
    pub xml_name: String,
    /// Decoded-waveform output directory
    pub wav_dir: PathBuf,
}

impl ExportJob {
    /// Standard jobs for a layout: three spoken languages plus SFX
    pub fn standard(layout: &RootLayout) -> Vec<ExportJob> {
        ExportLang::ALL
            .into_iter()
            .map(|lang| {
                let (bank_sub, xml_name, wav_dir) = match lang {
                    ExportLang::Spoken(l) => (
                        l.audio_dir().to_ascii_lowercase(),
                        format!("{}.xml", l.bank_stem()),
                        layout.audio_dir(l),
                    ),
                    ExportLang::Sfx => (
                        "sfx".to_string(),
                        "sfx_banks.xml".to_string(),
                        layout.sfx_audio_dir(),
                    ),
                };
                ExportJob {
                    lang,
                    bank_dir: layout.root().join("banks_raw").join(bank_sub),
                    xml_name,
                    wav_dir,
                }
            })
            .collect()
    }

    /// Staging directory for relocated media, next to the bank source
    pub fn wem_dir(&self) -> PathBuf {
        self.bank_dir.join("wem")
    }

    /// Source media exported by the game for this language
    pub fn media_dir(&self) -> PathBuf {
        self.bank_dir.join("media")
    }

    /// TXTP play-lists produced by stage 3
    pub fn txtp_dir(&self) -> PathBuf {
        self.bank_dir.join("txtp")
    }
}

/// External tools, discovered once; absence is fatal
#[derive(Debug, Clone)]
pub struct ToolSet {
    /// Bank generator: emits XML descriptors and TXTP play-lists
    pub bank_tool: String,
    /// Waveform converter: TXTP -> WAV
    pub wav_tool: String,
}

impl ToolSet {
    pub fn discover() -> Result<Self, ExportError> {
        Ok(Self {
            bank_tool: probe("wwiser")?,
            wav_tool: probe("vgmstream-cli")?,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self {
            bank_tool: "bank-tool-not-invoked".to_string(),
            wav_tool: "wav-tool-not-invoked".to_string(),
        }
    }
}

fn probe(binary: &str) -> Result<String, ExportError> {
    match Command::new(binary).arg("--help").output() {
        Ok(_) => Ok(binary.to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExportError::ToolMissing(binary.to_string()))
        }
        // The tool exists but rejected --help; still reachable
        Err(_) => Ok(binary.to_string()),
    }
}

/// Bank-list priority: files processed first win the waveform-name slot.
/// The non-skinned `_original` variant must claim the canonical slot;
/// skinned (`org`/`red`) variants come last and get distinct names.
pub fn bank_priority(file_name: &str) -> u8 {
    let lower = file_name.to_ascii_lowercase();
    if lower.contains("_original") {
        0
    } else if lower.contains("org") || lower.contains("red") {
        2
    } else {
        1
    }
}

/// Deterministic bank ordering: ascending priority, name tiebreak
pub fn sort_banks(banks: &mut [PathBuf]) {
    banks.sort_by(|a, b| {
        let (na, nb) = (
            a.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            b.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        );
        bank_priority(&na).cmp(&bank_priority(&nb)).then(na.cmp(&nb))
    });
}

/// The exporter itself: runs all six stages with hard barriers
pub struct BankExporter {
    layout: RootLayout,
    tools: ToolSet,
    jobs: Vec<ExportJob>,
}

impl BankExporter {
    pub fn new(layout: RootLayout, tools: ToolSet, jobs: Vec<ExportJob>) -> Self {
        Self { layout, tools, jobs }
    }

    /// Run the full export. Languages whose tool invocations fail are
    /// dropped from later stages; their error is reported at the end.
    pub async fn run(&self) -> Result<Vec<(ExportLang, ExportError)>, ExportError> {
        let mut failed: Vec<(ExportLang, ExportError)> = Vec::new();
        let mut live: Vec<&ExportJob> = self.jobs.iter().collect();
        let limit = num_cpus::get().clamp(2, 8);

        // Stage 1: media relocation; must finish before any generation
        // reads the staged media
        stage_media::relocate_all(&live).await?;

        // Stage 2: bank -> XML fans out per language (each job writes
        // only under its own bank_dir); the moves into the shared
        // central directory run serially afterwards
        let outcomes: Vec<(&ExportJob, Result<(), ExportError>)> =
            stream::iter(std::mem::take(&mut live))
                .map(|job| async move { (job, stage_banks::generate_xml(&self.tools, job).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
        for (job, result) in outcomes {
            match result.and_then(|()| stage_banks::install_xml(job, &self.layout)) {
                Ok(()) => live.push(job),
                Err(e) => {
                    warn!(lang = job.lang.label(), error = %e, "Bank XML generation failed");
                    failed.push((job.lang, e));
                }
            }
        }

        // Stage 3: bank -> TXTP, fanned out per language
        let outcomes: Vec<(&ExportJob, Result<(), ExportError>)> =
            stream::iter(std::mem::take(&mut live))
                .map(|job| async move { (job, stage_banks::generate_txtp(&self.tools, job).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
        for (job, result) in outcomes {
            match result {
                Ok(()) => live.push(job),
                Err(e) => {
                    warn!(lang = job.lang.label(), error = %e, "TXTP generation failed");
                    failed.push((job.lang, e));
                }
            }
        }

        // Stage 4: TXTP -> WAV, fanned out per language and per file
        let outcomes: Vec<(&ExportJob, Result<Vec<PathBuf>, ExportError>)> =
            stream::iter(std::mem::take(&mut live))
                .map(|job| async move { (job, stage_wav::convert_job(&self.tools, job).await) })
                .buffer_unordered(limit)
                .collect()
                .await;
        let mut produced: Vec<PathBuf> = Vec::new();
        for (job, result) in outcomes {
            match result {
                Ok(mut wavs) => {
                    produced.append(&mut wavs);
                    live.push(job);
                }
                Err(e) => {
                    warn!(lang = job.lang.label(), error = %e, "WAV conversion failed");
                    failed.push((job.lang, e));
                }
            }
        }

        // Stage 5: silence prune over everything stage 4 produced
        let pruned = stage_wav::prune_silent(produced).await?;

        // Stage 6: announcer fix-up from the SFX directory
        let sfx_dir = self
            .jobs
            .iter()
            .find(|j| j.lang == ExportLang::Sfx)
            .map(|j| j.wav_dir.clone());
        if let Some(sfx_dir) = sfx_dir {
            stage_wav::announcer_fixup(&sfx_dir, &self.layout)?;
        }

        info!(
            languages = live.len(),
            failed = failed.len(),
            pruned,
            "Bank export finished"
        );
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_original_first_skins_last() {
        let mut banks = vec![
            PathBuf::from("A_org.bnk"),
            PathBuf::from("A.bnk"),
            PathBuf::from("A_original.bnk"),
        ];
        sort_banks(&mut banks);
        assert_eq!(
            banks,
            vec![
                PathBuf::from("A_original.bnk"),
                PathBuf::from("A.bnk"),
                PathBuf::from("A_org.bnk"),
            ]
        );
    }

    #[test]
    fn ties_break_by_name() {
        let mut banks = vec![
            PathBuf::from("B.bnk"),
            PathBuf::from("A.bnk"),
            PathBuf::from("C_red.bnk"),
            PathBuf::from("B_red.bnk"),
        ];
        sort_banks(&mut banks);
        assert_eq!(
            banks,
            vec![
                PathBuf::from("A.bnk"),
                PathBuf::from("B.bnk"),
                PathBuf::from("B_red.bnk"),
                PathBuf::from("C_red.bnk"),
            ]
        );
    }

    #[tokio::test]
    async fn run_with_no_banks_reports_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RootLayout::new(dir.path());
        let jobs = ExportJob::standard(&layout);
        let exporter = BankExporter::new(layout, ToolSet::fake(), jobs);

        // Every language skips every stage; the tools are never invoked
        let failed = exporter.run().await.unwrap();
        assert!(failed.is_empty());
    }

    #[test]
    fn standard_jobs_cover_sfx() {
        let layout = RootLayout::new("/tmp/export");
        let jobs = ExportJob::standard(&layout);
        assert_eq!(jobs.len(), 4);
        assert!(jobs.iter().any(|j| j.lang == ExportLang::Sfx));
        // Staging and output paths partition by language
        let wems: std::collections::BTreeSet<_> =
            jobs.iter().map(|j| j.wem_dir()).collect();
        assert_eq!(wems.len(), 4);
    }
}
