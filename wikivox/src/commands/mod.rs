//! Subcommand implementations
//!
//! Each public function here backs one CLI subcommand. They load what they
//! need from the root folder, drive the services, and report through
//! tracing; the binary in `main.rs` only parses arguments and dispatches.

use crate::export::{BankExporter, ExportJob, ToolSet};
use crate::models::Voice;
use crate::pages::{self, PageRenderer};
use crate::services::{BankIndex, EventResolver, Transcoder, UploadOrchestrator, WaveformCatalog};
use crate::store;
use crate::tables::{GameTables, UiStrings};
use crate::wiki::{DuplicatePolicy, MediaWikiClient, WikiRepo};
use anyhow::{bail, Context};
use std::collections::BTreeMap;
use tracing::{info, warn};
use wikivox_common::{RootLayout, Settings, SpokenLang, UiLang};

/// Everything the catalog-consuming commands need, loaded once
pub struct Pipeline {
    pub tables: GameTables,
    pub strings: UiStrings,
    pub catalog: crate::services::VoiceCatalog,
}

impl Pipeline {
    /// Load tables and strings, index every language's bank XML, scan the
    /// decoded waveform directories, and build the voice catalog.
    pub fn load(layout: &RootLayout) -> anyhow::Result<Self> {
        let tables = GameTables::load(layout).context("loading game tables")?;
        let strings = UiStrings::load(layout).context("loading UI strings")?;

        let mut indexes = BTreeMap::new();
        let mut waveforms = BTreeMap::new();
        for lang in SpokenLang::ALL {
            let index = BankIndex::from_xml(&layout.bank_xml(lang))
                .with_context(|| format!("indexing {} bank", lang.code()))?;
            indexes.insert(lang, index);
            waveforms.insert(lang, WaveformCatalog::from_dir(&layout.audio_dir(lang)));
        }

        let mut resolvers = BTreeMap::new();
        for lang in SpokenLang::ALL {
            resolvers.insert(
                lang,
                EventResolver::new(layout, &indexes[&lang], &waveforms[&lang]),
            );
        }

        let catalog = crate::services::VoiceCatalog::build(&tables, &strings, &resolvers)
            .context("building voice catalog")?;
        info!(
            voices = catalog.voices().count(),
            triggers = catalog.triggers().len(),
            "Voice catalog built"
        );
        Ok(Self {
            tables,
            strings,
            catalog,
        })
    }

    /// Display name of a character, preferring the wiki's native language
    pub fn character_name(&self, role: u32) -> String {
        let key = self
            .tables
            .roles
            .get(&role)
            .map(|r| r.name_key.as_str())
            .unwrap_or("");
        self.strings
            .get(UiLang::Zh, key)
            .or_else(|| self.strings.get(UiLang::En, key))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Role {}", role))
    }

    /// Roles matching an optional character-name filter
    pub fn select_roles(&self, character: Option<&str>) -> anyhow::Result<Vec<u32>> {
        let all = self.catalog.roles();
        match character {
            None => Ok(all.into_iter().collect()),
            Some(name) => {
                let matched: Vec<u32> = all
                    .into_iter()
                    .filter(|&r| self.character_name(r) == name)
                    .collect();
                if matched.is_empty() {
                    bail!("no character named '{}'", name);
                }
                Ok(matched)
            }
        }
    }

    /// The character's snapshot with previous editor text merged in
    fn merged_snapshot(&self, layout: &RootLayout, role: u32) -> anyhow::Result<store::Snapshot> {
        let previous = store::load_snapshot(&layout.store_file(role))?;
        let current = store::snapshot_from_catalog(&self.catalog, role);
        Ok(store::merge_snapshots(current, previous, false)?)
    }
}

/// `gen`: run the bank export (unless skipped), rebuild the catalog, and
/// merge it into the persistent store.
pub async fn generate(
    layout: &RootLayout,
    skip_export: bool,
    discard_non_local: bool,
) -> anyhow::Result<()> {
    if skip_export {
        info!("Bank export skipped");
    } else {
        let tools = ToolSet::discover()?;
        let jobs = ExportJob::standard(layout);
        let exporter = BankExporter::new(layout.clone(), tools, jobs);
        let failures = exporter.run().await?;
        for (lang, error) in &failures {
            warn!(lang = lang.label(), error = %error, "Export failed for language");
        }
    }

    let pipeline = Pipeline::load(layout)?;
    let written = store::write_merged(layout, &pipeline.catalog, discard_non_local)?;
    info!(characters = written, "Generation finished");
    Ok(())
}

/// Per-character outcome of a push run
#[derive(Debug, Default)]
pub struct PushSummary {
    pub uploaded: usize,
    pub replaced: usize,
    pub differing: usize,
    pub failed: usize,
    pub pages_saved: usize,
    pub notes: Vec<String>,
}

/// Push one character: reconcile audio files, then render and save its
/// pages in every available UI language.
pub async fn push_role<W: WikiRepo + Sync>(
    repo: &W,
    transcoder: &Transcoder,
    layout: &RootLayout,
    pipeline: &Pipeline,
    role: u32,
    dry_run: bool,
    force_replace: bool,
    on_duplicate: DuplicatePolicy,
) -> anyhow::Result<PushSummary> {
    let character = pipeline.character_name(role);
    let voices: Vec<&Voice> = pipeline.catalog.voices_for(role).collect();

    let mut orchestrator = UploadOrchestrator::new(repo, transcoder, layout, &character);
    orchestrator.dry_run = dry_run;
    orchestrator.force_replace = force_replace;
    orchestrator.on_duplicate = on_duplicate;
    let report = orchestrator.run(&voices).await?;

    let snapshot = pipeline.merged_snapshot(layout, role)?;
    let mut pages_saved = 0;
    for ui in pipeline.strings.langs() {
        let renderer = PageRenderer::new(&pipeline.catalog, ui);
        let text = renderer.render(role, &snapshot);
        if text.is_empty() {
            continue;
        }
        let title = pages::page_title(&character, ui);
        if dry_run {
            info!(title, "Dry run, page not saved");
            continue;
        }
        if pages::save_if_changed(repo, &title, &text).await? {
            pages_saved += 1;
        }
    }

    Ok(PushSummary {
        uploaded: report.uploaded,
        replaced: report.replaced,
        differing: report.differing,
        failed: report.failed,
        pages_saved,
        notes: report.notes,
    })
}

/// `push`: upload audio and sync pages for one character or all of them
pub async fn push(
    layout: &RootLayout,
    settings: &Settings,
    character: Option<&str>,
    dry_run: bool,
    force_replace: bool,
    on_duplicate: DuplicatePolicy,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(layout)?;
    let roles = pipeline.select_roles(character)?;
    let transcoder = Transcoder::new()?;
    let repo = MediaWikiClient::connect(&settings.wiki).await?;

    let mut total = PushSummary::default();
    for role in roles {
        let summary = push_role(
            &repo,
            &transcoder,
            layout,
            &pipeline,
            role,
            dry_run,
            force_replace,
            on_duplicate,
        )
        .await
        .with_context(|| format!("pushing {}", pipeline.character_name(role)))?;
        total.uploaded += summary.uploaded;
        total.replaced += summary.replaced;
        total.differing += summary.differing;
        total.failed += summary.failed;
        total.pages_saved += summary.pages_saved;
        total.notes.extend(summary.notes);
    }

    for note in &total.notes {
        println!("{}", note);
    }
    println!(
        "uploaded {}, replaced {}, differing {}, failed {}, pages saved {}",
        total.uploaded, total.replaced, total.differing, total.failed, total.pages_saved
    );
    if total.failed > 0 {
        bail!("{} files failed, see log for details", total.failed);
    }
    Ok(())
}

/// Pull one character's wiki edits back into the store. Returns the number
/// of changed fields.
pub async fn pull_role<W: WikiRepo>(
    repo: &W,
    layout: &RootLayout,
    pipeline: &Pipeline,
    role: u32,
) -> anyhow::Result<usize> {
    let character = pipeline.character_name(role);
    let mut snapshot = pipeline.merged_snapshot(layout, role)?;

    let mut changed = 0;
    for ui in pipeline.strings.langs() {
        let title = pages::page_title(&character, ui);
        let Some(text) = repo.get_page(&title).await? else {
            continue;
        };
        let rows = pages::parse_rows(&text);
        changed += pages::reconcile(&mut snapshot, &rows, ui);
    }

    if changed > 0 {
        store::save_snapshot(&layout.store_file(role), &snapshot)?;
    }
    info!(character, changed, "Pull finished");
    Ok(changed)
}

/// `pull`: fold wiki-side editorial changes back into the local store
pub async fn pull(
    layout: &RootLayout,
    settings: &Settings,
    character: Option<&str>,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::load(layout)?;
    let roles = pipeline.select_roles(character)?;
    let repo = MediaWikiClient::connect(&settings.wiki).await?;

    let mut changed = 0;
    for role in roles {
        changed += pull_role(&repo, layout, &pipeline, role).await?;
    }
    println!("{} fields updated from the wiki", changed);
    Ok(())
}

/// `check`: consistency diagnostics over the generated data. Returns the
/// number of problems found.
pub fn check(layout: &RootLayout) -> anyhow::Result<usize> {
    let pipeline = Pipeline::load(layout)?;
    let mut problems = 0;

    for voice in pipeline.catalog.orphan_voices() {
        println!("orphan voice: {} (no trigger references it)", voice.path);
        problems += 1;
    }
    for note in pipeline.catalog.duplicate_attachments() {
        println!("duplicate attachment: {}", note);
        problems += 1;
    }
    for voice in pipeline.catalog.voices() {
        for lang in voice.present_langs() {
            let file = voice.files.get(&lang).cloned().unwrap_or_default();
            let path = layout.audio_dir(lang).join(&file);
            if !path.exists() {
                println!("missing file: {}", path.display());
                problems += 1;
            }
        }
    }

    if problems == 0 {
        println!("no problems found");
    }
    Ok(problems)
}

/// `transcribe`: speech-to-text pass over untranscribed voices. No backend
/// ships with the tool; this surfaces the configuration gap instead of
/// silently doing nothing.
pub fn transcribe(_layout: &RootLayout) -> anyhow::Result<()> {
    bail!("no transcription backend configured; add one under [transcribe] in config.toml")
}

/// `translate`: machine-translation pass over untranslated transcriptions
pub fn translate(_layout: &RootLayout) -> anyhow::Result<()> {
    bail!("no translation backend configured; add one under [translate] in config.toml")
}
