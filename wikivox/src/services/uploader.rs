//! Upload orchestration
//!
//! For each voice and spoken language, reconcile the local decoded
//! waveform with its wiki-hosted counterpart: upload when missing,
//! acoustically compare when both exist, and never touch remote-only
//! files. Content-aware and idempotent: a second run with no upstream
//! change performs no edits.

use crate::models::Voice;
use crate::services::acoustic;
use crate::services::transcoder::Transcoder;
use crate::wiki::{DuplicatePolicy, UploadOutcome, UploadRequest, WikiError, WikiRepo};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use wikivox_common::{RootLayout, SpokenLang};

/// Upload orchestration errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Wiki error: {0}")]
    Wiki(#[from] WikiError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// End-of-run tally
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: usize,
    pub replaced: usize,
    pub already_present: usize,
    /// Acoustically different but left alone (neither dry-run nor replace)
    pub differing: usize,
    /// Remote-only files left untouched
    pub remote_only: usize,
    /// Local files skipped after a transcode or analysis failure
    pub failed: usize,
    /// Human-readable notes for dry-run and diagnostics output
    pub notes: Vec<String>,
}

/// Per-task outcome, folded into the report serially
enum TaskOutcome {
    Uploaded,
    Replaced,
    AlreadyPresent,
    Differing(String),
    Failed(String),
    /// Note-only: recorded but counted nowhere (dry-run planned actions)
    Noted(String),
    /// Duplicate settled by redirect or rename; the title now resolves
    Resolved(String),
    Skipped,
}

/// A cached transcode is only reusable while the source waveform has
/// not changed underneath it.
fn cache_is_fresh(ogg: &Path, wav: &Path) -> bool {
    let (Ok(ogg_meta), Ok(wav_meta)) = (std::fs::metadata(ogg), std::fs::metadata(wav)) else {
        return false;
    };
    match (ogg_meta.modified(), wav_meta.modified()) {
        (Ok(ogg_time), Ok(wav_time)) => ogg_time >= wav_time,
        _ => false,
    }
}

/// Drives uploads for one character's voices
pub struct UploadOrchestrator<'a, W: WikiRepo> {
    repo: &'a W,
    transcoder: &'a Transcoder,
    layout: &'a RootLayout,
    character: &'a str,
    pub dry_run: bool,
    pub force_replace: bool,
    pub on_duplicate: DuplicatePolicy,
}

impl<'a, W: WikiRepo + Sync> UploadOrchestrator<'a, W> {
    pub fn new(
        repo: &'a W,
        transcoder: &'a Transcoder,
        layout: &'a RootLayout,
        character: &'a str,
    ) -> Self {
        Self {
            repo,
            transcoder,
            layout,
            character,
            dry_run: false,
            force_replace: false,
            on_duplicate: DuplicatePolicy::Ignore,
        }
    }

    /// Category holding the character's audio files on the wiki
    pub fn category(&self) -> String {
        format!("{} audio", self.character)
    }

    /// Reconcile every voice × spoken language against the wiki
    pub async fn run(&self, voices: &[&Voice]) -> Result<UploadReport, UploadError> {
        let category = self.category();
        // Category membership is the authoritative remote set
        let remote = self.repo.category_files(&category).await?;
        debug!(
            character = self.character,
            remote = remote.len(),
            "Fetched remote audio set"
        );

        let mut tasks = Vec::new();
        for voice in voices {
            for lang in voice.present_langs() {
                tasks.push((*voice, lang));
            }
        }

        let limit = num_cpus::get().clamp(2, 8);
        let category = category.as_str();
        let outcomes: Vec<TaskOutcome> = stream::iter(tasks)
            .map(|(voice, lang)| {
                let remote_has = remote.contains(&voice.wiki_file_name(lang));
                async move { self.reconcile_one(voice, lang, remote_has, category).await }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = UploadReport::default();
        report.remote_only = remote
            .iter()
            .filter(|name| {
                !voices.iter().any(|v| {
                    SpokenLang::ALL
                        .into_iter()
                        .any(|l| v.wiki_file_name(l) == **name)
                })
            })
            .count();

        for outcome in outcomes {
            match outcome {
                TaskOutcome::Uploaded => report.uploaded += 1,
                TaskOutcome::Replaced => report.replaced += 1,
                TaskOutcome::AlreadyPresent => report.already_present += 1,
                TaskOutcome::Differing(note) => {
                    report.differing += 1;
                    report.notes.push(note);
                }
                TaskOutcome::Failed(note) => {
                    report.failed += 1;
                    report.notes.push(note);
                }
                TaskOutcome::Noted(note) => report.notes.push(note),
                TaskOutcome::Resolved(note) => {
                    report.already_present += 1;
                    report.notes.push(note);
                }
                TaskOutcome::Skipped => {}
            }
        }

        info!(
            character = self.character,
            uploaded = report.uploaded,
            replaced = report.replaced,
            differing = report.differing,
            failed = report.failed,
            "Upload run finished"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        voice: &Voice,
        lang: SpokenLang,
        remote_has: bool,
        category: &str,
    ) -> TaskOutcome {
        let wiki_name = voice.wiki_file_name(lang);
        let local_wav = self.local_wav(voice, lang);
        if !local_wav.exists() {
            // Recoverable: localization listed but file gone from exports
            warn!(file = %local_wav.display(), "Local waveform missing, skipped");
            return TaskOutcome::Failed(format!("missing local file {}", local_wav.display()));
        }

        if !remote_has {
            return self.upload_missing(&wiki_name, &local_wav, category).await;
        }
        self.compare_existing(&wiki_name, &local_wav, category).await
    }

    fn local_wav(&self, voice: &Voice, lang: SpokenLang) -> PathBuf {
        let file = voice.files.get(&lang).cloned().unwrap_or_default();
        self.layout.audio_dir(lang).join(file)
    }

    /// Absent on the wiki: transcode and upload. The transcoded copy stays
    /// in the cache for later comparison runs.
    async fn upload_missing(
        &self,
        wiki_name: &str,
        local_wav: &std::path::Path,
        category: &str,
    ) -> TaskOutcome {
        if self.dry_run {
            return TaskOutcome::Noted(format!("would upload {}", wiki_name));
        }

        let ogg_path = self.layout.cache_dir().join("upload").join(wiki_name);
        let ogg = if cache_is_fresh(&ogg_path, local_wav) {
            ogg_path
        } else {
            match self.transcoder.wav_to_ogg(local_wav, &ogg_path).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(file = wiki_name, error = %e, "Transcode failed, file skipped");
                    return TaskOutcome::Failed(format!("transcode failed for {}: {}", wiki_name, e));
                }
            }
        };

        let request = UploadRequest {
            file_name: wiki_name.to_string(),
            local_path: ogg,
            text: format!("[[Category:{}]]", category),
            comment: "Sync voice line from game data".to_string(),
            ignore_warnings: false,
        };
        match self.repo.upload_file(&request).await {
            Ok(UploadOutcome::Uploaded) => TaskOutcome::Uploaded,
            Ok(UploadOutcome::AlreadyExists) => TaskOutcome::AlreadyPresent,
            Ok(UploadOutcome::WasDeleted) => {
                debug!(file = wiki_name, "Previously deleted on wiki, skipped");
                TaskOutcome::Skipped
            }
            Ok(UploadOutcome::DuplicateOf(original)) => {
                self.resolve_duplicate(wiki_name, &original).await
            }
            Err(e) => TaskOutcome::Failed(format!("upload failed for {}: {}", wiki_name, e)),
        }
    }

    /// Identical content already hosted under another title. The policy
    /// decides whether to note it, redirect to it, or rename it.
    async fn resolve_duplicate(&self, wiki_name: &str, original: &str) -> TaskOutcome {
        match self.on_duplicate {
            DuplicatePolicy::Ignore => {
                TaskOutcome::Differing(format!("{} duplicates {}", wiki_name, original))
            }
            DuplicatePolicy::Redirect => {
                let text = format!("#REDIRECT [[File:{}]]", original);
                let save = self
                    .repo
                    .save_page(
                        &format!("File:{}", wiki_name),
                        &text,
                        "Redirect to the identical existing file",
                    )
                    .await;
                match save {
                    Ok(()) => {
                        TaskOutcome::Resolved(format!("{} redirected to {}", wiki_name, original))
                    }
                    Err(e) => {
                        TaskOutcome::Failed(format!("redirect failed for {}: {}", wiki_name, e))
                    }
                }
            }
            DuplicatePolicy::RenameExisting => {
                let moved = self
                    .repo
                    .move_page(
                        &format!("File:{}", original),
                        &format!("File:{}", wiki_name),
                        "Rename to the canonical voice file title",
                    )
                    .await;
                match moved {
                    Ok(()) => {
                        TaskOutcome::Resolved(format!("{} renamed to {}", original, wiki_name))
                    }
                    Err(e) => {
                        TaskOutcome::Failed(format!("rename failed for {}: {}", original, e))
                    }
                }
            }
        }
    }

    /// Present on both sides: download, decode, compare acoustically.
    /// Only the strict threshold counts as equal; below it is reported,
    /// not auto-resolved.
    async fn compare_existing(
        &self,
        wiki_name: &str,
        local_wav: &std::path::Path,
        category: &str,
    ) -> TaskOutcome {
        let download = self.layout.cache_dir().join("remote").join(wiki_name);
        if let Err(e) = self.repo.download_file(wiki_name, &download).await {
            return TaskOutcome::Failed(format!("download failed for {}: {}", wiki_name, e));
        }

        let remote_wav = download.with_extension("wav");
        if let Err(e) = self.transcoder.to_wav(&download, &remote_wav).await {
            return TaskOutcome::Failed(format!("decode failed for {}: {}", wiki_name, e));
        }

        let local = local_wav.to_path_buf();
        let equal = tokio::task::spawn_blocking(move || {
            acoustic::acoustic_equal(&local, &remote_wav)
        })
        .await;
        let equal = match equal {
            Ok(Ok(equal)) => equal,
            Ok(Err(e)) => {
                return TaskOutcome::Failed(format!("analysis failed for {}: {}", wiki_name, e))
            }
            Err(e) => return TaskOutcome::Failed(format!("analysis task failed: {}", e)),
        };

        if equal {
            return TaskOutcome::AlreadyPresent;
        }
        if self.dry_run {
            return TaskOutcome::Differing(format!("{} differs from wiki copy", wiki_name));
        }
        if !self.force_replace {
            return TaskOutcome::Differing(format!(
                "{} differs from wiki copy (use force-replace to overwrite)",
                wiki_name
            ));
        }

        let ogg_path = self.layout.cache_dir().join("upload").join(wiki_name);
        let ogg = match self.transcoder.wav_to_ogg(local_wav, &ogg_path).await {
            Ok(path) => path,
            Err(e) => {
                return TaskOutcome::Failed(format!("transcode failed for {}: {}", wiki_name, e))
            }
        };
        let request = UploadRequest {
            file_name: wiki_name.to_string(),
            local_path: ogg,
            text: format!("[[Category:{}]]", category),
            comment: "Replace changed voice line".to_string(),
            ignore_warnings: true,
        };
        match self.repo.upload_file(&request).await {
            Ok(_) => TaskOutcome::Replaced,
            Err(e) => TaskOutcome::Failed(format!("re-upload failed for {}: {}", wiki_name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::Mutex;
    use wikivox_common::RootLayout;

    struct FakeRepo {
        remote: BTreeSet<String>,
        uploads: Mutex<Vec<String>>,
        /// When set, every upload reports this file as identical content
        duplicate_of: Option<String>,
        pages: Mutex<Vec<(String, String)>>,
        moves: Mutex<Vec<(String, String)>>,
    }

    impl FakeRepo {
        fn with_remote(names: &[&str]) -> Self {
            Self {
                remote: names.iter().map(|s| s.to_string()).collect(),
                uploads: Mutex::new(Vec::new()),
                duplicate_of: None,
                pages: Mutex::new(Vec::new()),
                moves: Mutex::new(Vec::new()),
            }
        }

        fn with_duplicate(original: &str) -> Self {
            let mut repo = Self::with_remote(&[]);
            repo.duplicate_of = Some(original.to_string());
            repo
        }
    }

    impl WikiRepo for FakeRepo {
        async fn get_page(&self, _title: &str) -> Result<Option<String>, WikiError> {
            Ok(None)
        }

        async fn save_page(
            &self,
            title: &str,
            text: &str,
            _summary: &str,
        ) -> Result<(), WikiError> {
            self.pages
                .lock()
                .unwrap()
                .push((title.to_string(), text.to_string()));
            Ok(())
        }

        async fn category_files(&self, _category: &str) -> Result<BTreeSet<String>, WikiError> {
            Ok(self.remote.clone())
        }

        async fn upload_file(&self, request: &UploadRequest) -> Result<UploadOutcome, WikiError> {
            self.uploads.lock().unwrap().push(request.file_name.clone());
            match &self.duplicate_of {
                Some(original) => Ok(UploadOutcome::DuplicateOf(original.clone())),
                None => Ok(UploadOutcome::Uploaded),
            }
        }

        async fn download_file(&self, file_name: &str, _dest: &Path) -> Result<(), WikiError> {
            Err(WikiError::FileNotFound(file_name.to_string()))
        }

        async fn move_page(&self, from: &str, to: &str, _reason: &str) -> Result<(), WikiError> {
            self.moves
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_string()));
            Ok(())
        }
    }

    fn voice(path: &str, file: &str) -> Voice {
        let mut v = Voice {
            ids: vec![10],
            role: 1021,
            path: path.to_string(),
            ..Default::default()
        };
        v.files.insert(SpokenLang::Cn, file.to_string());
        v
    }

    fn fixture() -> (tempfile::TempDir, RootLayout, Transcoder) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RootLayout::new(dir.path());
        (dir, layout, Transcoder::with_binary("ffmpeg"))
    }

    #[tokio::test]
    async fn missing_local_file_is_counted_not_fatal() {
        let (_dir, layout, transcoder) = fixture();
        let repo = FakeRepo::with_remote(&[]);
        let orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");

        let v = voice("Vo_lee_105", "VO_CN-0001-a.wav");
        let report = orchestrator.run(&[&v]).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.uploaded, 0);
        assert!(report.notes[0].contains("missing local file"));
    }

    /// Writes a local waveform and a fresher cached transcode so upload
    /// paths run without invoking the transcoder binary.
    fn prime_cache(layout: &RootLayout, wav_file: &str, wiki_name: &str) {
        let cn_dir = layout.audio_dir(SpokenLang::Cn);
        std::fs::create_dir_all(&cn_dir).unwrap();
        std::fs::write(cn_dir.join(wav_file), b"riff").unwrap();
        let cache = layout.cache_dir().join("upload");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join(wiki_name), b"OggS").unwrap();
    }

    #[tokio::test]
    async fn dry_run_plans_uploads_without_performing_them() {
        let (_dir, layout, transcoder) = fixture();
        let cn_dir = layout.audio_dir(SpokenLang::Cn);
        std::fs::create_dir_all(&cn_dir).unwrap();
        std::fs::write(cn_dir.join("VO_CN-0001-a.wav"), b"riff").unwrap();
        std::fs::write(cn_dir.join("VO_CN-0002-b.wav"), b"riff").unwrap();

        let repo = FakeRepo::with_remote(&[]);
        let mut orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");
        orchestrator.dry_run = true;

        let a = voice("Vo_lee_105", "VO_CN-0001-a.wav");
        let b = voice("Vo_lee_106", "VO_CN-0002-b.wav");
        let report = orchestrator.run(&[&a, &b]).await.unwrap();
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.failed, 0);
        assert!(report.notes.iter().any(|n| n.contains("would upload CN_Vo_lee_105.ogg")));
        assert!(report.notes.iter().any(|n| n.contains("would upload CN_Vo_lee_106.ogg")));
        assert!(repo.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_is_noted_under_ignore_policy() {
        let (_dir, layout, transcoder) = fixture();
        prime_cache(&layout, "VO_CN-0001-a.wav", "CN_Vo_lee_105.ogg");

        let repo = FakeRepo::with_duplicate("CN_Vo_old_101.ogg");
        let orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");

        let v = voice("Vo_lee_105", "VO_CN-0001-a.wav");
        let report = orchestrator.run(&[&v]).await.unwrap();
        assert_eq!(report.differing, 1);
        assert!(report.notes[0].contains("duplicates CN_Vo_old_101.ogg"));
        assert!(repo.pages.lock().unwrap().is_empty());
        assert!(repo.moves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn redirect_policy_points_duplicate_at_original() {
        let (_dir, layout, transcoder) = fixture();
        prime_cache(&layout, "VO_CN-0001-a.wav", "CN_Vo_lee_105.ogg");

        let repo = FakeRepo::with_duplicate("CN_Vo_old_101.ogg");
        let mut orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");
        orchestrator.on_duplicate = DuplicatePolicy::Redirect;

        let v = voice("Vo_lee_105", "VO_CN-0001-a.wav");
        let report = orchestrator.run(&[&v]).await.unwrap();
        assert_eq!(report.already_present, 1);
        assert_eq!(report.differing, 0);
        let pages = repo.pages.lock().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].0, "File:CN_Vo_lee_105.ogg");
        assert_eq!(pages[0].1, "#REDIRECT [[File:CN_Vo_old_101.ogg]]");
    }

    #[tokio::test]
    async fn rename_policy_moves_existing_file_to_new_title() {
        let (_dir, layout, transcoder) = fixture();
        prime_cache(&layout, "VO_CN-0001-a.wav", "CN_Vo_lee_105.ogg");

        let repo = FakeRepo::with_duplicate("CN_Vo_old_101.ogg");
        let mut orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");
        orchestrator.on_duplicate = DuplicatePolicy::RenameExisting;

        let v = voice("Vo_lee_105", "VO_CN-0001-a.wav");
        let report = orchestrator.run(&[&v]).await.unwrap();
        assert_eq!(report.already_present, 1);
        let moves = repo.moves.lock().unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, "File:CN_Vo_old_101.ogg");
        assert_eq!(moves[0].1, "File:CN_Vo_lee_105.ogg");
    }

    #[test]
    fn stale_cached_transcode_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("a.wav");
        let ogg = dir.path().join("a.ogg");
        std::fs::write(&wav, b"riff").unwrap();
        std::fs::write(&ogg, b"OggS").unwrap();
        assert!(cache_is_fresh(&ogg, &wav));

        // Source rewritten after the transcode
        let file = std::fs::OpenOptions::new().write(true).open(&wav).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(60))
            .unwrap();
        assert!(!cache_is_fresh(&ogg, &wav));

        assert!(!cache_is_fresh(dir.path().join("missing.ogg").as_path(), &wav));
    }

    #[tokio::test]
    async fn remote_only_files_are_reported_untouched() {
        let (_dir, layout, transcoder) = fixture();
        let repo = FakeRepo::with_remote(&["CN_Vo_gone_201.ogg"]);
        let orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");

        let report = orchestrator.run(&[]).await.unwrap();
        assert_eq!(report.remote_only, 1);
        assert!(repo.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn category_follows_character_name() {
        let (_dir, layout, transcoder) = fixture();
        let repo = FakeRepo::with_remote(&[]);
        let orchestrator = UploadOrchestrator::new(&repo, &transcoder, &layout, "李");
        assert_eq!(orchestrator.category(), "李 audio");
    }
}
