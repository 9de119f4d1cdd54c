//! Stages 4-6: waveform production, silence pruning, announcer fix-up

use super::{ExportError, ExportJob, ToolSet};
use crate::services::acoustic;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use wikivox_common::{RootLayout, SpokenLang};

/// File-name prefixes of announcer lines living in the SFX bank
const ANNOUNCER_PREFIXES: &[&str] = &["Announcer_", "Vo_Announcer"];

/// Stage 4: fan out the waveform converter across one job's TXTP files.
/// Each invocation emits exactly one WAV into the job's output directory.
pub async fn convert_job(tools: &ToolSet, job: &ExportJob) -> Result<Vec<PathBuf>, ExportError> {
    let txtp_dir = job.txtp_dir();
    if !txtp_dir.is_dir() {
        debug!(lang = job.lang.label(), "No TXTP directory, conversion skipped");
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(&job.wav_dir)?;

    let txtps: Vec<PathBuf> = WalkDir::new(&txtp_dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|x| x.eq_ignore_ascii_case("txtp"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();

    let lang = job.lang.label().to_string();
    let limit = num_cpus::get();
    let results: Vec<Result<PathBuf, ExportError>> = stream::iter(txtps)
        .map(|txtp| {
            let tool = tools.wav_tool.clone();
            let wav_dir = job.wav_dir.clone();
            let lang = lang.clone();
            tokio::task::spawn_blocking(move || convert_one(&tool, &txtp, &wav_dir, &lang))
        })
        .buffer_unordered(limit)
        .map(|joined| joined.map_err(|e| ExportError::Join(e.to_string()))?)
        .collect()
        .await;

    let mut wavs = Vec::new();
    for result in results {
        wavs.push(result?);
    }
    info!(lang = job.lang.label(), wavs = wavs.len(), "WAV conversion finished");
    Ok(wavs)
}

fn convert_one(
    tool: &str,
    txtp: &Path,
    wav_dir: &Path,
    lang: &str,
) -> Result<PathBuf, ExportError> {
    let stem = txtp
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out = wav_dir.join(format!("{}.wav", stem));

    let output = Command::new(tool)
        .current_dir(wav_dir)
        .arg("-o")
        .arg(&out)
        .arg(txtp)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExportError::ToolMissing(tool.to_string())
            } else {
                ExportError::Io(e)
            }
        })?;

    if !output.status.success() {
        return Err(ExportError::ToolFailed {
            tool: tool.to_string(),
            lang: lang.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(out)
}

/// Stage 5: delete WAVs whose mean RMS falls below the silence floor.
/// Some TXTP expansions yield silent files that must never reach the
/// wiki. A per-file analysis failure skips that file and continues.
/// Returns the number of deleted files.
pub async fn prune_silent(wavs: Vec<PathBuf>) -> Result<usize, ExportError> {
    let limit = num_cpus::get();
    let verdicts: Vec<Option<PathBuf>> = stream::iter(wavs)
        .map(|wav| {
            tokio::task::spawn_blocking(move || match acoustic::mean_rms(&wav) {
                Ok(rms) if rms < acoustic::SILENCE_RMS_FLOOR => Some(wav),
                Ok(_) => None,
                Err(e) => {
                    warn!(file = %wav.display(), error = %e, "RMS analysis failed, file kept");
                    None
                }
            })
        })
        .buffer_unordered(limit)
        .map(|joined| joined.unwrap_or(None))
        .collect()
        .await;

    let mut pruned = 0;
    for silent in verdicts.into_iter().flatten() {
        match std::fs::remove_file(&silent) {
            Ok(()) => {
                debug!(file = %silent.display(), "Pruned silent waveform");
                pruned += 1;
            }
            Err(e) => warn!(file = %silent.display(), error = %e, "Could not delete silent file"),
        }
    }
    info!(pruned, "Silence prune finished");
    Ok(pruned)
}

/// Stage 6: announcer lines live in the SFX bank but belong in the
/// per-language waveform directories. Names containing `JP` go to the
/// Japanese directory, all others to Chinese.
pub fn announcer_fixup(sfx_dir: &Path, layout: &RootLayout) -> Result<(), ExportError> {
    if !sfx_dir.is_dir() {
        return Ok(());
    }
    let mut duplicated = 0;
    for entry in WalkDir::new(sfx_dir)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !ANNOUNCER_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let lang = if name.contains("JP") {
            SpokenLang::Jp
        } else {
            SpokenLang::Cn
        };
        let dest_dir = layout.audio_dir(lang);
        std::fs::create_dir_all(&dest_dir)?;
        std::fs::copy(entry.path(), dest_dir.join(&name))?;
        duplicated += 1;
    }
    if duplicated > 0 {
        info!(duplicated, "Announcer fix-up finished");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[f32]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn prune_deletes_all_zero_wav() {
        let dir = tempfile::tempdir().unwrap();
        let silent = dir.path().join("VO_CN-0001-silent.wav");
        let loud = dir.path().join("VO_CN-0002-loud.wav");
        write_wav(&silent, &vec![0.0; 22_050]);
        let tone: Vec<f32> = (0..22_050)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22_050.0).sin())
            .collect();
        write_wav(&loud, &tone);

        let pruned = prune_silent(vec![silent.clone(), loud.clone()]).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(!silent.exists());
        assert!(loud.exists());
        // Survivors satisfy the floor
        assert!(acoustic::mean_rms(&loud).unwrap() >= acoustic::SILENCE_RMS_FLOOR);
    }

    #[test]
    fn announcer_files_split_by_language() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RootLayout::new(dir.path());
        let sfx = layout.sfx_audio_dir();
        std::fs::create_dir_all(&sfx).unwrap();
        std::fs::write(sfx.join("Announcer_Start_JP.wav"), b"jp").unwrap();
        std::fs::write(sfx.join("Announcer_Start.wav"), b"cn").unwrap();
        std::fs::write(sfx.join("Boom.wav"), b"sfx").unwrap();

        announcer_fixup(&sfx, &layout).unwrap();
        assert!(layout.audio_dir(SpokenLang::Jp).join("Announcer_Start_JP.wav").exists());
        assert!(layout.audio_dir(SpokenLang::Cn).join("Announcer_Start.wav").exists());
        assert!(!layout.audio_dir(SpokenLang::Cn).join("Boom.wav").exists());
        assert!(!layout.audio_dir(SpokenLang::En).exists());
    }
}
