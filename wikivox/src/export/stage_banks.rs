//! Stages 2 and 3: bank generator invocations
//!
//! Both stages drive the bank generator through a config file listing the
//! language's bank paths in priority order. Ordering matters: when two
//! banks produce waveforms with overlapping sequential indices, the first
//! one processed claims the canonical file-name slot.

use super::{sort_banks, ExportError, ExportJob, ToolSet};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;
use walkdir::WalkDir;
use wikivox_common::RootLayout;

/// Banks of one job, in deterministic priority-then-name order
fn priority_ordered_banks(job: &ExportJob) -> Result<Vec<PathBuf>, ExportError> {
    let mut banks: Vec<PathBuf> = WalkDir::new(&job.bank_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|x| x.eq_ignore_ascii_case("bnk"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    sort_banks(&mut banks);
    Ok(banks)
}

/// Write the bank list to a config file the generator consumes
fn write_config(banks: &[PathBuf]) -> Result<PathBuf, ExportError> {
    let config = std::env::temp_dir().join(format!("wikivox_banks_{}.txt", uuid::Uuid::new_v4()));
    let mut content = String::new();
    for bank in banks {
        content.push_str(&bank.display().to_string());
        content.push('\n');
    }
    std::fs::write(&config, content)?;
    Ok(config)
}

/// Run the bank generator with explicit cwd and argument list
async fn run_generator(
    tools: &ToolSet,
    job: &ExportJob,
    mode_args: &[&str],
    config: PathBuf,
) -> Result<(), ExportError> {
    let lang = job.lang.label().to_string();
    let tool = tools.bank_tool.clone();
    let cwd = job.bank_dir.clone();
    let mode_args: Vec<String> = mode_args.iter().map(|s| s.to_string()).collect();

    let output = tokio::task::spawn_blocking(move || {
        Command::new(&tool)
            .current_dir(&cwd)
            .args(&mode_args)
            .arg("-b")
            .arg(&config)
            .output()
    })
    .await
    .map_err(|e| ExportError::Join(e.to_string()))?
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExportError::ToolMissing(tools.bank_tool.clone())
        } else {
            ExportError::Io(e)
        }
    })?;

    if !output.status.success() {
        return Err(ExportError::ToolFailed {
            tool: tools.bank_tool.clone(),
            lang,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

/// Stage 2: generate the XML descriptor in the job's own bank directory.
/// Each job writes only under its bank_dir, so jobs run concurrently;
/// the move into the shared central directory is [`install_xml`],
/// performed serially by the caller.
pub async fn generate_xml(tools: &ToolSet, job: &ExportJob) -> Result<(), ExportError> {
    let banks = priority_ordered_banks(job)?;
    if banks.is_empty() {
        debug!(lang = job.lang.label(), "No banks, XML stage skipped");
        return Ok(());
    }
    let config = write_config(&banks)?;
    let result = run_generator(tools, job, &["-g", "-go", "xml"], config.clone()).await;
    let _ = std::fs::remove_file(&config);
    result
}

/// Move the generated banks.xml into the central banks directory.
/// No-op for jobs whose XML stage was skipped.
pub fn install_xml(job: &ExportJob, layout: &RootLayout) -> Result<(), ExportError> {
    let produced = job.bank_dir.join("banks.xml");
    if !produced.exists() {
        return Ok(());
    }
    let central = layout.banks_dir().join(&job.xml_name);
    std::fs::create_dir_all(layout.banks_dir())?;
    std::fs::rename(&produced, &central)?;
    debug!(lang = job.lang.label(), xml = %central.display(), "Bank XML in place");
    Ok(())
}

/// Stage 3: generate TXTP play-lists under `<bank_dir>/txtp/`
pub async fn generate_txtp(tools: &ToolSet, job: &ExportJob) -> Result<(), ExportError> {
    let banks = priority_ordered_banks(job)?;
    if banks.is_empty() {
        debug!(lang = job.lang.label(), "No banks, TXTP stage skipped");
        return Ok(());
    }
    let config = write_config(&banks)?;
    let result = run_generator(tools, job, &["-g", "-go", "txtp"], config.clone()).await;
    let _ = std::fs::remove_file(&config);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportLang;
    use wikivox_common::SpokenLang;

    #[test]
    fn config_lists_banks_in_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let bank_dir = dir.path().join("cn");
        std::fs::create_dir_all(&bank_dir).unwrap();
        for name in ["A_org.bnk", "A.bnk", "A_original.bnk", "notes.txt"] {
            std::fs::write(bank_dir.join(name), b"").unwrap();
        }
        let job = ExportJob {
            lang: ExportLang::Spoken(SpokenLang::Cn),
            bank_dir,
            xml_name: "cn_banks.xml".to_string(),
            wav_dir: dir.path().join("wav"),
        };

        let banks = priority_ordered_banks(&job).unwrap();
        let names: Vec<_> = banks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A_original.bnk", "A.bnk", "A_org.bnk"]);

        let config = write_config(&banks).unwrap();
        let content = std::fs::read_to_string(&config).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("A_original.bnk"));
        std::fs::remove_file(config).unwrap();
    }

    #[test]
    fn install_moves_xml_and_skips_absent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RootLayout::new(dir.path().join("root"));
        let bank_dir = dir.path().join("cn");
        std::fs::create_dir_all(&bank_dir).unwrap();
        let job = ExportJob {
            lang: ExportLang::Spoken(SpokenLang::Cn),
            bank_dir: bank_dir.clone(),
            xml_name: "cn_banks.xml".to_string(),
            wav_dir: dir.path().join("wav"),
        };

        // Skipped XML stage leaves nothing behind; install is a no-op
        install_xml(&job, &layout).unwrap();
        assert!(!layout.banks_dir().join("cn_banks.xml").exists());

        std::fs::write(bank_dir.join("banks.xml"), b"<banks/>").unwrap();
        install_xml(&job, &layout).unwrap();
        assert!(layout.banks_dir().join("cn_banks.xml").exists());
        assert!(!bank_dir.join("banks.xml").exists());
    }
}
