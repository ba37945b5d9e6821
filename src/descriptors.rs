//! Threat descriptor discovery in the download folder.

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use regex::Regex;
use std::path::{Path, PathBuf};

use yarasmith_core::ThreatDescriptor;
use yarasmith_reports::SkipEntry;

use crate::config::YarasmithConfig;

pub const STAGE: &str = "descriptor";

/// Descriptor files read from one folder.
#[derive(Debug, Default)]
pub struct DescriptorScan {
    /// Highest sequence number first.
    pub descriptors: Vec<ThreatDescriptor>,
    pub skipped: Vec<SkipEntry>,
}

pub struct DescriptorSource {
    folder: PathBuf,
    name_pattern: Regex,
    extension: String,
    max_bytes: u64,
}

impl DescriptorSource {
    /// `file_pattern` must match the whole file stem and capture the prefix
    /// and the sequence number.
    pub fn new(folder: impl Into<PathBuf>, file_pattern: &str, extension: &str, max_kb: u64) -> Result<Self> {
        let name_pattern = Regex::new(&format!("^(?:{})$", file_pattern))
            .with_context(|| format!("Invalid descriptor file pattern: {}", file_pattern))?;
        if name_pattern.captures_len() < 3 {
            return Err(anyhow!(
                "Descriptor file pattern needs a prefix group and a number group: {}",
                file_pattern
            ));
        }

        Ok(Self {
            folder: folder.into(),
            name_pattern,
            extension: extension.trim_start_matches('.').to_string(),
            max_bytes: max_kb.saturating_mul(1024),
        })
    }

    pub fn from_config(config: &YarasmithConfig) -> Result<Self> {
        Self::new(
            &config.paths.download_folder,
            &config.paths.file_pattern,
            &config.paths.file_extension,
            config.generation.skip_files_larger_than_kb,
        )
    }

    pub fn scan(&self) -> Result<DescriptorScan> {
        if !self.folder.is_dir() {
            return Err(anyhow!(
                "Download folder does not exist: {}",
                self.folder.display()
            ));
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.folder)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == self.extension.as_str()))
            .collect();
        files.sort();

        let mut scan = DescriptorScan::default();
        for path in files {
            match self.read_descriptor(&path) {
                Ok(descriptor) => scan.descriptors.push(descriptor),
                Err(reason) => {
                    debug!("Skipping {}: {}", path.display(), reason);
                    scan.skipped.push(SkipEntry {
                        stage: STAGE.to_string(),
                        id: path.display().to_string(),
                        reason,
                    });
                }
            }
        }

        scan.descriptors
            .sort_by(|a, b| b.number.cmp(&a.number).then_with(|| a.prefix.cmp(&b.prefix)));

        info!(
            "Found {} descriptors in {} ({} skipped)",
            scan.descriptors.len(),
            self.folder.display(),
            scan.skipped.len()
        );
        Ok(scan)
    }

    fn read_descriptor(&self, path: &Path) -> Result<ThreatDescriptor, String> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let caps = self
            .name_pattern
            .captures(&stem)
            .ok_or_else(|| "file name does not match the descriptor pattern".to_string())?;
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let number: u64 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| "file name has no sequence number".to_string())?;

        let size = std::fs::metadata(path).map_err(|e| format!("unreadable: {}", e))?.len();
        if size == 0 {
            return Err("empty file".to_string());
        }
        if size > self.max_bytes {
            return Err(format!("larger than {} KB", self.max_bytes / 1024));
        }

        let body = std::fs::read_to_string(path).map_err(|e| format!("unreadable: {}", e))?;
        if body.trim().is_empty() {
            return Err("empty file".to_string());
        }

        Ok(ThreatDescriptor::new(prefix, number, body))
    }
}
