//! Categorized rule store and filtered regex store.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use yarasmith_core::rule_text::cve_year;
use yarasmith_core::{RegexCandidate, RejectionReason, RuleCategory, StringCluster};

use crate::error::StoreError;
use crate::filename::{descriptor_id_from_filename, rule_filename};

pub const REGEX_STORE_DIR: &str = "regex-store";
pub const ACCEPTED_FILE: &str = "accepted.jsonl";
pub const REJECTED_FILE: &str = "rejected.jsonl";
pub const MASTER_RULES_DIR: &str = "master-rules";

/// A rule file read back from a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRule {
    pub descriptor_id: String,
    pub path: PathBuf,
    pub text: String,
}

/// One directory per [`RuleCategory`] below a root folder.
#[derive(Debug, Clone)]
pub struct RuleStore {
    root: PathBuf,
    group_by_cve_year: bool,
}

impl RuleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            group_by_cve_year: false,
        }
    }

    /// Place acceptable rules carrying a CVE id under `year-YYYY/`.
    pub fn with_cve_year_grouping(mut self, enabled: bool) -> Self {
        self.group_by_cve_year = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self, category: RuleCategory) -> PathBuf {
        self.root.join(category.bucket_name())
    }

    /// Create the root and every bucket directory.
    pub fn prepare(&self) -> Result<(), StoreError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(StoreError::NotADirectory(self.root.clone()));
        }
        for category in RuleCategory::ALL {
            let dir = self.bucket_dir(category);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Write a rule into its bucket, removing copies left in other buckets
    /// by earlier runs so each rule lives in exactly one place.
    pub fn write(&self, category: RuleCategory, descriptor_id: &str, text: &str) -> Result<PathBuf, StoreError> {
        let filename = rule_filename(descriptor_id);

        let mut dir = self.bucket_dir(category);
        if category == RuleCategory::Acceptable && self.group_by_cve_year {
            if let Some(year) = cve_year(text) {
                dir = dir.join(format!("year-{year}"));
            }
        }
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let target = dir.join(&filename);
        self.remove_stale(&filename, &target)?;

        fs::write(&target, text).map_err(|e| StoreError::io(&target, e))?;
        debug!("Stored {} in {}", descriptor_id, category);
        Ok(target)
    }

    fn remove_stale(&self, filename: &str, keep: &Path) -> Result<(), StoreError> {
        let mut candidates = Vec::new();
        for category in RuleCategory::ALL {
            let dir = self.bucket_dir(category);
            candidates.push(dir.join(filename));
            if category == RuleCategory::Acceptable {
                candidates.extend(year_dirs(&dir).into_iter().map(|year| year.join(filename)));
            }
        }

        for path in candidates {
            if path != keep && path.is_file() {
                fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            }
        }
        Ok(())
    }

    /// Every rule in a bucket, including year subfolders, sorted by path.
    pub fn list(&self, category: RuleCategory) -> Result<Vec<StoredRule>, StoreError> {
        let mut rules = Vec::new();
        for path in rule_files(&self.bucket_dir(category)) {
            let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let descriptor_id = path
                .file_name()
                .map(|n| descriptor_id_from_filename(&n.to_string_lossy()).to_string())
                .unwrap_or_default();
            rules.push(StoredRule {
                descriptor_id,
                path,
                text,
            });
        }
        Ok(rules)
    }

    pub fn count(&self, category: RuleCategory) -> usize {
        rule_files(&self.bucket_dir(category)).len()
    }
}

/// `year-*` subfolders directly below `dir`.
fn year_dirs(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("year-"))
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// `.yar` files below `dir`, sorted. A missing directory has none.
pub fn rule_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "yar"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Line of `accepted.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRegex {
    pub cluster_id: usize,
    pub representative: String,
    pub members: Vec<String>,
    pub pattern: String,
}

/// Line of `rejected.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRegex {
    pub cluster_id: usize,
    pub representative: String,
    pub members: Vec<String>,
    pub pattern: String,
    pub reason: RejectionReason,
}

impl AcceptedRegex {
    pub fn new(cluster: &StringCluster, candidate: &RegexCandidate) -> Self {
        Self {
            cluster_id: cluster.id,
            representative: cluster.representative.clone(),
            members: distinct_members(cluster),
            pattern: candidate.pattern.clone(),
        }
    }
}

impl RejectedRegex {
    /// `None` when the candidate carries no rejection.
    pub fn new(cluster: &StringCluster, candidate: &RegexCandidate) -> Option<Self> {
        Some(Self {
            cluster_id: cluster.id,
            representative: cluster.representative.clone(),
            members: distinct_members(cluster),
            pattern: candidate.pattern.clone(),
            reason: candidate.rejection.clone()?,
        })
    }
}

fn distinct_members(cluster: &StringCluster) -> Vec<String> {
    cluster
        .distinct_values()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// `regex-store/` below the store folder. Contents are rewritten each run.
#[derive(Debug, Clone)]
pub struct RegexStore {
    dir: PathBuf,
}

impl RegexStore {
    pub fn new(store_root: impl AsRef<Path>) -> Self {
        Self {
            dir: store_root.as_ref().join(REGEX_STORE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn master_rules_dir(&self) -> PathBuf {
        self.dir.join(MASTER_RULES_DIR)
    }

    pub fn write_run(&self, accepted: &[AcceptedRegex], rejected: &[RejectedRegex]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        write_jsonl(&self.dir.join(ACCEPTED_FILE), accepted)?;
        write_jsonl(&self.dir.join(REJECTED_FILE), rejected)?;
        Ok(())
    }

    pub fn load_accepted(&self) -> Result<Vec<AcceptedRegex>, StoreError> {
        let path = self.dir.join(ACCEPTED_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| StoreError::io(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| StoreError::Encode {
                path: path.clone(),
                source,
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(|e| StoreError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(|source| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        writer.write_all(b"\n").map_err(|e| StoreError::io(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use yarasmith_core::{ExtractedString, LengthClass};

    #[test]
    fn test_prepare_creates_buckets() {
        let temp = TempDir::new().unwrap();
        let store = RuleStore::new(temp.path().join("store"));
        store.prepare().unwrap();

        for name in ["invalid", "too-trivial", "acceptable", "too-complex"] {
            assert!(temp.path().join("store").join(name).is_dir());
        }
    }

    #[test]
    fn test_prepare_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("occupied");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            RuleStore::new(&file).prepare(),
            Err(StoreError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_rule_moves_between_buckets() {
        let temp = TempDir::new().unwrap();
        let store = RuleStore::new(temp.path());
        store.prepare().unwrap();

        store.write(RuleCategory::Invalid, "exploit_1", "rule a {").unwrap();
        store
            .write(RuleCategory::Acceptable, "exploit_1", "rule a { condition: true }")
            .unwrap();

        assert_eq!(store.count(RuleCategory::Invalid), 0);
        let acceptable = store.list(RuleCategory::Acceptable).unwrap();
        assert_eq!(acceptable.len(), 1);
        assert_eq!(acceptable[0].descriptor_id, "exploit_1");
        assert_eq!(acceptable[0].text, "rule a { condition: true }");
    }

    #[test]
    fn test_cve_year_grouping() {
        let temp = TempDir::new().unwrap();
        let store = RuleStore::new(temp.path()).with_cve_year_grouping(true);
        store.prepare().unwrap();

        let path = store
            .write(
                RuleCategory::Acceptable,
                "exploit_9",
                "rule a { meta: cve_id = \"CVE-2021-44228\" condition: true }",
            )
            .unwrap();
        assert!(path.ends_with("acceptable/year-2021/exploit_9.yar"));

        let path = store
            .write(RuleCategory::TooComplex, "exploit_10", "rule b { meta: cve_id = \"CVE-2020-1\" condition: true }")
            .unwrap();
        assert!(path.ends_with("too-complex/exploit_10.yar"));

        assert_eq!(store.list(RuleCategory::Acceptable).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_copy_in_year_folder_is_removed() {
        let temp = TempDir::new().unwrap();
        let store = RuleStore::new(temp.path()).with_cve_year_grouping(true);
        store.prepare().unwrap();

        let text = "rule a { meta: cve_id = \"CVE-2021-44228\" condition: true }";
        let grouped = store.write(RuleCategory::Acceptable, "exploit_9", text).unwrap();
        assert!(grouped.exists());

        store.write(RuleCategory::TooComplex, "exploit_9", text).unwrap();
        assert!(!grouped.exists());
        assert_eq!(store.count(RuleCategory::Acceptable), 0);
        assert_eq!(store.count(RuleCategory::TooComplex), 1);

        // Moving back keeps exactly one copy
        store.write(RuleCategory::Acceptable, "exploit_9", text).unwrap();
        assert_eq!(store.count(RuleCategory::TooComplex), 0);
        assert_eq!(store.count(RuleCategory::Acceptable), 1);
    }

    #[test]
    fn test_regex_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = RegexStore::new(temp.path());
        let cluster = StringCluster {
            id: 0,
            length_class: LengthClass::Short,
            representative: "malware_v1".to_string(),
            members: vec![
                ExtractedString::text("malware_v1", "r1"),
                ExtractedString::text("malware_v2", "r2"),
                ExtractedString::text("malware_v2", "r3"),
            ],
        };
        let accepted = RegexCandidate::new(0, "malware_v[0-9]", 1).accept();
        let rejected = RegexCandidate::new(0, "malware_v[", 1)
            .reject(RejectionReason::CompileFailure("unclosed class".to_string()));

        store
            .write_run(
                &[AcceptedRegex::new(&cluster, &accepted)],
                &[RejectedRegex::new(&cluster, &rejected).unwrap()],
            )
            .unwrap();

        let loaded = store.load_accepted().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].members, vec!["malware_v1", "malware_v2"]);

        let rejected_text = fs::read_to_string(store.dir().join(REJECTED_FILE)).unwrap();
        assert!(rejected_text.contains("\"kind\":\"compile_failure\""));
        assert_eq!(rejected_text.lines().count(), 1);
    }

    #[test]
    fn test_accepted_candidate_has_no_rejected_record() {
        let cluster = StringCluster {
            id: 1,
            length_class: LengthClass::Short,
            representative: "x".to_string(),
            members: vec![],
        };
        let accepted = RegexCandidate::new(1, "x", 1).accept();
        assert!(RejectedRegex::new(&cluster, &accepted).is_none());
    }
}
