use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use yarasmith::{Pipeline, YarasmithConfig};
use yarasmith_core::{CheckerUnavailable, FailureReason, RuleCategory, ServiceError};
use yarasmith_llm::TextService;
use yarasmith_reports::{ACCEPTED_FILE, RegexStore, RuleStore, rule_files};
use yarasmith_validator::{SyntaxChecker, SyntaxVerdict};

/// Answers every prompt kind the pipeline sends, without a network.
struct FakeModel;

impl FakeModel {
    fn answer(&self, prompt: &str) -> Result<String, ServiceError> {
        if prompt.contains("## Threat Description") {
            if prompt.contains("PLACEHOLDER") {
                return Ok("No suitable response".to_string());
            }
            let name = between(prompt, "The rule name is exactly ", ".").unwrap_or("unnamed");
            return Ok(format!(
                "```yara\nrule {name} {{\n    strings:\n        $a = \"{name}_payload_marker\"\n    condition:\n        $a\n}}\n```"
            ));
        }

        if prompt.contains("has a syntax error") {
            let rule = between(prompt, "syntax error:\n\n", "\n\nThe syntax error is:").unwrap_or_default();
            return Ok(rule.replace("BROKEN", ""));
        }

        if prompt.contains("regular expression that matches all") {
            return Ok("```\nexploit_[0-9]+_payload_marker\n```".to_string());
        }

        if prompt.contains("Please revise the following YARA rule") {
            let start = prompt.find("rule master_regex_rule").unwrap_or(0);
            return Ok(prompt[start..].replace("description = ", "author = \"tester\"\n        description = "));
        }

        Err(ServiceError::Permanent(format!("unexpected prompt: {prompt}")))
    }
}

#[async_trait]
impl TextService for FakeModel {
    async fn request(&self, context: &str) -> Result<String, ServiceError> {
        self.answer(context)
    }
}

/// Rejects rules carrying a marker word.
struct FakeChecker;

#[async_trait]
impl SyntaxChecker for FakeChecker {
    async fn check(&self, rule_text: &str) -> Result<SyntaxVerdict, CheckerUnavailable> {
        if rule_text.contains("BROKEN") || rule_text.contains("HOPELESS") {
            Ok(SyntaxVerdict::invalid("line 3: syntax error, unexpected identifier"))
        } else {
            Ok(SyntaxVerdict::valid())
        }
    }
}

/// A checker whose process never exits.
struct HangingChecker;

#[async_trait]
impl SyntaxChecker for HangingChecker {
    async fn check(&self, _rule_text: &str) -> Result<SyntaxVerdict, CheckerUnavailable> {
        std::future::pending().await
    }
}

struct RejectingModel;

#[async_trait]
impl TextService for RejectingModel {
    async fn request(&self, _context: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Permanent("invalid api key".to_string()))
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

fn test_config(root: &Path) -> YarasmithConfig {
    let mut config = YarasmithConfig::default();
    config.paths.download_folder = root.join("downloads");
    config.paths.rule_folder = root.join("rules");
    config.paths.store_folder = root.join("store");
    config.classification.low = 10.0;
    config.clustering.min_cluster_size = 3;
    config.validation.max_attempts = 3;
    config.validation.max_workers = 4;
    config
}

fn pipeline(config: YarasmithConfig) -> Pipeline<FakeModel, FakeChecker> {
    Pipeline::new(config, Arc::new(FakeModel), Arc::new(FakeChecker)).with_progress(false)
}

fn seed_clusterable_rules(store: &RuleStore) {
    store.prepare().unwrap();
    let singletons = ["kernel32_hook", "qwerty_zxcv", "ftp_upload_tool"];
    for (n, other) in (1..=3).zip(singletons) {
        let id = format!("exploit_{n}");
        let text = format!(
            "rule {id} {{ strings: $a = \"{id}_payload_marker\" $b = \"{other}\" condition: $a or $b }}"
        );
        store.write(RuleCategory::Acceptable, &id, &text).unwrap();
    }
}

fn write_rule(folder: &Path, id: &str, body: &str) {
    fs::create_dir_all(folder).unwrap();
    fs::write(folder.join(format!("{id}.yar")), body).unwrap();
}

#[tokio::test]
async fn test_generate_writes_rules_and_skips() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.generation.max_queries_per_run = 2;

    let downloads = &config.paths.download_folder;
    fs::create_dir_all(downloads).unwrap();
    fs::write(downloads.join("exploit_1.txt"), "use after free in a pdf reader").unwrap();
    fs::write(downloads.join("exploit_2.txt"), "PLACEHOLDER").unwrap();
    fs::write(downloads.join("exploit_3.txt"), "dll side loading").unwrap();
    fs::write(downloads.join("exploit_4.txt"), "").unwrap();

    let summary = pipeline(config.clone()).generate().await.unwrap();

    // Highest numbers first: 3 is generated, 2 is a placeholder, 1 is over the cap
    assert_eq!(summary.generated, 1);
    let generated = rule_files(&config.paths.rule_folder);
    assert_eq!(generated.len(), 1);
    assert!(generated[0].ends_with("exploit_3.yar"));

    let reasons: Vec<_> = summary.skipped.iter().map(|s| (s.id.as_str(), s.reason.as_str())).collect();
    assert!(reasons.contains(&("exploit_2", "placeholder response")));
    assert!(reasons.contains(&("exploit_1", "query limit reached")));
    assert!(summary.skipped.iter().any(|s| s.reason == "empty file"));

    // A second run does not regenerate existing rules
    let summary = pipeline(config).generate().await.unwrap();
    assert!(summary.skipped.iter().any(|s| s.id == "exploit_3" && s.reason == "rule already exists"));
}

#[tokio::test]
async fn test_validate_sorts_rules_into_buckets() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let rules = &config.paths.rule_folder;

    write_rule(
        rules,
        "exploit_1",
        "rule exploit_1 { strings: $a = \"powershell -enc payload\" condition: $a }",
    );
    write_rule(
        rules,
        "exploit_2",
        "rule exploit_2 { strings: $a = \"mimikatz_logon_passwords\" condition: $a BROKEN }",
    );
    write_rule(
        rules,
        "exploit_3",
        "rule exploit_3 { strings: $a = \"cobalt_beacon\" condition: HOPELESS }",
    );
    write_rule(rules, "exploit_4", "rule exploit_4 { condition: true }");

    let summary = pipeline(config.clone()).validate().await.unwrap();

    assert_eq!(summary.classified(), 4);
    assert_eq!(summary.category_count(RuleCategory::Acceptable), 2);
    assert_eq!(summary.category_count(RuleCategory::TooTrivial), 1);
    assert_eq!(summary.category_count(RuleCategory::Invalid), 1);
    assert_eq!(summary.invalid_reasons[&FailureReason::NoProgress], 1);

    let store = RuleStore::new(&config.paths.store_folder);
    let acceptable = store.list(RuleCategory::Acceptable).unwrap();
    let ids: Vec<_> = acceptable.iter().map(|r| r.descriptor_id.as_str()).collect();
    assert_eq!(ids, vec!["exploit_1", "exploit_2"]);
    assert!(!acceptable[1].text.contains("BROKEN"));
    assert_eq!(store.count(RuleCategory::Invalid), 1);
    assert_eq!(store.count(RuleCategory::TooTrivial), 1);
}

#[tokio::test]
async fn test_regex_stage_clusters_and_writes_store() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.regex.refine_master_rules = true;

    let store = RuleStore::new(&config.paths.store_folder);
    seed_clusterable_rules(&store);
    store
        .write(RuleCategory::Acceptable, "exploit_9", "rule exploit_9 { strings: $a = \"x\"")
        .unwrap();

    let summary = pipeline(config.clone()).regex().await.unwrap();

    assert_eq!(summary.skipped_in("extract"), 1);
    assert_eq!(summary.clusters, 1);
    assert_eq!(summary.clusters_discarded, 3);
    assert_eq!(summary.regex_accepted, 1);
    assert_eq!(summary.master_rules, 1);

    let regex_store = RegexStore::new(&config.paths.store_folder);
    let accepted = regex_store.load_accepted().unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].pattern, "exploit_[0-9]+_payload_marker");
    assert_eq!(accepted[0].members.len(), 3);
    assert!(regex_store.dir().join(ACCEPTED_FILE).exists());

    let masters = rule_files(&regex_store.master_rules_dir());
    assert_eq!(masters.len(), 1);
    let master = fs::read_to_string(&masters[0]).unwrap();
    assert!(master.contains("author = \"tester\""));
    assert!(master.contains("exploit_[0-9]+_payload_marker"));
}

#[tokio::test]
async fn test_refinement_keeps_original_when_checker_hangs() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.regex.refine_master_rules = true;
    config.validation.checker_timeout_secs = 1;
    config.validation.checker_retries = 0;

    seed_clusterable_rules(&RuleStore::new(&config.paths.store_folder));

    let pipeline = Pipeline::new(config.clone(), Arc::new(FakeModel), Arc::new(HangingChecker)).with_progress(false);
    let summary = tokio::time::timeout(Duration::from_secs(30), pipeline.regex())
        .await
        .expect("regex stage must not hang on the checker")
        .unwrap();

    assert_eq!(summary.master_rules, 1);
    let masters = rule_files(&RegexStore::new(&config.paths.store_folder).master_rules_dir());
    let master = fs::read_to_string(&masters[0]).unwrap();
    assert!(!master.contains("author = \"tester\""));
    assert!(master.contains("exploit_[0-9]+_payload_marker"));
}

#[tokio::test]
async fn test_run_all_end_to_end() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let downloads = &config.paths.download_folder;
    fs::create_dir_all(downloads).unwrap();
    for n in 1..=3 {
        fs::write(downloads.join(format!("exploit_{n}.txt")), format!("report {n}")).unwrap();
    }

    let summary = pipeline(config).run_all().await.unwrap();

    assert_eq!(summary.generated, 3);
    assert_eq!(summary.category_count(RuleCategory::Acceptable), 3);
    assert_eq!(summary.clusters, 1);
    assert_eq!(summary.regex_accepted, 1);
    assert_eq!(summary.master_rules, 1);
    assert!(summary.skipped.is_empty());
}

#[tokio::test]
async fn test_permanent_service_failure_aborts_run() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let downloads = &config.paths.download_folder;
    fs::create_dir_all(downloads).unwrap();
    fs::write(downloads.join("exploit_1.txt"), "report").unwrap();

    let pipeline = Pipeline::new(config, Arc::new(RejectingModel), Arc::new(FakeChecker)).with_progress(false);
    let err = pipeline.generate().await.unwrap_err();
    assert!(err.to_string().contains("Rule generation aborted"));
}
