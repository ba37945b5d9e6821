//! Stage orchestration: generate, validate, regex.
//!
//! Each stage fans work out to a bounded pool of futures. Workers return
//! partial accumulators; the coordinator (the stage method itself) merges them
//! and is the only code that touches the stores.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use yarasmith_classifier::classify;
use yarasmith_cluster::{cluster, extract_strings};
use yarasmith_core::rule_text::{extract_rule_block, is_unacceptable_rule_response};
use yarasmith_core::{CandidateRule, RuleCategory, ServiceError};
use yarasmith_llm::{GenaiService, GuardedService, PromptBuilder, TextService, Throttle};
use yarasmith_regex::{ClusterOutcome, PatternSynthesizer, RegexFilter};
use yarasmith_reports::filename::descriptor_id_from_filename;
use yarasmith_reports::{MasterRule, RegexStore, RuleStore, RunSummary, assemble_master_rules, rule_filename, rule_files};
use yarasmith_validator::{Corrector, SyntaxChecker, YaraBinaryChecker};

use crate::accumulator::{CategoryAccumulator, RegexAccumulator};
use crate::config::YarasmithConfig;
use crate::descriptors::DescriptorSource;
use crate::generation::{self, GenerationOutcome, RuleGenerator, select_pending};

pub const VALIDATE_STAGE: &str = "validate";
pub const EXTRACT_STAGE: &str = "extract";
pub const REGEX_STAGE: &str = "regex";

/// The production wiring: genai behind the shared throttle, `yara` as checker.
pub type ModelPipeline = Pipeline<GuardedService<GenaiService>, YaraBinaryChecker>;

pub struct Pipeline<S, C> {
    config: YarasmithConfig,
    service: Arc<S>,
    checker: Arc<C>,
    prompts: PromptBuilder,
    checker_throttle: Option<Arc<Throttle>>,
    show_progress: bool,
}

impl ModelPipeline {
    pub fn from_config(config: YarasmithConfig) -> Self {
        let throttle = Arc::new(Throttle::new(config.rate_budget(), config.api.max_concurrent));

        let genai = GenaiService::new(&config.api.model, config.api.base_url.as_deref());
        let service = GuardedService::new("model", genai, config.service_policy(), throttle.clone());
        let checker = YaraBinaryChecker::new(config.validation.yara_binary.clone());

        Pipeline::new(config, Arc::new(service), Arc::new(checker)).with_checker_throttle(throttle)
    }
}

impl<S, C> Pipeline<S, C>
where
    S: TextService + 'static,
    C: SyntaxChecker + 'static,
{
    pub fn new(config: YarasmithConfig, service: Arc<S>, checker: Arc<C>) -> Self {
        let prompts = PromptBuilder::new().with_author(config.regex.author.clone());
        Self {
            config,
            service,
            checker,
            prompts,
            checker_throttle: None,
            show_progress: true,
        }
    }

    /// Share a throttle between model calls and syntax checks.
    pub fn with_checker_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.checker_throttle = Some(throttle);
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &YarasmithConfig {
        &self.config
    }

    pub fn rule_store(&self) -> RuleStore {
        RuleStore::new(&self.config.paths.store_folder)
            .with_cve_year_grouping(self.config.classification.group_by_cve_year)
    }

    pub fn regex_store(&self) -> RegexStore {
        RegexStore::new(&self.config.paths.store_folder)
    }

    fn corrector(&self) -> Corrector<Arc<C>, Arc<S>> {
        let corrector = Corrector::new(self.checker.clone(), self.service.clone(), self.config.checker_policy());
        match &self.checker_throttle {
            Some(throttle) => corrector.with_throttle(throttle.clone()),
            None => corrector,
        }
    }

    fn workers(&self) -> usize {
        self.config.validation.max_workers.max(1)
    }

    fn progress_bar(&self, len: u64, message: &str) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }

        let progress_bar = ProgressBar::new(len);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        progress_bar.set_message(message.to_string());
        Ok(progress_bar)
    }

    /// Descriptors to rule files in the rule folder.
    pub async fn generate(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new();

        let scan = DescriptorSource::from_config(&self.config)?.scan()?;
        summary.skipped.extend(scan.skipped);

        let rule_folder = &self.config.paths.rule_folder;
        fs::create_dir_all(rule_folder)
            .with_context(|| format!("Failed to create rule folder {}", rule_folder.display()))?;

        let (pending, skipped) = select_pending(
            scan.descriptors,
            rule_folder,
            self.config.generation.max_queries_per_run,
        );
        summary.skipped.extend(skipped);

        println!("🔎 Generating rules for {} descriptors", pending.len());
        let progress_bar = self.progress_bar(pending.len() as u64, "generating rules")?;

        let generator = RuleGenerator::new(self.service.clone(), self.prompts.clone());
        let generator = &generator;
        let progress = &progress_bar;

        let outcomes: Vec<GenerationOutcome> = stream::iter(pending)
            .map(|descriptor| async move {
                let outcome = generator.generate(&descriptor).await;
                progress.inc(1);
                outcome
            })
            .buffer_unordered(self.workers())
            .try_collect()
            .await
            .context("Rule generation aborted")?;

        progress_bar.finish_with_message("generation complete");

        for outcome in outcomes {
            match outcome {
                GenerationOutcome::Generated(rule) => {
                    write_rule(rule_folder, &rule)?;
                    summary.generated += 1;
                }
                GenerationOutcome::Rejected { descriptor_id, reason } => {
                    summary.record_skip(generation::STAGE, descriptor_id, reason);
                }
            }
        }

        println!("✅ Generated {} rules", summary.generated);
        Ok(summary)
    }

    /// Rule folder to category buckets.
    pub async fn validate(&self) -> Result<RunSummary> {
        let rule_folder = &self.config.paths.rule_folder;
        let files = rule_files(rule_folder);

        let store = self.rule_store();
        store.prepare().context("Failed to prepare rule store")?;

        println!("📁 Validating {} rules from {}", files.len(), rule_folder.display());
        let progress_bar = self.progress_bar(files.len() as u64, "validating rules")?;

        let corrector = self.corrector();
        let classifier_config = self.config.classifier_config();
        let max_attempts = self.config.effective_max_attempts();

        let corrector = &corrector;
        let classifier_config = &classifier_config;
        let progress = &progress_bar;

        let accumulator = stream::iter(files)
            .map(|path| async move {
                let mut acc = CategoryAccumulator::default();
                let descriptor_id = path
                    .file_name()
                    .map(|n| descriptor_id_from_filename(&n.to_string_lossy()).to_string())
                    .unwrap_or_default();

                match fs::read_to_string(&path) {
                    Ok(text) => {
                        let rule = CandidateRule::new(descriptor_id, text);
                        let (rule, result) = corrector.validate_and_correct(rule, max_attempts).await?;
                        let (category, score) = classify(&rule.text, &result, classifier_config);
                        acc.record(rule, result, category, score);
                    }
                    Err(e) => acc.skip(VALIDATE_STAGE, descriptor_id, format!("unreadable: {}", e)),
                }

                progress.inc(1);
                Ok::<_, ServiceError>(acc)
            })
            .buffer_unordered(self.workers())
            .try_fold(CategoryAccumulator::default(), |mut total, part| async move {
                total.merge(part);
                Ok(total)
            })
            .await
            .context("Validation aborted")?;

        progress_bar.finish_with_message("validation complete");

        for classified in &accumulator.rules {
            store
                .write(classified.category, &classified.rule.descriptor_id, &classified.rule.text)
                .context("Failed to store classified rule")?;
        }

        let mut summary = RunSummary::new();
        accumulator.summarize(&mut summary);

        for category in RuleCategory::ALL {
            println!("📊 {}: {}", category, summary.category_count(category));
        }
        Ok(summary)
    }

    /// Acceptable bucket to the regex store and master rules.
    pub async fn regex(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new();

        let acceptable = self
            .rule_store()
            .list(RuleCategory::Acceptable)
            .context("Failed to read acceptable rules")?;

        let mut strings = Vec::new();
        for stored in &acceptable {
            match extract_strings(&stored.descriptor_id, &stored.text, self.config.clustering.min_literal_length) {
                Ok(found) => strings.extend(found),
                Err(e) => {
                    warn!("Skipping {}: {}", stored.path.display(), e);
                    summary.record_skip(EXTRACT_STAGE, e.rule_id, e.reason);
                }
            }
        }
        summary.strings_extracted = strings.len();

        let clustering = cluster(strings, &self.config.cluster_config());
        summary.clusters = clustering.clusters.len();
        summary.clusters_discarded = clustering.discarded;

        println!(
            "🔎 {} strings from {} rules formed {} clusters",
            summary.strings_extracted,
            acceptable.len(),
            summary.clusters
        );
        let progress_bar = self.progress_bar(clustering.clusters.len() as u64, "synthesizing patterns")?;

        let filter = RegexFilter::new(self.config.regex_bounds(), self.config.regex.denylist.clone());
        let synthesizer = PatternSynthesizer::new(self.service.clone(), filter);
        let synthesizer = &synthesizer;
        let progress = &progress_bar;

        let mut regexes = stream::iter(&clustering.clusters)
            .map(|cluster| async move {
                let mut acc = RegexAccumulator::default();
                match synthesizer.synthesize_and_filter(cluster).await? {
                    ClusterOutcome::Accepted(candidate) => acc.accept(cluster, &candidate),
                    ClusterOutcome::Rejected(candidate) => acc.reject(cluster, &candidate),
                    ClusterOutcome::Skipped { cluster_id, reason } => {
                        acc.skip(REGEX_STAGE, format!("cluster-{}", cluster_id), reason)
                    }
                }
                progress.inc(1);
                Ok::<_, ServiceError>(acc)
            })
            .buffer_unordered(self.workers())
            .try_fold(RegexAccumulator::default(), |mut total, part| async move {
                total.merge(part);
                Ok(total)
            })
            .await
            .context("Regex synthesis aborted")?;

        progress_bar.finish_with_message("synthesis complete");
        regexes.sort();

        let regex_store = self.regex_store();
        regex_store
            .write_run(&regexes.accepted, &regexes.rejected)
            .context("Failed to write regex store")?;
        regexes.summarize(&mut summary);

        let master_rules = self.build_master_rules(&regexes.patterns()).await?;
        let master_dir = regex_store.master_rules_dir();
        for rule in &master_rules {
            let path = rule.save_to_dir(&master_dir).context("Failed to write master rule")?;
            info!("Wrote master rule {}", path.display());
        }
        summary.master_rules = master_rules.len();

        println!(
            "✅ {} patterns accepted, {} rejected, {} master rules",
            summary.regex_accepted,
            regexes.rejected.len(),
            summary.master_rules
        );
        Ok(summary)
    }

    /// Every stage in order, with one combined summary.
    pub async fn run_all(&self) -> Result<RunSummary> {
        let mut summary = self.generate().await?;
        summary.merge(self.validate().await?);
        summary.merge(self.regex().await?);
        Ok(summary)
    }

    async fn build_master_rules(&self, patterns: &[String]) -> Result<Vec<MasterRule>> {
        let now = Utc::now();
        let rules = assemble_master_rules(patterns, self.config.regex.max_regexes_per_rule, now);
        if !self.config.regex.refine_master_rules {
            return Ok(rules);
        }

        let date = now.format("%Y-%m-%d").to_string();
        let corrector = self.corrector();
        let mut refined = Vec::with_capacity(rules.len());
        for rule in rules {
            refined.push(self.refine_master_rule(&corrector, rule, &date).await?);
        }
        Ok(refined)
    }

    /// Ask for a polished version of a master rule. The revision replaces the
    /// original only when it still passes the syntax checker.
    async fn refine_master_rule(
        &self,
        corrector: &Corrector<Arc<C>, Arc<S>>,
        rule: MasterRule,
        date: &str,
    ) -> Result<MasterRule> {
        let prompt = self.prompts.build_master_rule_prompt(&rule.text, date);
        let response = match self.service.request(&prompt).await {
            Ok(response) => response,
            Err(ServiceError::Transient(message)) => {
                warn!("Refinement of {} unavailable: {}", rule.name, message);
                return Ok(rule);
            }
            Err(e) => return Err(e).context("Master rule refinement aborted"),
        };

        let text = extract_rule_block(&response);
        if !text.contains("rule ") || is_unacceptable_rule_response(&text) {
            warn!("Refinement of {} returned no usable rule", rule.name);
            return Ok(rule);
        }

        match corrector.check_syntax(&text).await {
            Ok(verdict) if verdict.valid => Ok(rule.with_text(text)),
            Ok(verdict) => {
                warn!(
                    "Refinement of {} failed syntax check: {}",
                    rule.name,
                    verdict.message.unwrap_or_default()
                );
                Ok(rule)
            }
            Err(e) => {
                warn!("Refinement of {} could not be checked: {}", rule.name, e);
                Ok(rule)
            }
        }
    }
}

fn write_rule(rule_folder: &Path, rule: &CandidateRule) -> Result<()> {
    let path = rule_folder.join(rule_filename(&rule.descriptor_id));
    fs::write(&path, &rule.text).with_context(|| format!("Failed to write {}", path.display()))
}
