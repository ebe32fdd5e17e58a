//! Cleaner stage: dedup, enterprise filtering, and metadata enrichment.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use epc_core::{CuratedPrompt, RawPrompt};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

pub const CRATE_NAME: &str = "epc-clean";

/// Review status stamped on every accepted record.
pub const REVIEW_STATUS: &str = "已审核";

/// A record carries at most this many skill tags.
pub const MAX_TAGS: usize = 5;

#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub input_csv: PathBuf,
    pub output_csv: PathBuf,
    pub stats_json: PathBuf,
    pub rules_file: PathBuf,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            input_csv: PathBuf::from("data/prompts.csv"),
            output_csv: PathBuf::from("data/prompts_cleaned.csv"),
            stats_json: PathBuf::from("data/cleaning_stats.json"),
            rules_file: PathBuf::from("rules/curation.yaml"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryRule {
    category: String,
    scenario: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ScenarioRule {
    scenario: String,
    contains_any: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagRule {
    tag: String,
    contains_any: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TranslationRule {
    from: String,
    to: String,
}

/// The curation rule tables. Sequence order is semantic: the scenario scan
/// stops at the first matching rule and title translation applies each pair
/// to the result of the previous ones.
#[derive(Debug, Clone, Deserialize)]
pub struct CurationRules {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    exclude_categories: Vec<String>,
    #[serde(default)]
    exclude_keywords: Vec<String>,
    default_scenario: String,
    #[serde(default)]
    category_scenarios: Vec<CategoryRule>,
    #[serde(default)]
    scenario_rules: Vec<ScenarioRule>,
    #[serde(default)]
    tag_rules: Vec<TagRule>,
    #[serde(default)]
    translations: Vec<TranslationRule>,
}

impl CurationRules {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing curation rules")
    }

    /// Keep/drop decision for one record. Pure function of its inputs.
    pub fn should_include(&self, category: &str, title: &str, body: &str) -> bool {
        let category = category.to_lowercase();
        if self.exclude_categories.iter().any(|c| *c == category) {
            return false;
        }
        let title = title.to_lowercase();
        let body = body.to_lowercase();
        !self
            .exclude_keywords
            .iter()
            .any(|needle| title.contains(needle.as_str()) || body.contains(needle.as_str()))
    }

    /// Business scenario for one record: category table gives the base, the
    /// first matching keyword rule overrides it.
    pub fn infer_scenario(&self, category: &str, title: &str, body: &str) -> String {
        let category = category.to_lowercase();
        let base = self
            .category_scenarios
            .iter()
            .find(|rule| rule.category == category)
            .map(|rule| rule.scenario.as_str())
            .unwrap_or(self.default_scenario.as_str());

        let haystack = lowercased(title, body);
        for rule in &self.scenario_rules {
            if rule
                .contains_any
                .iter()
                .any(|needle| haystack.contains(needle.as_str()))
            {
                return rule.scenario.clone();
            }
        }
        base.to_string()
    }

    /// Skill tags for one record, in table order, capped at [`MAX_TAGS`].
    pub fn extract_tags(&self, title: &str, body: &str) -> Vec<String> {
        let haystack = lowercased(title, body);
        let mut tags = Vec::new();
        for rule in &self.tag_rules {
            if rule
                .contains_any
                .iter()
                .any(|needle| haystack.contains(needle.as_str()))
                && !tags.contains(&rule.tag)
            {
                tags.push(rule.tag.clone());
            }
        }
        tags.truncate(MAX_TAGS);
        tags
    }

    /// Localized title via sequential substring substitution. A title no
    /// rule touches comes back unchanged.
    pub fn translate_title(&self, title: &str) -> String {
        let mut result = title.to_string();
        for rule in &self.translations {
            result = result.replace(rule.from.as_str(), &rule.to);
        }
        result
    }
}

fn lowercased(title: &str, body: &str) -> String {
    format!("{} {}", title.to_lowercase(), body.to_lowercase())
}

#[derive(Debug, Clone)]
pub struct CleanSummary {
    pub total_rows: usize,
    pub unique_titles: usize,
    pub accepted: usize,
    pub dev_count: usize,
    pub tagged_count: usize,
    /// Scenario histogram, descending by count.
    pub scenario_counts: Vec<(String, usize)>,
    pub output_csv: PathBuf,
    pub stats_json: PathBuf,
}

/// Result of the in-memory curation pass, before anything is written.
#[derive(Debug, Clone, Default)]
pub struct CurationOutcome {
    pub records: Vec<CuratedPrompt>,
    pub total_rows: usize,
    pub unique_titles: usize,
    pub dev_count: usize,
    pub tagged_count: usize,
    pub scenario_counts: BTreeMap<String, usize>,
}

/// Single pass over the raw rows: skip blanks, dedup by first-seen title,
/// filter, then enrich whatever survives.
pub fn curate_rows(rules: &CurationRules, rows: &[RawPrompt], today: NaiveDate) -> CurationOutcome {
    let mut outcome = CurationOutcome::default();
    let mut seen_titles: HashSet<String> = HashSet::new();

    for row in rows {
        outcome.total_rows += 1;

        let title = row.title.trim();
        let body = row.body.trim();
        let category = row.category.trim();

        if title.is_empty() || body.is_empty() {
            continue;
        }
        if !seen_titles.insert(title.to_string()) {
            continue;
        }
        if !rules.should_include(category, title, body) {
            continue;
        }

        let scenario = rules.infer_scenario(category, title, body);
        *outcome.scenario_counts.entry(scenario.clone()).or_default() += 1;

        let tags = rules.extract_tags(title, body);
        if !tags.is_empty() {
            outcome.tagged_count += 1;
        }

        let for_devs = row.for_devs.trim().eq_ignore_ascii_case("TRUE");
        if for_devs {
            outcome.dev_count += 1;
        }

        outcome.records.push(CuratedPrompt {
            title: title.to_string(),
            zh_title: rules.translate_title(title),
            body: body.to_string(),
            scenario,
            tags,
            for_devs,
            category: category.to_string(),
            contributor: row.contributor.trim().to_string(),
            created_date: today,
            status: REVIEW_STATUS.to_string(),
        });
    }

    outcome.unique_titles = seen_titles.len();
    outcome
}

pub struct CleanPipeline {
    config: CleanConfig,
    rules: CurationRules,
}

impl CleanPipeline {
    pub fn new(config: CleanConfig) -> Result<Self> {
        let rules = CurationRules::from_path(&config.rules_file)?;
        Ok(Self { config, rules })
    }

    pub fn run(&self) -> Result<CleanSummary> {
        let rows = self.load_raw()?;
        info!(rows = rows.len(), input = %self.config.input_csv.display(), "loaded raw catalog");

        let outcome = curate_rows(&self.rules, &rows, Local::now().date_naive());
        self.write_curated(&outcome.records)?;

        let mut scenario_counts: Vec<(String, usize)> =
            outcome.scenario_counts.into_iter().collect();
        scenario_counts.sort_by(|a, b| b.1.cmp(&a.1));

        self.write_stats(&outcome.records, &scenario_counts, outcome.dev_count, outcome.tagged_count)?;

        Ok(CleanSummary {
            total_rows: outcome.total_rows,
            unique_titles: outcome.unique_titles,
            accepted: outcome.records.len(),
            dev_count: outcome.dev_count,
            tagged_count: outcome.tagged_count,
            scenario_counts,
            output_csv: self.config.output_csv.clone(),
            stats_json: self.config.stats_json.clone(),
        })
    }

    fn load_raw(&self) -> Result<Vec<RawPrompt>> {
        let path = &self.config.input_csv;
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: RawPrompt =
                record.with_context(|| format!("parsing {}", path.display()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_curated(&self, records: &[CuratedPrompt]) -> Result<()> {
        let path = &self.config.output_csv;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        for record in records {
            writer
                .serialize(record)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(())
    }

    fn write_stats(
        &self,
        records: &[CuratedPrompt],
        scenario_counts: &[(String, usize)],
        dev_count: usize,
        tagged_count: usize,
    ) -> Result<()> {
        let stats = CleanStats {
            total: records.len(),
            by_scenario: ScenarioHistogram(scenario_counts),
            dev_count,
            tagged_count,
        };
        let path = &self.config.stats_json;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(&stats).context("serializing cleaning stats")?;
        fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CleanStats<'a> {
    #[serde(rename = "总记录数")]
    total: usize,
    #[serde(rename = "按业务场景统计")]
    by_scenario: ScenarioHistogram<'a>,
    #[serde(rename = "面向开发者数量")]
    dev_count: usize,
    #[serde(rename = "有技能标签的数量")]
    tagged_count: usize,
}

/// Serializes the histogram as a JSON object in the slice's own order, so
/// the descending-count sort survives into the stats file.
struct ScenarioHistogram<'a>(&'a [(String, usize)]);

impl Serialize for ScenarioHistogram<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (scenario, count) in self.0 {
            map.serialize_entry(scenario, count)?;
        }
        map.end()
    }
}
