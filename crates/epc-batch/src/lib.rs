//! Batcher stage: page mapping and fixed-size upload envelope export.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use epc_core::{truncate_chars, CuratedPrompt};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CRATE_NAME: &str = "epc-batch";

/// Destination collection the batch envelopes target.
pub const DATA_SOURCE_ID: &str = "ae35c248-6e2d-46ce-9b45-2fa8a3365196";

/// Developer checkbox sentinels understood by the destination.
pub const DEV_YES: &str = "__YES__";
pub const DEV_NO: &str = "__NO__";

const TITLE_MAX: usize = 100;
const ZH_TITLE_MAX: usize = 200;
const BODY_MAX: usize = 3000;
const SLUG_MAX: usize = 50;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_csv: PathBuf,
    pub output_dir: PathBuf,
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_csv: PathBuf::from("data/prompts_cleaned.csv"),
            output_dir: PathBuf::from("data/batches"),
            batch_size: 50,
        }
    }
}

/// One destination page, field-for-field what the document database ingests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    #[serde(rename = "提示词名称")]
    pub title: String,
    #[serde(rename = "中文标题")]
    pub zh_title: String,
    #[serde(rename = "提示词内容")]
    pub body: String,
    #[serde(rename = "业务场景")]
    pub scenario: String,
    #[serde(rename = "技能标签")]
    pub tags: String,
    #[serde(rename = "面向开发者")]
    pub for_devs: String,
    #[serde(rename = "创建日期")]
    pub created: PageDate,
    #[serde(rename = "状态")]
    pub status: String,
    #[serde(rename = "内容长度")]
    pub body_chars: usize,
    #[serde(rename = "贡献者", default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDate {
    pub start: NaiveDate,
    pub is_datetime: bool,
}

#[derive(Debug, Serialize)]
struct TagRef<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub data_source_id: String,
    pub pages: Vec<Page>,
    pub batch_info: BatchInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_num: usize,
    pub total_batches: usize,
    pub count: usize,
}

/// Page reference slug: the first 50 characters of the title with spaces
/// replaced by underscores.
pub fn title_slug(title: &str) -> String {
    truncate_chars(title, SLUG_MAX).replace(' ', "_")
}

/// Map one curated record to its destination page. The body-length field is
/// computed from the body before truncation.
pub fn page_from_prompt(prompt: &CuratedPrompt) -> Result<Page> {
    let tag_refs: Vec<TagRef<'_>> = prompt.tags.iter().map(|name| TagRef { name }).collect();
    let tags = serde_json::to_string(&tag_refs).context("encoding page tag list")?;

    Ok(Page {
        url: format!("page://{}", title_slug(&prompt.title)),
        title: truncate_chars(&prompt.title, TITLE_MAX).to_string(),
        zh_title: truncate_chars(&prompt.zh_title, ZH_TITLE_MAX).to_string(),
        body: truncate_chars(&prompt.body, BODY_MAX).to_string(),
        scenario: prompt.scenario.clone(),
        tags,
        for_devs: if prompt.for_devs { DEV_YES } else { DEV_NO }.to_string(),
        created: PageDate {
            start: prompt.created_date,
            is_datetime: false,
        },
        status: prompt.status.clone(),
        body_chars: prompt.body.chars().count(),
        contributor: if prompt.contributor.is_empty() {
            None
        } else {
            Some(prompt.contributor.clone())
        },
    })
}

#[derive(Debug, Clone)]
pub struct WrittenBatch {
    pub path: PathBuf,
    pub pages: usize,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub records: usize,
    pub batches: Vec<WrittenBatch>,
    pub output_dir: PathBuf,
}

pub struct BatchPipeline {
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<BatchSummary> {
        let prompts = self.load_curated()?;
        info!(records = prompts.len(), input = %self.config.input_csv.display(), "loaded curated catalog");

        let batch_size = self.config.batch_size.max(1);
        let total_batches = prompts.len().div_ceil(batch_size);

        fs::create_dir_all(&self.config.output_dir)
            .with_context(|| format!("creating {}", self.config.output_dir.display()))?;

        let mut batches = Vec::with_capacity(total_batches);
        for (index, chunk) in prompts.chunks(batch_size).enumerate() {
            let batch_num = index + 1;
            let pages = chunk
                .iter()
                .map(page_from_prompt)
                .collect::<Result<Vec<_>>>()?;
            let envelope = BatchEnvelope {
                data_source_id: DATA_SOURCE_ID.to_string(),
                pages,
                batch_info: BatchInfo {
                    batch_num,
                    total_batches,
                    count: chunk.len(),
                },
            };

            let path = self.config.output_dir.join(format!("batch_{batch_num}.json"));
            let bytes =
                serde_json::to_vec_pretty(&envelope).context("serializing batch envelope")?;
            fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
            batches.push(WrittenBatch {
                path,
                pages: chunk.len(),
            });
        }

        Ok(BatchSummary {
            records: prompts.len(),
            batches,
            output_dir: self.config.output_dir.clone(),
        })
    }

    fn load_curated(&self) -> Result<Vec<CuratedPrompt>> {
        let path = &self.config.input_csv;
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let mut prompts = Vec::new();
        for record in reader.deserialize() {
            let prompt: CuratedPrompt =
                record.with_context(|| format!("parsing {}", path.display()))?;
            prompts.push(prompt);
        }
        Ok(prompts)
    }
}
