//! Core record types and field codecs for the prompt catalog pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "epc-core";

/// Raw catalog row as it arrives from the upstream export. Every column is
/// optional in practice, so missing cells decode to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPrompt {
    #[serde(default, rename = "act")]
    pub title: String,
    #[serde(default, rename = "prompt")]
    pub body: String,
    #[serde(default, rename = "type")]
    pub category: String,
    #[serde(default)]
    pub for_devs: String,
    #[serde(default)]
    pub contributor: String,
}

/// Curated handoff record between the cleaner and the batcher. Field order is
/// the column order of the intermediate CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedPrompt {
    #[serde(rename = "act")]
    pub title: String,
    #[serde(rename = "中文标题")]
    pub zh_title: String,
    #[serde(rename = "prompt")]
    pub body: String,
    #[serde(rename = "业务场景")]
    pub scenario: String,
    #[serde(rename = "技能标签", with = "tag_cell")]
    pub tags: Vec<String>,
    #[serde(rename = "面向开发者", with = "dev_flag")]
    pub for_devs: bool,
    #[serde(rename = "type")]
    pub category: String,
    pub contributor: String,
    #[serde(rename = "创建日期")]
    pub created_date: NaiveDate,
    #[serde(rename = "状态")]
    pub status: String,
}

/// Tag list stored as a JSON-encoded array inside a single tabular cell.
/// Decoding is tolerant: a cell that fails to parse yields no tags.
pub mod tag_cell {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::warn;

    pub fn serialize<S: Serializer>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(tags).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let cell = String::deserialize(deserializer)?;
        if cell.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&cell) {
            Ok(tags) => Ok(tags),
            Err(err) => {
                warn!(%err, "unparseable tag cell, keeping record with no tags");
                Ok(Vec::new())
            }
        }
    }
}

/// Developer flag stored as the text sentinels `TRUE`/`FALSE`; anything that
/// is not `TRUE` (case-insensitive) decodes as false.
pub mod dev_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *flag { "TRUE" } else { "FALSE" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let cell = String::deserialize(deserializer)?;
        Ok(cell.trim().eq_ignore_ascii_case("TRUE"))
    }
}

/// Truncate to at most `max` characters, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_curated(title: &str, tags: Vec<String>) -> CuratedPrompt {
        CuratedPrompt {
            title: title.to_string(),
            zh_title: title.to_string(),
            body: "You are a helpful reviewer.".to_string(),
            scenario: "办公效率".to_string(),
            tags,
            for_devs: false,
            category: "professional".to_string(),
            contributor: String::new(),
            created_date: NaiveDate::from_ymd_opt(2026, 8, 6).expect("date"),
            status: "已审核".to_string(),
        }
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("数据分析报告", 4), "数据分析");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn truncation_is_idempotent() {
        let once = truncate_chars("an already quite long English title", 10);
        assert_eq!(truncate_chars(once, 10), once);
    }

    #[test]
    fn curated_row_survives_a_csv_round_trip() {
        let record = mk_curated("Excel Expert", vec!["Excel".to_string(), "数据分析".to_string()]);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&record).expect("serialize");
        let bytes = writer.into_inner().expect("flush");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("act,中文标题,prompt,业务场景,技能标签,面向开发者,type,contributor,创建日期,状态"));
        assert!(text.contains("FALSE"));

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let back: CuratedPrompt = reader.deserialize().next().expect("row").expect("parse");
        assert_eq!(back, record);
    }

    #[test]
    fn malformed_tag_cell_decodes_to_no_tags() {
        let text = "act,中文标题,prompt,业务场景,技能标签,面向开发者,type,contributor,创建日期,状态\n\
                    Pirate,海盗,Arr matey.,办公效率,not-json,TRUE,misc,,2026-08-06,已审核\n";
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let row: CuratedPrompt = reader.deserialize().next().expect("row").expect("parse");
        assert!(row.tags.is_empty());
        assert!(row.for_devs);
    }

    #[test]
    fn empty_tag_cell_decodes_to_no_tags() {
        let text = "act,中文标题,prompt,业务场景,技能标签,面向开发者,type,contributor,创建日期,状态\n\
                    Pirate,海盗,Arr matey.,办公效率,,false,misc,,2026-08-06,已审核\n";
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let row: CuratedPrompt = reader.deserialize().next().expect("row").expect("parse");
        assert!(row.tags.is_empty());
        assert!(!row.for_devs);
    }

    #[test]
    fn raw_rows_default_missing_columns_to_empty() {
        let text = "act,prompt\nLinux Terminal,Act as a linux terminal.\n";
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let row: RawPrompt = reader.deserialize().next().expect("row").expect("parse");
        assert_eq!(row.title, "Linux Terminal");
        assert_eq!(row.category, "");
        assert_eq!(row.for_devs, "");
        assert_eq!(row.contributor, "");
    }
}
