//! Case dataset loading.
//!
//! Supports:
//! - CSV tables with the fixed case schema
//! - JSON arrays of case objects with the same keys
//! - The case-brief wiki scraper export (`title` + `details`), which the
//!   `prepare` command normalizes into the CSV schema

use crate::error::{BenchError, Result};
use crate::section::{Brief, Section};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Columns every cases table must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "case_name",
    "source_text",
    "human_facts",
    "human_issue",
    "human_decision",
    "human_reasons",
    "human_ratio",
];

/// A case with its human-written brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// Identifier; defaults to the 1-based row number when absent.
    #[serde(default)]
    pub case_id: String,
    pub case_name: String,
    /// Judgment text given to the model. May be empty, in which case the
    /// model is asked about the case by name.
    pub source_text: String,
    pub human_facts: String,
    pub human_issue: String,
    pub human_decision: String,
    pub human_reasons: String,
    pub human_ratio: String,
}

impl Case {
    /// The human-written reference brief.
    pub fn human_brief(&self) -> Brief {
        Brief {
            facts: self.human_facts.clone(),
            issue: self.human_issue.clone(),
            decision: self.human_decision.clone(),
            reasons: self.human_reasons.clone(),
            ratio: self.human_ratio.clone(),
        }
    }
}

/// One entry of the scraper export.
#[derive(Debug, Deserialize)]
struct ScrapedCase {
    title: String,
    #[serde(default)]
    details: ScrapedDetails,
}

#[derive(Debug, Default, Deserialize)]
struct ScrapedDetails {
    #[serde(rename = "Facts", default)]
    facts: String,
    #[serde(rename = "Issue", default)]
    issue: String,
    #[serde(rename = "Decision", default)]
    decision: String,
    #[serde(rename = "Reasons", default)]
    reasons: String,
    #[serde(rename = "Ratio", default)]
    ratio: String,
}

impl From<ScrapedCase> for Case {
    fn from(raw: ScrapedCase) -> Self {
        Case {
            case_id: String::new(),
            case_name: raw.title.trim().to_string(),
            source_text: String::new(),
            human_facts: raw.details.facts.trim().to_string(),
            human_issue: raw.details.issue.trim().to_string(),
            human_decision: raw.details.decision.trim().to_string(),
            human_reasons: raw.details.reasons.trim().to_string(),
            human_ratio: raw.details.ratio.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCase {
    Flat(Case),
    Scraped(ScrapedCase),
}

/// Load cases from a CSV or JSON file (chosen by extension).
pub fn load_cases(path: &Path) -> Result<Vec<Case>> {
    if !path.exists() {
        return Err(BenchError::Input(format!(
            "Cases file not found at '{}'",
            path.display()
        )));
    }

    let mut cases = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_cases_json(path)?,
        _ => load_cases_csv(path)?,
    };

    for (idx, case) in cases.iter_mut().enumerate() {
        if case.case_id.trim().is_empty() {
            case.case_id = (idx + 1).to_string();
        }
    }

    if cases.is_empty() {
        return Err(BenchError::Input(format!(
            "No cases found in '{}'",
            path.display()
        )));
    }

    info!(path = %path.display(), count = cases.len(), "loaded cases");
    Ok(cases)
}

fn load_cases_csv(path: &Path) -> Result<Vec<Case>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| BenchError::Input(format!("Failed to open '{}': {}", path.display(), e)))?;

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(BenchError::Input(format!(
            "'{}' is missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut cases = Vec::new();
    for (idx, record) in reader.deserialize::<Case>().enumerate() {
        let case = record.map_err(|e| {
            BenchError::Input(format!(
                "Malformed case at row {} of '{}': {}",
                idx + 1,
                path.display(),
                e
            ))
        })?;
        cases.push(case);
    }

    Ok(cases)
}

fn load_cases_json(path: &Path) -> Result<Vec<Case>> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    let raw: Vec<JsonCase> = serde_json::from_str(&content).map_err(|e| {
        BenchError::Input(format!("Malformed cases JSON '{}': {}", path.display(), e))
    })?;

    Ok(raw
        .into_iter()
        .map(|entry| match entry {
            JsonCase::Flat(case) => case,
            JsonCase::Scraped(scraped) => scraped.into(),
        })
        .collect())
}

/// Normalize a scraper export into cases.
///
/// Entries without any human brief section are dropped since there is
/// nothing to compare against. `limit` keeps the first N usable entries.
pub fn load_scraper_export(path: &Path, limit: Option<usize>) -> Result<Vec<Case>> {
    let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
    let raw: Vec<ScrapedCase> = serde_json::from_str(&content).map_err(|e| {
        BenchError::Input(format!("Malformed scraper export '{}': {}", path.display(), e))
    })?;

    let total = raw.len();
    let mut cases: Vec<Case> = raw
        .into_iter()
        .map(Case::from)
        .filter(|case| {
            let keep = !case.human_brief().is_empty();
            if !keep {
                debug!(case_name = %case.case_name, "dropping case without a human brief");
            }
            keep
        })
        .collect();

    if let Some(limit) = limit {
        cases.truncate(limit);
    }

    for (idx, case) in cases.iter_mut().enumerate() {
        case.case_id = (idx + 1).to_string();
    }

    info!(total, kept = cases.len(), "normalized scraper export");
    Ok(cases)
}

/// Write cases to a CSV table in the fixed schema.
pub fn write_cases_csv(cases: &[Case], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    for case in cases {
        writer.serialize(case)?;
    }
    writer.flush().map_err(|e| BenchError::io(path, e))?;
    Ok(())
}

/// Count of non-empty human sections, handy for dataset summaries.
pub fn human_section_coverage(cases: &[Case]) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for case in cases {
        let brief = case.human_brief();
        for section in Section::ALL {
            if !brief.get(section).trim().is_empty() {
                counts[section.index()] += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str =
        "case_name,source_text,human_facts,human_issue,human_decision,human_reasons,human_ratio\n";

    #[test]
    fn test_load_csv_assigns_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.csv");
        let body = format!(
            "{}R v Miller,text,f1,i1,d1,r1,ra1\nArnold v Teno,,f2,i2,d2,r2,ra2\n",
            HEADER
        );
        fs::write(&path, body).unwrap();

        let cases = load_cases(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].case_id, "1");
        assert_eq!(cases[1].case_id, "2");
        assert_eq!(cases[1].case_name, "Arnold v Teno");
        assert!(cases[1].source_text.is_empty());
        assert_eq!(cases[0].human_ratio, "ra1");
    }

    #[test]
    fn test_load_csv_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.csv");
        fs::write(&path, "case_name,human_facts\nR v Miller,facts\n").unwrap();

        let err = load_cases(&path).unwrap_err();
        match err {
            BenchError::Input(msg) => {
                assert!(msg.contains("source_text"));
                assert!(msg.contains("human_ratio"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_input_error() {
        let err = load_cases(Path::new("/nonexistent/cases.csv")).unwrap_err();
        assert!(matches!(err, BenchError::Input(_)));
    }

    #[test]
    fn test_load_json_accepts_both_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        let json = r#"[
            {"case_id": "a", "case_name": "Abdo v Abdo", "source_text": "s",
             "human_facts": "f", "human_issue": "i", "human_decision": "d",
             "human_reasons": "r", "human_ratio": "ra"},
            {"title": "Athey v Leonati", "details": {"Facts": " Back injury. ", "Ratio": "Material contribution"}}
        ]"#;
        fs::write(&path, json).unwrap();

        let cases = load_cases(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].case_id, "a");
        assert_eq!(cases[1].case_id, "2");
        assert_eq!(cases[1].case_name, "Athey v Leonati");
        assert_eq!(cases[1].human_facts, "Back injury.");
        assert_eq!(cases[1].human_issue, "");
    }

    #[test]
    fn test_scraper_export_drops_empty_and_limits() {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("random_cases.json");
        let json = r#"[
            {"title": "Empty Case", "details": {"Citation": "2001 SCC 1"}},
            {"title": "R v Miller", "details": {"Issue": "Arson by omission"}},
            {"title": "Christie v York", "details": {"Decision": "Appeal dismissed"}}
        ]"#;
        fs::write(&export, json).unwrap();

        let cases = load_scraper_export(&export, Some(1)).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].case_name, "R v Miller");
        assert_eq!(cases[0].case_id, "1");

        let out = dir.path().join("data").join("cases.csv");
        write_cases_csv(&cases, &out).unwrap();
        let reloaded = load_cases(&out).unwrap();
        assert_eq!(reloaded, cases);
    }

    #[test]
    fn test_human_section_coverage() {
        let case = Case {
            case_id: "1".into(),
            case_name: "x".into(),
            source_text: String::new(),
            human_facts: "f".into(),
            human_issue: " ".into(),
            human_decision: String::new(),
            human_reasons: "r".into(),
            human_ratio: String::new(),
        };
        assert_eq!(human_section_coverage(&[case]), [1, 0, 0, 1, 0]);
    }
}
