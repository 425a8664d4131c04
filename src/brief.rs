//! Parsing LLM responses into the five brief sections.
//!
//! # Marker grammar
//!
//! A header line is a line whose content, after trimming surrounding
//! whitespace, starts with `FACTS`, `ISSUE`, `DECISION`, `REASONS` or
//! `RATIO` (ASCII case-insensitive) immediately followed by `:`.
//!
//! - Text after the colon on the header line starts the section body.
//! - A body runs until the next header line or the end of the text and
//!   is trimmed.
//! - Text before the first header is ignored.
//! - When a label repeats, the first occurrence wins.
//! - Numbering, markdown emphasis and `#` headings are not recognized.
//!
//! # JSON fallback
//!
//! When no header line is present, the first balanced `{...}` object in
//! the response (code fences stripped) is read as JSON and its string
//! members `facts`, `issue`, `decision`, `reasons`, `ratio` are used.
//!
//! Sections found by neither grammar are left empty.

use crate::error::BenchError;
use crate::section::{Brief, Section};

/// Which grammar produced the sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Markers,
    Json,
    /// Nothing recognizable.
    None,
}

/// Outcome of parsing one response.
#[derive(Debug, Clone)]
pub struct ParsedBrief {
    pub brief: Brief,
    pub grammar: Grammar,
    /// Sections the response did not provide.
    pub missing: Vec<Section>,
}

impl ParsedBrief {
    /// The parse problem, if any, as a row-scoped error.
    pub fn error(&self) -> Option<BenchError> {
        if self.grammar == Grammar::None {
            return Some(BenchError::Parse(
                "no section markers or JSON brief found".to_string(),
            ));
        }
        if self.missing.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.missing.iter().map(|s| s.name()).collect();
        Some(BenchError::Parse(format!(
            "missing sections: {}",
            names.join(", ")
        )))
    }
}

/// Parse a response into sections.
pub fn parse_brief(response: &str) -> ParsedBrief {
    if let Some(found) = parse_markers(response) {
        return finish(found, Grammar::Markers);
    }

    if let Some(found) = parse_json_brief(response) {
        return finish(found, Grammar::Json);
    }

    ParsedBrief {
        brief: Brief::default(),
        grammar: Grammar::None,
        missing: Section::ALL.to_vec(),
    }
}

fn finish(found: [Option<String>; 5], grammar: Grammar) -> ParsedBrief {
    let mut brief = Brief::default();
    let mut missing = Vec::new();

    for section in Section::ALL {
        match &found[section.index()] {
            Some(text) => brief.set(section, text.clone()),
            None => missing.push(section),
        }
    }

    ParsedBrief {
        brief,
        grammar,
        missing,
    }
}

/// Match a header line, returning its section and the text after the colon.
fn header(line: &str) -> Option<(Section, &str)> {
    let line = line.trim();
    Section::ALL.into_iter().find_map(|section| {
        let marker = section.marker();
        let head = line.get(..marker.len())?;
        if !head.eq_ignore_ascii_case(marker) {
            return None;
        }
        line[marker.len()..]
            .strip_prefix(':')
            .map(|rest| (section, rest))
    })
}

fn close_section(current: Option<(Section, Vec<&str>)>, found: &mut [Option<String>; 5]) {
    if let Some((section, lines)) = current {
        let slot = &mut found[section.index()];
        if slot.is_none() {
            *slot = Some(lines.join("\n").trim().to_string());
        }
    }
}

fn parse_markers(response: &str) -> Option<[Option<String>; 5]> {
    let mut found: [Option<String>; 5] = Default::default();
    let mut current: Option<(Section, Vec<&str>)> = None;
    let mut any = false;

    for line in response.lines() {
        if let Some((section, rest)) = header(line) {
            any = true;
            close_section(current.take(), &mut found);
            current = Some((section, vec![rest]));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    close_section(current.take(), &mut found);

    any.then_some(found)
}

/// Strip markdown code fences.
fn strip_fences(response: &str) -> String {
    response
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the first balanced JSON object, honouring string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &text[s..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_json_brief(response: &str) -> Option<[Option<String>; 5]> {
    let cleaned = strip_fences(response);
    let object = first_json_object(&cleaned)?;
    let value: serde_json::Value = serde_json::from_str(object).ok()?;
    let map = value.as_object()?;

    let mut found: [Option<String>; 5] = Default::default();
    let mut any = false;
    for section in Section::ALL {
        if let Some(text) = map.get(section.name()).and_then(|v| v.as_str()) {
            found[section.index()] = Some(text.trim().to_string());
            any = true;
        }
    }

    any.then_some(found)
}
