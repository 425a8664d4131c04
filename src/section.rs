//! The five sections of a case brief.

use std::fmt;

/// A section of a case brief, in the order briefs are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Facts,
    Issue,
    Decision,
    Reasons,
    Ratio,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Facts,
        Section::Issue,
        Section::Decision,
        Section::Reasons,
        Section::Ratio,
    ];

    /// Lower-case name, used as the JSON key and column suffix.
    pub fn name(self) -> &'static str {
        match self {
            Section::Facts => "facts",
            Section::Issue => "issue",
            Section::Decision => "decision",
            Section::Reasons => "reasons",
            Section::Ratio => "ratio",
        }
    }

    /// Upper-case header marker expected in LLM responses.
    pub fn marker(self) -> &'static str {
        match self {
            Section::Facts => "FACTS",
            Section::Issue => "ISSUE",
            Section::Decision => "DECISION",
            Section::Reasons => "REASONS",
            Section::Ratio => "RATIO",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn ai_column(self) -> String {
        format!("ai_{}", self.name())
    }

    pub fn human_column(self) -> String {
        format!("human_{}", self.name())
    }

    pub fn similarity_column(self) -> String {
        format!("{}_similarity", self.name())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text of all five sections of one brief.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Brief {
    pub facts: String,
    pub issue: String,
    pub decision: String,
    pub reasons: String,
    pub ratio: String,
}

impl Brief {
    pub fn get(&self, section: Section) -> &str {
        match section {
            Section::Facts => &self.facts,
            Section::Issue => &self.issue,
            Section::Decision => &self.decision,
            Section::Reasons => &self.reasons,
            Section::Ratio => &self.ratio,
        }
    }

    pub fn set(&mut self, section: Section, text: impl Into<String>) {
        let slot = match section {
            Section::Facts => &mut self.facts,
            Section::Issue => &mut self.issue,
            Section::Decision => &mut self.decision,
            Section::Reasons => &mut self.reasons,
            Section::Ratio => &mut self.ratio,
        };
        *slot = text.into();
    }

    /// True when every section is empty.
    pub fn is_empty(&self) -> bool {
        Section::ALL.iter().all(|s| self.get(*s).is_empty())
    }
}
