//! Prompt used to request a case brief.

use crate::dataset::Case;

/// Collection of prompts used for benchmarking.
pub struct Prompts;

impl Prompts {
    /// Instruction shared by both prompt shapes. The header lines must
    /// match the grammar in [`crate::brief`].
    fn brief_instructions() -> &'static str {
        r#"Write a case brief with exactly these five sections, in this order.
Start each section on its own line with the header shown, followed by a colon:

FACTS: <the material facts of the case>
ISSUE: <the legal question(s) the court had to decide>
DECISION: <the outcome of the case>
REASONS: <the court's reasoning>
RATIO: <the ratio decidendi, the binding legal principle>

Do not add any other headers, numbering or formatting. Do not write anything before FACTS."#
    }

    /// Template for cases with judgment text.
    fn case_brief_with_text() -> &'static str {
        r#"You are a Canadian legal analyst.

Case: {case_name}

Judgment text:
{source_text}

{instructions}"#
    }

    /// Template for cases known only by name.
    fn case_brief_by_name() -> &'static str {
        r#"You are a Canadian legal analyst.

Case: {case_name}

{instructions}
If you do not know this case, reply with "I don't know" only."#
    }

    /// Build the deterministic brief prompt for a case.
    pub fn case_brief(case: &Case) -> String {
        let source_text = case.source_text.trim();
        let template = if source_text.is_empty() {
            Self::case_brief_by_name()
        } else {
            Self::case_brief_with_text()
        };

        template
            .replace("{case_name}", case.case_name.trim())
            .replace("{source_text}", source_text)
            .replace("{instructions}", Self::brief_instructions())
    }
}
