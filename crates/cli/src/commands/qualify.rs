use parley_core::{extract_all, score, ExtractedData, LeadScore};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct QualifyReport {
    command: &'static str,
    status: &'static str,
    extracted: ExtractedData,
    lead: LeadScore,
}

/// Scores `text` as if it were the whole conversation so far.
pub fn run(text: &str, message_count: usize) -> CommandResult {
    let extracted = extract_all(text);
    let lead = score(&extracted, message_count);

    CommandResult::report(0, &QualifyReport { command: "qualify", status: "ok", extracted, lead })
}
