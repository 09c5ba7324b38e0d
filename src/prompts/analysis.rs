use anyhow::Result;
use serde_json::Value;

const INTRO: &str = "You are a social media expert known as Quant Ai.\nWhen asked about your identity, always respond that you are Quant Ai.";
const GUIDELINES_HEADER: &str = "Please provide detailed, in-depth analysis with the following guidelines:";
const GUIDELINES: &[&str] = &[
    "Break down insights into clear bullet points and sections",
    "Include specific data points and metrics to support conclusions",
    "Provide actionable recommendations where relevant",
    "Use professional but engaging tone",
    "Format responses with proper headings and structure",
];
const DATA_HEADER: &str = "Based on this social media data:";
const SYNTHESIS_HEADER: &str = "Synthesize these insights into a single coherent response:";

/// Prompt for one group of records: persona, guidelines, the records as
/// pretty JSON, then the user's question.
pub fn build_chunk_prompt(chunk: &[Value], user_prompt: &str) -> Result<String> {
    let data = serde_json::to_string_pretty(chunk)?;
    let guidelines = GUIDELINES
        .iter()
        .map(|g| format!("- {}", g))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        "{INTRO}\n\n{GUIDELINES_HEADER}\n{guidelines}\n\n{DATA_HEADER}\n{data}\n\n{user_prompt}"
    ))
}

/// Prompt that folds the per-group answers into one.
pub fn build_synthesis_prompt(combined: &str) -> String {
    format!("{SYNTHESIS_HEADER}\n{combined}")
}
