use formulate_contracts::{FeasibilityVerdict, FormulaSolution};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

pub const TOO_LONG_REASON: &str = "Too long!";
pub const TEMPERATURE: f32 = 0.0;
pub const FEASIBILITY_MAX_TOKENS: u32 = 150;
pub const GENERATION_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct PromptPlan {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCheck {
    Accepted,
    TooLong,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("completion output is empty")]
    Empty,
    #[error("completion output is not valid JSON: {0}")]
    Malformed(String),
    #[error("completion output is not a JSON object")]
    NotObject,
    #[error("completion output is missing or mistyped fields: {0}")]
    Schema(String),
}

pub fn feasibility_plan(text: &str) -> PromptPlan {
    PromptPlan {
        prompt: format!(
            "Is it possible \"Make an Excel formula that '{text}'\"? In JSON form, return \
             \"Possible\" (true/false boolean) and \"Reason\" (string). "
        ),
        temperature: TEMPERATURE,
        max_tokens: FEASIBILITY_MAX_TOKENS,
    }
}

pub fn generation_plan(text: &str) -> PromptPlan {
    PromptPlan {
        prompt: format!(
            "Write an Excel Formula that {text}, as well as the Google Sheets equivalent. \
             In JSON form, return \"ExcelFormula\" (string) and \"GoogleSheetsFormula\" \
             (string). Don't forget the curly brackets!"
        ),
        temperature: TEMPERATURE,
        max_tokens: GENERATION_MAX_TOKENS,
    }
}

pub fn check_length(text: &str, max_length: usize) -> LengthCheck {
    if text.chars().count() > max_length {
        LengthCheck::TooLong
    } else {
        LengthCheck::Accepted
    }
}

pub fn decode_verdict(raw: &str) -> Result<FeasibilityVerdict, DecodeError> {
    decode_object(raw)
}

pub fn decode_solution(raw: &str) -> Result<FormulaSolution, DecodeError> {
    decode_object(raw)
}

fn decode_object<T: DeserializeOwned>(raw: &str) -> Result<T, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::NotObject);
    }
    serde_json::from_value(value).map_err(|e| DecodeError::Schema(e.to_string()))
}

pub fn training_record_line(prompt: &str, solution: &FormulaSolution) -> Result<String, String> {
    let completion = serde_json::to_string(solution)
        .map_err(|e| format!("failed to serialize solution: {e}"))?
        .replace('\n', "");
    serde_json::to_string(&json!({
        "prompt": prompt,
        "completion": completion,
    }))
    .map_err(|e| format!("failed to serialize training record: {e}"))
}

pub fn error_entry(ts: &str, error: &str, request: &str) -> String {
    format!("------ {ts} {error}\n{request}\n")
}
