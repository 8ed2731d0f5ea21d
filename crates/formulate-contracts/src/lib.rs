use serde::{Deserialize, Serialize};
use std::fmt;

pub const EVENT_REQUEST_SOLUTION: &str = "CTS_RequestSolution";
pub const EVENT_CONNECTED: &str = "STC_Connected";
pub const EVENT_INVALID_PROMPT: &str = "STC_InvalidPrompt";
pub const EVENT_SOLUTION: &str = "STC_Solution";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(format!("conn_{}", uuid::Uuid::new_v4().as_simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RequestSolution {
    pub request: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "CTS_RequestSolution")]
    RequestSolution(RequestSolution),
}

impl ClientEvent {
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "STC_Connected")]
    Connected { id: ConnectionId },
    #[serde(rename = "STC_InvalidPrompt")]
    InvalidPrompt { reason: String },
    #[serde(rename = "STC_Solution")]
    Solution {
        #[serde(rename = "excelSolution")]
        excel_solution: String,
        #[serde(rename = "googleSheetsSolution")]
        google_sheets_solution: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => EVENT_CONNECTED,
            ServerEvent::InvalidPrompt { .. } => EVENT_INVALID_PROMPT,
            ServerEvent::Solution { .. } => EVENT_SOLUTION,
        }
    }

    pub fn invalid_prompt(reason: impl Into<String>) -> Self {
        ServerEvent::InvalidPrompt {
            reason: reason.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&FormulaSolution> for ServerEvent {
    fn from(solution: &FormulaSolution) -> Self {
        ServerEvent::Solution {
            excel_solution: solution.excel_formula.clone(),
            google_sheets_solution: solution.sheets_formula.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeasibilityVerdict {
    #[serde(rename = "Possible")]
    pub possible: bool,
    #[serde(rename = "Reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormulaSolution {
    #[serde(rename = "ExcelFormula")]
    pub excel_formula: String,
    #[serde(rename = "GoogleSheetsFormula")]
    pub sheets_formula: String,
}
