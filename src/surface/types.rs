use serde::{Deserialize, Serialize};

/// One line sent to the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ping,
    Navigate { url: String },
    SelectOption { picker: String, text: String },
    FillField { field: String, value: String },
    Click { action: String },
    CurrentUrl,
    AcceptAlert,
    ScanQueue { url: String },
    Quit,
}

impl BridgeRequest {
    pub fn op(&self) -> &'static str {
        match self {
            BridgeRequest::Ping => "ping",
            BridgeRequest::Navigate { .. } => "navigate",
            BridgeRequest::SelectOption { .. } => "select_option",
            BridgeRequest::FillField { .. } => "fill_field",
            BridgeRequest::Click { .. } => "click",
            BridgeRequest::CurrentUrl => "current_url",
            BridgeRequest::AcceptAlert => "accept_alert",
            BridgeRequest::ScanQueue { .. } => "scan_queue",
            BridgeRequest::Quit => "quit",
        }
    }
}

/// One line read back from the bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeReply {
    pub ok: bool,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeDiag {
    pub driver: String,
    #[serde(default)]
    pub driver_version: Option<String>,
    #[serde(default)]
    pub current_url: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
