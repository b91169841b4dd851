//! Operator-facing log stream.
//!
//! Workers push [`LogEvent`]s into a channel that the foreground drains;
//! they never touch display state directly. A sink without a channel logs
//! straight to `tracing` instead.

use crate::util::now_rfc3339;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Load,
    Status,
    Batch,
    Lot,
    Monitor,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Load => "load",
            LogCategory::Status => "status",
            LogCategory::Batch => "batch",
            LogCategory::Lot => "lot",
            LogCategory::Monitor => "monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    pub category: LogCategory,
}

impl LogEvent {
    pub fn log(&self) {
        match self.level {
            Level::Info => info!(category = self.category.as_str(), "{}", self.message),
            Level::Warn => warn!(category = self.category.as_str(), "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<LogEvent>>,
}

impl EventSink {
    pub fn channel() -> (EventSink, Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    pub fn direct() -> EventSink {
        EventSink { tx: None }
    }

    pub fn emit(&self, category: LogCategory, message: impl Into<String>) {
        self.send(Level::Info, category, message.into());
    }

    pub fn warn(&self, category: LogCategory, message: impl Into<String>) {
        self.send(Level::Warn, category, message.into());
    }

    fn send(&self, level: Level, category: LogCategory, message: String) {
        let event = LogEvent {
            timestamp: now_rfc3339(),
            level,
            message,
            category,
        };
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::SendError(event)) = tx.send(event) {
                    // Nobody is draining any more; keep the trail in the log.
                    event.log();
                }
            }
            None => event.log(),
        }
    }
}
