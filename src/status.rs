use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbStatus {
    Completed,
    Processing,
    Pending,
    /// Any other non-empty status text, kept verbatim.
    Other(String),
    NotFound,
    /// The database could not be reached; a placeholder, never an error.
    DbError,
}

impl DbStatus {
    /// Interprets a `status` column value. Null or empty reads as pending.
    pub fn from_text(raw: Option<&str>) -> Self {
        let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return DbStatus::Pending;
        };
        match text.to_ascii_lowercase().as_str() {
            "completed" => DbStatus::Completed,
            "processing" => DbStatus::Processing,
            "pending" => DbStatus::Pending,
            _ => DbStatus::Other(text.to_string()),
        }
    }
}

impl fmt::Display for DbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbStatus::Completed => f.write_str("Completed"),
            DbStatus::Processing => f.write_str("Processing"),
            DbStatus::Pending => f.write_str("Pending"),
            DbStatus::Other(s) => f.write_str(s),
            DbStatus::NotFound => f.write_str("Not Found"),
            DbStatus::DbError => f.write_str("DB Error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortalStatus {
    Available,
    NeedsInitialValues,
    InPortalNotReady,
    NotInPortal,
}

impl PortalStatus {
    pub const ALL: [PortalStatus; 4] = [
        PortalStatus::Available,
        PortalStatus::NeedsInitialValues,
        PortalStatus::InPortalNotReady,
        PortalStatus::NotInPortal,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Processing,
    ReadyToProcess,
    NeedsInitialValues,
    InPortalNotReady,
    PendingNotInPortal,
    CompletedOrNotInPortal,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Completed => "Completed",
            JobStatus::Processing => "Processing",
            JobStatus::ReadyToProcess => "Ready to Process",
            JobStatus::NeedsInitialValues => "Needs Initial Values",
            JobStatus::InPortalNotReady => "In Portal (Not Ready)",
            JobStatus::PendingNotInPortal => "Pending (Not in Portal)",
            JobStatus::CompletedOrNotInPortal => "Completed or Not in Portal",
        }
    }

    pub fn is_auto_selected(&self) -> bool {
        matches!(self, JobStatus::ReadyToProcess)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reconciles the persisted and live signals. Database terminal states win;
/// otherwise the live portal state decides.
pub fn combine(db: &DbStatus, portal: PortalStatus) -> JobStatus {
    match (db, portal) {
        (DbStatus::Completed, _) => JobStatus::Completed,
        (DbStatus::Processing, _) => JobStatus::Processing,
        (_, PortalStatus::Available) => JobStatus::ReadyToProcess,
        (_, PortalStatus::NeedsInitialValues) => JobStatus::NeedsInitialValues,
        (_, PortalStatus::InPortalNotReady) => JobStatus::InPortalNotReady,
        (DbStatus::Pending, PortalStatus::NotInPortal) => JobStatus::PendingNotInPortal,
        (_, PortalStatus::NotInPortal) => JobStatus::CompletedOrNotInPortal,
    }
}
