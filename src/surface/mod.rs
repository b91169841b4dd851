pub mod bridge;
pub mod types;

use crate::error::Result;
use crate::scanner::PortalJobRecord;

pub use types::{BridgeDiag, BridgeReply, BridgeRequest};

/// The single browser/portal session everything is driven through.
///
/// Element, picker and action ids are opaque strings from configuration.
/// Implementations serialize access internally; callers guarantee at most one
/// logical operation drives a surface at a time.
pub trait AutomationSurface: Send + Sync {
    fn navigate(&self, url: &str) -> Result<()>;
    /// Picks the option whose label equals `search_text` exactly.
    fn select_option(&self, picker_id: &str, search_text: &str) -> Result<bool>;
    fn fill_field(&self, field_id: &str, value: &str) -> Result<()>;
    /// Returns false when the action is absent, hidden or disabled.
    fn click(&self, action_id: &str) -> Result<bool>;
    fn read_current_url(&self) -> Result<String>;
    fn accept_pending_alert(&self) -> Result<Option<String>>;
}

pub trait QueueSource: Send + Sync {
    fn scan_queue(&self, queue_url: &str) -> Result<Vec<PortalJobRecord>>;
}

impl<T: QueueSource + ?Sized> QueueSource for std::sync::Arc<T> {
    fn scan_queue(&self, queue_url: &str) -> Result<Vec<PortalJobRecord>> {
        (**self).scan_queue(queue_url)
    }
}

impl<T: AutomationSurface + ?Sized> AutomationSurface for std::sync::Arc<T> {
    fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url)
    }
    fn select_option(&self, picker_id: &str, search_text: &str) -> Result<bool> {
        (**self).select_option(picker_id, search_text)
    }
    fn fill_field(&self, field_id: &str, value: &str) -> Result<()> {
        (**self).fill_field(field_id, value)
    }
    fn click(&self, action_id: &str) -> Result<bool> {
        (**self).click(action_id)
    }
    fn read_current_url(&self) -> Result<String> {
        (**self).read_current_url()
    }
    fn accept_pending_alert(&self) -> Result<Option<String>> {
        (**self).accept_pending_alert()
    }
}
