//! Best-effort activity logging.
//!
//! A failed log write degrades the audit trail, never the operation that
//! triggered it.

use tracing::{info, warn};

use crate::traits::CrmStore;

pub async fn log_activity(
    store: &dyn CrmStore,
    uid: &str,
    activity_type: &str,
    details: &str,
    contact_id: Option<&str>,
) {
    if uid.is_empty() {
        warn!("No user id provided for activity logging");
        return;
    }

    match store
        .append_activity(uid, activity_type, details, contact_id)
        .await
    {
        Ok(()) => info!(uid, activity_type, "Activity logged: {}", details),
        Err(e) => warn!(uid, activity_type, "Activity logging failed: {}", e),
    }
}
