use chrono::{DateTime, Utc};

pub type EmailId = String;

/// One message as returned by the query, before download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: EmailId,
    pub blob_id: String,
    pub received_at: DateTime<Utc>,
    pub subject: Option<String>,
}
