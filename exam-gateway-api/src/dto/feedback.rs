use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every field is optional at the wire level so that a missing value is
/// reported as a validation failure rather than a malformed body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub section: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub email: Option<String>,
    pub question_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub section: String,
    /// HTML-escaped
    pub subject: String,
    /// HTML-escaped
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub received_at: DateTime<Utc>,
}
