//! Types moved through the share pipeline: the payload built at interception time,
//! its persisted record form, and the message shape posted to live receivers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation token linking an interception to its later reconciliation.
///
/// Format: `share-<unix millis>-<12 hex chars>`. The millisecond component orders
/// shares in time; the random suffix keeps concurrent shares apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(String);

impl ShareId {
    pub fn generate() -> Self {
        let random = Uuid::new_v4().simple().to_string();
        ShareId(format!(
            "share-{}-{}",
            Utc::now().timestamp_millis(),
            &random[..12]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ShareId {
    fn from(value: String) -> Self {
        ShareId(value)
    }
}

impl From<&str> for ShareId {
    fn from(value: &str) -> Self {
        ShareId(value.to_string())
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One shared file in transport-safe form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedAttachment {
    pub name: String,
    pub mime_type: String,
    pub byte_size: usize,
    /// `data:<mime>;base64,<payload>`, decodable without side information.
    pub encoded_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    /// Share order; oversized or unreadable files are already gone.
    pub attachments: Vec<SerializedAttachment>,
    pub share_id: ShareId,
    pub created_at: DateTime<Utc>,
}

impl SharePayload {
    pub fn has_text(&self) -> bool {
        non_blank(&self.text) || non_blank(&self.url)
    }
}

/// Persisted form of a [`SharePayload`], keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingShareRecord {
    pub id: ShareId,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub attachments: Vec<SerializedAttachment>,
}

impl From<SharePayload> for PendingShareRecord {
    fn from(payload: SharePayload) -> Self {
        PendingShareRecord {
            id: payload.share_id,
            timestamp: payload.created_at,
            title: payload.title,
            text: payload.text,
            url: payload.url,
            attachments: payload.attachments,
        }
    }
}

impl From<PendingShareRecord> for SharePayload {
    fn from(record: PendingShareRecord) -> Self {
        SharePayload {
            title: record.title,
            text: record.text,
            url: record.url,
            attachments: record.attachments,
            share_id: record.id,
            created_at: record.timestamp,
        }
    }
}

/// Body of a `share-target` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTargetMessage {
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<SerializedAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_id: Option<ShareId>,
}

/// Cross-context message delivered to live receivers. Closed set, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ShareMessage {
    #[serde(rename = "share-target")]
    ShareTarget(ShareTargetMessage),
}

impl ShareMessage {
    /// Rebuilds the payload the message carries. Messages without a correlation
    /// token get a fresh one so the payload stays well-formed.
    pub fn into_payload(self) -> SharePayload {
        match self {
            ShareMessage::ShareTarget(msg) => SharePayload {
                title: msg.title,
                text: msg.text,
                url: msg.url,
                attachments: msg.attachments,
                share_id: msg.share_id.unwrap_or_else(ShareId::generate),
                created_at: Utc::now(),
            },
        }
    }
}

impl From<&SharePayload> for ShareMessage {
    fn from(payload: &SharePayload) -> Self {
        ShareMessage::ShareTarget(ShareTargetMessage {
            title: payload.title.clone(),
            text: payload.text.clone(),
            url: payload.url.clone(),
            attachments: payload.attachments.clone(),
            share_id: Some(payload.share_id.clone()),
        })
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
