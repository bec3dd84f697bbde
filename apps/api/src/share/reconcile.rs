//! Delivery reconciliation: merges an inbound share into a receiver's draft exactly once.
//!
//! Two arrival paths feed the same pure [`merge`]:
//! - live: a `share-target` message posted by the interception layer;
//! - cold start: the receiver was launched with `?source=share&shareId=<id>` and looks
//!   the payload up in the pending-share store, then retires the record.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::share::codec::decode_data_url;
use crate::share::models::{non_blank, ShareId, ShareMessage, SharePayload};
use crate::share::store::PendingShareStore;

/// The image slot of a draft; `data_url` is what the downstream pipeline consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSlot {
    pub name: String,
    pub mime_type: String,
    pub data_url: String,
}

/// Receiver-side application state touched by shares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub job_post: String,
    pub attachment: Option<AttachmentSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// What the receiver tells the user after a reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    ImageAndText,
    Content,
    Image { name: String },
    NothingToShare,
    /// Cold start found no record for the token.
    NoContent,
    /// Cold start could not reach the store.
    LoadFailed,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::ImageAndText => "Shared image and text received!".to_string(),
            Notice::Content => "Shared content received!".to_string(),
            Notice::Image { name } => format!("Shared image received ({name})!"),
            Notice::NothingToShare => "No content to share".to_string(),
            Notice::NoContent => "No shared content found".to_string(),
            Notice::LoadFailed => "Error loading shared content".to_string(),
        }
    }

    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::ImageAndText | Notice::Content | Notice::Image { .. } => NoticeLevel::Success,
            Notice::NothingToShare | Notice::NoContent => NoticeLevel::Warning,
            Notice::LoadFailed => NoticeLevel::Error,
        }
    }
}

/// Joins the shared title, link and text into the job-post field.
pub fn format_shared_content(
    title: Option<&str>,
    url: Option<&str>,
    text: Option<&str>,
) -> String {
    fn present(v: Option<&str>) -> Option<&str> {
        v.filter(|s| !s.trim().is_empty())
    }

    let mut content = String::new();
    if let Some(url) = present(url) {
        content.push_str(&format!("URL: {url}\n\n"));
    }
    if let Some(text) = present(text) {
        content.push_str(text);
    }
    if let Some(title) = present(title) {
        if Some(title) != present(text) {
            content = format!("Title: {title}\n\n{content}");
        }
    }
    content.trim().to_string()
}

/// First attachment that decodes to an image.
fn usable_image(payload: &SharePayload) -> Option<AttachmentSlot> {
    payload.attachments.iter().find_map(|attachment| {
        match decode_data_url(&attachment.encoded_data) {
            Ok(decoded) if decoded.mime_type.starts_with("image/") => Some(AttachmentSlot {
                name: attachment.name.clone(),
                mime_type: decoded.mime_type,
                data_url: attachment.encoded_data.clone(),
            }),
            Ok(decoded) => {
                debug!(name = %attachment.name, mime = %decoded.mime_type, "Skipping non-image attachment");
                None
            }
            Err(e) => {
                warn!(name = %attachment.name, error = %e, "Skipping undecodable attachment");
                None
            }
        }
    })
}

/// Merges a payload into a draft. Text and attachment are independent slots: both
/// are applied when both are present. Merging the same payload twice yields the
/// same draft.
pub fn merge(draft: Draft, payload: &SharePayload) -> (Draft, Notice) {
    let mut draft = draft;
    let image = usable_image(payload);
    let has_text = non_blank(&payload.text) || non_blank(&payload.url);

    if has_text {
        draft.job_post = format_shared_content(
            payload.title.as_deref(),
            payload.url.as_deref(),
            payload.text.as_deref(),
        );
    }

    let notice = match (image, has_text) {
        (Some(slot), true) => {
            draft.attachment = Some(slot);
            Notice::ImageAndText
        }
        (Some(slot), false) => {
            let name = slot.name.clone();
            draft.attachment = Some(slot);
            Notice::Image { name }
        }
        (None, true) => Notice::Content,
        (None, false) => Notice::NothingToShare,
    };

    (draft, notice)
}

/// Query parameters a receiver is launched with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchParams {
    pub source: Option<String>,
    #[serde(rename = "shareId")]
    pub share_id: Option<String>,
}

impl LaunchParams {
    /// The correlation token, when this launch came from a stored share.
    pub fn correlation(&self) -> Option<ShareId> {
        if self.source.as_deref() != Some("share") {
            return None;
        }
        self.share_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ShareId::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "shareId", rename_all = "snake_case")]
pub enum ReconcileState {
    Idle,
    AwaitingShare(ShareId),
    Reconciled(ShareId),
    Abandoned(ShareId),
}

/// Per-receiver reconciliation state machine.
#[derive(Debug)]
pub struct Reconciler {
    state: ReconcileState,
    draft: Draft,
    applied: HashSet<ShareId>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Draft::default())
    }
}

impl Reconciler {
    pub fn new(draft: Draft) -> Self {
        Self {
            state: ReconcileState::Idle,
            draft,
            applied: HashSet::new(),
        }
    }

    pub fn state(&self) -> &ReconcileState {
        &self.state
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Live path: applies immediately, no store access.
    pub fn apply_message(&mut self, message: ShareMessage) -> Notice {
        let payload = message.into_payload();
        let share_id = payload.share_id.clone();
        let notice = self.apply(&payload);

        if self.state == ReconcileState::AwaitingShare(share_id.clone()) {
            self.state = ReconcileState::Reconciled(share_id);
        }
        notice
    }

    /// Cold-start path. Returns `None` when the launch carries no share token or the
    /// token was already applied in this receiver.
    pub async fn launch(
        &mut self,
        params: &LaunchParams,
        store: &dyn PendingShareStore,
    ) -> Option<Notice> {
        let share_id = params.correlation()?;

        if self.applied.contains(&share_id) {
            debug!(share_id = %share_id, "Share already applied; skipping lookup");
            self.state = ReconcileState::Reconciled(share_id);
            return None;
        }

        self.state = ReconcileState::AwaitingShare(share_id.clone());

        // Lookup and retirement are one step, so only one receiver can win a token.
        let record = match store.take(&share_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(share_id = %share_id, error = %e, "Could not look up pending share");
                self.state = ReconcileState::Abandoned(share_id);
                return Some(Notice::LoadFailed);
            }
        };

        let Some(record) = record else {
            info!(share_id = %share_id, "No pending share found");
            self.state = ReconcileState::Abandoned(share_id);
            return Some(Notice::NoContent);
        };

        let notice = self.apply(&SharePayload::from(record));
        info!(share_id = %share_id, "Pending share reconciled");
        self.state = ReconcileState::Reconciled(share_id);
        Some(notice)
    }

    fn apply(&mut self, payload: &SharePayload) -> Notice {
        let (draft, notice) = merge(std::mem::take(&mut self.draft), payload);
        self.draft = draft;
        self.applied.insert(payload.share_id.clone());
        notice
    }
}
