//! Share interception — turns an OS share submission into a [`SharePayload`] and
//! hands it to a receiver.
//!
//! Delivery order of preference:
//! 1. a live receiver is open → post the message directly and focus it;
//! 2. none is open → persist the payload and send the OS to the app root with
//!    `?source=share&shareId=<id>` so the fresh receiver looks the payload up itself.
//!
//! Nothing in here returns an error to the caller: every failure is logged and the
//! share degrades to "delivered with less content" or "lost".

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::share::codec::{serialize_attachment, CodecError};
use crate::share::models::{PendingShareRecord, ShareId, ShareMessage, SharePayload};
use crate::share::receivers::{ReceiverHub, ReceiverId};
use crate::share::store::PendingShareStore;

/// One file part as read from the submission, already known to be within the ceiling.
#[derive(Debug, Clone)]
pub struct RawAttachment {
    /// 1-based place among the submission's file parts.
    pub position: usize,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct ShareSubmission {
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub files: Vec<RawAttachment>,
    /// File parts discarded for exceeding the size ceiling.
    pub dropped: usize,
}

impl ShareSubmission {
    fn set_scalar(&mut self, field: &str, value: String) {
        let value = Some(value).filter(|v| !v.trim().is_empty());
        match field {
            "title" => self.title = value,
            "text" => self.text = value,
            "url" => self.url = value,
            _ => {}
        }
    }
}

enum BoundedRead {
    Complete(Bytes),
    Oversized(usize),
}

/// Reads a file part chunk by chunk. Once the running total passes `ceiling` the
/// buffer is released and the rest of the part is only counted.
async fn read_bounded(mut field: Field<'_>, ceiling: usize) -> Result<BoundedRead, MultipartError> {
    let mut buf = BytesMut::new();
    let mut total = 0usize;
    let mut oversized = false;

    while let Some(chunk) = field.chunk().await? {
        total += chunk.len();
        if oversized {
            continue;
        }
        if total > ceiling {
            oversized = true;
            buf = BytesMut::new();
            continue;
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(if oversized {
        BoundedRead::Oversized(total)
    } else {
        BoundedRead::Complete(buf.freeze())
    })
}

/// Parses the multipart share submission (`title`, `text`, `url`, `files`).
///
/// Unreadable fields are skipped; a malformed stream ends parsing but keeps
/// everything read up to that point.
pub async fn read_submission(mut multipart: Multipart, ceiling: usize) -> ShareSubmission {
    let mut submission = ShareSubmission::default();
    let mut file_count = 0usize;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed share submission; keeping fields read so far");
                break;
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" | "text" | "url" => match field.text().await {
                Ok(value) => submission.set_scalar(&name, value),
                Err(e) => warn!(field = %name, error = %e, "Unreadable share field; skipping"),
            },
            "files" => {
                let file_name = field
                    .file_name()
                    .map(String::from)
                    .filter(|n| !n.is_empty());
                let mime_type = field.content_type().map(String::from);

                match read_bounded(field, ceiling).await {
                    Ok(BoundedRead::Complete(bytes)) => {
                        // Browsers send an empty part when the share carries no file.
                        if bytes.is_empty() && file_name.is_none() {
                            continue;
                        }
                        file_count += 1;
                        submission.files.push(RawAttachment {
                            position: file_count,
                            name: file_name,
                            mime_type,
                            bytes,
                        });
                    }
                    Ok(BoundedRead::Oversized(size)) => {
                        file_count += 1;
                        submission.dropped += 1;
                        warn!(
                            position = file_count,
                            name = file_name.as_deref().unwrap_or("-"),
                            size,
                            ceiling,
                            "Dropping oversized shared file"
                        );
                    }
                    Err(e) => {
                        file_count += 1;
                        warn!(position = file_count, error = %e, "Unreadable shared file; skipping");
                    }
                }
            }
            other => debug!(field = other, "Ignoring unknown share field"),
        }
    }

    submission
}

/// Where a share ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Posted straight to an open receiver.
    Live { receiver: ReceiverId, share_id: ShareId },
    /// Persisted for a fresh receiver to pick up via `launch_url`.
    Stored { share_id: ShareId, launch_url: String },
    /// Neither path worked; the content is gone.
    Lost { reason: String },
}

impl DeliveryOutcome {
    /// The URL the OS share sheet is redirected to.
    pub fn redirect_location(&self, app_root: &str) -> String {
        match self {
            DeliveryOutcome::Stored { launch_url, .. } => launch_url.clone(),
            _ => app_root.to_string(),
        }
    }
}

pub fn launch_url(app_root: &str, share_id: &ShareId) -> String {
    format!("{app_root}?source=share&shareId={share_id}")
}

#[derive(Clone)]
pub struct Interceptor {
    store: Arc<dyn PendingShareStore>,
    receivers: ReceiverHub,
    max_attachment_bytes: usize,
    app_root: String,
}

impl Interceptor {
    pub fn new(
        store: Arc<dyn PendingShareStore>,
        receivers: ReceiverHub,
        max_attachment_bytes: usize,
        app_root: String,
    ) -> Self {
        Self {
            store,
            receivers,
            max_attachment_bytes,
            app_root,
        }
    }

    /// Builds the payload and delivers it. Never fails.
    pub async fn intercept(&self, submission: ShareSubmission) -> DeliveryOutcome {
        let dropped = submission.dropped;
        let payload = self.build_payload(submission);
        info!(
            share_id = %payload.share_id,
            has_text = payload.has_text(),
            attachments = payload.attachments.len(),
            dropped,
            "Intercepted share"
        );
        self.deliver(payload).await
    }

    /// Serializes surviving files in submission order. A file that fails to
    /// serialize is left out; the rest of the share is unaffected.
    pub fn build_payload(&self, submission: ShareSubmission) -> SharePayload {
        let mut attachments = Vec::with_capacity(submission.files.len());

        for file in submission.files {
            match serialize_attachment(
                &file.bytes,
                file.mime_type.as_deref(),
                file.name.as_deref(),
                file.position,
                self.max_attachment_bytes,
            ) {
                Ok(attachment) => attachments.push(attachment),
                Err(CodecError::TooLarge { size, ceiling }) => {
                    warn!(position = file.position, size, ceiling, "Dropping oversized shared file");
                }
                Err(e) => {
                    warn!(position = file.position, error = %e, "Could not serialize shared file; omitting");
                }
            }
        }

        SharePayload {
            title: submission.title,
            text: submission.text,
            url: submission.url,
            attachments,
            share_id: ShareId::generate(),
            created_at: Utc::now(),
        }
    }

    pub async fn deliver(&self, payload: SharePayload) -> DeliveryOutcome {
        if let Some(receiver) = self.post_to_live_receiver(&payload) {
            return DeliveryOutcome::Live {
                receiver,
                share_id: payload.share_id,
            };
        }

        let share_id = payload.share_id.clone();
        match self.store.put(PendingShareRecord::from(payload.clone())).await {
            Ok(()) => {
                info!(share_id = %share_id, "No live receiver; share stored for cold start");
                DeliveryOutcome::Stored {
                    launch_url: launch_url(&self.app_root, &share_id),
                    share_id,
                }
            }
            Err(e) => {
                warn!(share_id = %share_id, error = %e, "Could not store share; retrying direct delivery");
                match self.post_to_live_receiver(&payload) {
                    Some(receiver) => DeliveryOutcome::Live { receiver, share_id },
                    None => {
                        warn!(share_id = %share_id, "Share lost: no receiver and no store");
                        DeliveryOutcome::Lost {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }
    }

    fn post_to_live_receiver(&self, payload: &SharePayload) -> Option<ReceiverId> {
        let message = ShareMessage::from(payload);
        for receiver in self.receivers.live_receivers() {
            if self.receivers.post(receiver, message.clone()) {
                self.receivers.focus(receiver);
                debug!(share_id = %payload.share_id, receiver = %receiver, "Posted share to live receiver");
                return Some(receiver);
            }
        }
        None
    }
}
