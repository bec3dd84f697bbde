//! Axum handlers for the share pipeline: the OS share target, receiver sessions and
//! the one-shot claim endpoint.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::Method,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::share::intercept::{read_submission, DeliveryOutcome};
use crate::share::models::{ShareId, ShareMessage, SharePayload};
use crate::share::receivers::{ReceiverEvent, ReceiverId, ReceiverRegistration};
use crate::share::reconcile::{Draft, LaunchParams, Notice, NoticeLevel, ReconcileState, Reconciler};
use crate::state::AppState;

const SHARE_TARGET_SEGMENT: &str = "share-target";
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Router fallback. Takes `POST` on any path ending in `/share-target` so the app
/// keeps working when hosted under a subpath; everything else is a 404.
pub async fn handle_fallback(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let is_share_target = path
        .strip_suffix(SHARE_TARGET_SEGMENT)
        .is_some_and(|prefix| prefix.ends_with('/'));

    if request.method() != Method::POST || !is_share_target {
        return AppError::NotFound(format!("No route for {} {path}", request.method()))
            .into_response();
    }

    handle_share_target(state, app_root_for(&path), request)
        .await
        .into_response()
}

/// `/jobmail/share-target` -> `/jobmail/`.
fn app_root_for(share_target_path: &str) -> String {
    share_target_path
        .strip_suffix(SHARE_TARGET_SEGMENT)
        .filter(|root| !root.is_empty())
        .unwrap_or("/")
        .to_string()
}

/// Always answers 303 so the OS share sheet completes, whatever happened to the share.
async fn handle_share_target(state: AppState, app_root: String, request: Request) -> Redirect {
    let multipart = match Multipart::from_request(request, &state).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!(error = %rejection, "Share submission is not multipart; nothing delivered");
            return Redirect::to(&app_root);
        }
    };

    let submission = read_submission(multipart, state.config.max_attachment_bytes).await;
    let interceptor = state.interceptor(app_root.clone());

    // Detached: a client hanging up must not cancel delivery halfway.
    let outcome = match tokio::spawn(async move { interceptor.intercept(submission).await }).await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Share delivery task failed");
            DeliveryOutcome::Lost {
                reason: e.to_string(),
            }
        }
    };

    match &outcome {
        DeliveryOutcome::Live { receiver, share_id } => {
            info!(share_id = %share_id, receiver = %receiver, "Share delivered live")
        }
        DeliveryOutcome::Stored { share_id, .. } => {
            info!(share_id = %share_id, "Share stored; redirecting to launch URL")
        }
        DeliveryOutcome::Lost { reason } => warn!(reason = %reason, "Share could not be delivered"),
    }

    Redirect::to(&outcome.redirect_location(&app_root))
}

#[derive(Serialize)]
struct NoticeView<'a> {
    #[serde(flatten)]
    notice: &'a Notice,
    message: String,
    level: NoticeLevel,
}

#[derive(Serialize)]
struct DraftView<'a> {
    #[serde(flatten)]
    state: &'a ReconcileState,
    draft: &'a Draft,
    notice: Option<NoticeView<'a>>,
}

fn draft_event(reconciler: &Reconciler, notice: Option<&Notice>) -> Event {
    let view = DraftView {
        state: reconciler.state(),
        draft: reconciler.draft(),
        notice: notice.map(|notice| NoticeView {
            notice,
            message: notice.message(),
            level: notice.level(),
        }),
    };
    Event::default()
        .event("draft")
        .json_data(view)
        .unwrap_or_else(|e| {
            error!(error = %e, "Could not serialize draft event");
            Event::default().event("error").data("draft unavailable")
        })
}

fn ready_event(receiver: ReceiverId) -> Event {
    Event::default()
        .event("ready")
        .json_data(serde_json::json!({ "receiverId": receiver }))
        .unwrap_or_else(|_| Event::default().event("ready").data(receiver.to_string()))
}

/// One open receiver: its registration (dropping it unregisters) and its draft.
struct ReceiverSession {
    registration: ReceiverRegistration,
    reconciler: Reconciler,
}

impl ReceiverSession {
    fn render(&mut self, event: ReceiverEvent) -> Event {
        match event {
            ReceiverEvent::Share(message) => {
                let notice = self.reconciler.apply_message(message);
                draft_event(&self.reconciler, Some(&notice))
            }
            ReceiverEvent::Focus => Event::default()
                .event("focus")
                .data(self.registration.id().to_string()),
        }
    }
}

/// GET /api/v1/receivers/stream?source=share&shareId=<id>
///
/// Opens a receiver session over SSE. A launch carrying a share token is
/// reconciled against the pending store before any live share is rendered.
pub async fn handle_receiver_stream(
    State(state): State<AppState>,
    Query(params): Query<LaunchParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Registered before the lookup so a live share arriving meanwhile is queued.
    let (registration, events) = state.receivers.register();
    let receiver = registration.id();

    let mut reconciler = Reconciler::default();
    let notice = reconciler.launch(&params, state.store.as_ref()).await;

    let mut initial = vec![ready_event(receiver)];
    if let Some(notice) = &notice {
        initial.push(draft_event(&reconciler, Some(notice)));
    }
    info!(receiver = %receiver, cold_start = notice.is_some(), "Receiver session opened");

    let mut session = ReceiverSession {
        registration,
        reconciler,
    };
    let live = ReceiverStream::new(events).map(move |event| Ok(session.render(event)));
    let stream = stream::iter(initial.into_iter().map(Ok)).chain(live);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
}

/// POST /api/v1/shares/:id/claim
///
/// Cold-start pickup for clients that do not hold a receiver session: returns the
/// pending share as a `share-target` message and retires it.
pub async fn handle_claim_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShareMessage>, AppError> {
    let share_id = ShareId::from(id);

    let record = state
        .store
        .take(&share_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No pending share '{share_id}'")))?;

    info!(share_id = %share_id, "Pending share claimed");
    Ok(Json(ShareMessage::from(&SharePayload::from(record))))
}
