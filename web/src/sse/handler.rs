use crate::extractors::caller::Caller;
use crate::{AppState, Error};
use async_stream::stream;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use domain::bot_request as BotApi;
use domain::Id;
use events::{command_channel, status_channel, DomainEvent};
use futures::Stream;
use log::*;
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};

/// Streams status changes of one of the caller's meetings.
///
/// The first event is a snapshot of the current status, so a client that connects
/// between transitions does not have to poll for it.
pub(crate) async fn meeting_events(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
    Path(meeting_id): Path<Id>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let meeting = BotApi::find_meeting(&app_state.lifecycle, &user_id, meeting_id).await?;
    debug!("Establishing SSE status stream for meeting {meeting_id} ({user_id})");

    let mut receiver = app_state.bus.subscribe(&status_channel(meeting_id));
    let snapshot = DomainEvent::MeetingStatusChanged {
        meeting_id,
        user_id: meeting.user_id.clone(),
        platform: meeting.platform.clone(),
        native_meeting_id: meeting.native_meeting_id.clone(),
        status: meeting.status().to_string(),
        timestamp: chrono::Utc::now(),
    }
    .payload()
    .to_string();

    let stream = stream! {
        yield Ok(Event::default().event("meeting.status").data(snapshot));

        while let Some(message) = next_message(&mut receiver, "meeting.status").await {
            yield Ok(Event::default().event("meeting.status").data(message));
        }

        debug!("SSE status stream closed for meeting {meeting_id}");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Command channel a running bot listens on (leave, reconfigure).
pub(crate) async fn bot_commands(
    State(app_state): State<AppState>,
    Path(meeting_id): Path<Id>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Bot of meeting {meeting_id} subscribed to its command channel");

    let mut receiver = app_state.bus.subscribe(&command_channel(meeting_id));
    let stream = stream! {
        while let Some(message) = next_message(&mut receiver, "bot.command").await {
            yield Ok(Event::default().event("bot.command").data(message));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Next message on the channel, or `None` once it closes. A lagging client skips what
/// it missed instead of being disconnected.
async fn next_message(receiver: &mut broadcast::Receiver<String>, name: &str) -> Option<String> {
    loop {
        match receiver.recv().await {
            Ok(message) => return Some(message),
            Err(RecvError::Lagged(skipped)) => {
                warn!("SSE client lagging on {name}; skipped {skipped} message(s)");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}
