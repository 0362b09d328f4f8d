//! User-initiated stops and the delayed stop that guarantees they finish.

use crate::context::LifecycleContext;
use crate::error::Error;
use crate::transition::{apply_transition, TransitionOutcome, TransitionRequest, TransitionSource};
use crate::Id;
use entity::meetings::Model;
use entity::{CompletionReason, MeetingStatus};
use entity_api::meeting;
use events::{BotCommand, DomainEvent};
use log::*;
use serde::Serialize;
use std::time::Duration;

/// How a stop request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Every meeting for the key had already finished
    AlreadyStopped,
    /// The stop was started; it completes in the background
    Accepted,
}

/// Stops every unfinished meeting for `(user_id, platform, native_meeting_id)`.
///
/// Returns once the stop has been set in motion; the runtime is terminated later by
/// a delayed stop, which also finalizes the meeting if the bot never reports back.
pub async fn stop_meeting(
    ctx: &LifecycleContext,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
) -> Result<StopOutcome, Error> {
    let meetings =
        meeting::find_by_natural_key(ctx.db(), user_id, platform, native_meeting_id).await?;

    if meetings.is_empty() {
        return Err(Error::not_found(format!(
            "No meeting found for {platform}/{native_meeting_id}"
        )));
    }

    let (_terminal, active): (Vec<Model>, Vec<Model>) =
        meetings.into_iter().partition(|m| m.is_terminal());

    if active.is_empty() {
        info!("Stop for {platform}/{native_meeting_id}: all meetings already finished");
        return Ok(StopOutcome::AlreadyStopped);
    }

    for meeting in active {
        stop_one(ctx, meeting).await?;
    }

    Ok(StopOutcome::Accepted)
}

async fn stop_one(ctx: &LifecycleContext, meeting: Model) -> Result<(), Error> {
    let meeting_id = meeting.id;
    let status = meeting.status();

    let handle = match meeting.runtime_instance_id.clone() {
        Some(handle) => handle,
        None => {
            info!("Meeting {meeting_id} has no runtime instance; finalizing immediately");
            finalize_stopped(ctx, meeting_id, TransitionSource::User, "stopped_before_start")
                .await?;
            ctx.schedule_post_lifecycle(meeting_id);
            return Ok(());
        }
    };

    let threshold = ctx.settings.fast_stop_threshold;
    let age = chrono::Utc::now().signed_duration_since(meeting.created_at.with_timezone(&chrono::Utc));
    let young = !threshold.is_zero() && age.to_std().map_or(true, |age| age < threshold);

    if status.is_pre_active() && young {
        info!(
            "Fast stop for meeting {meeting_id} ({status}, {}ms old)",
            age.num_milliseconds()
        );
        let request = TransitionRequest::completed(CompletionReason::Stopped)
            .source(TransitionSource::User)
            .reason("User requested stop")
            .metadata("fast_stop", true)
            .mark_stop_requested();
        let outcome = apply_transition(ctx.db(), meeting_id, request).await?;
        if let TransitionOutcome::Applied { meeting, .. } = &outcome {
            ctx.publish_status(meeting).await;
        }
        ctx.schedule_delayed_stop(meeting_id, handle, Duration::ZERO);
        ctx.schedule_post_lifecycle(meeting_id);
        return Ok(());
    }

    ctx.events
        .publish(DomainEvent::BotCommand {
            meeting_id,
            command: BotCommand::Leave,
        })
        .await;
    ctx.schedule_delayed_stop(meeting_id, handle, ctx.settings.delayed_stop);

    let request = TransitionRequest::new(MeetingStatus::Stopping)
        .source(TransitionSource::User)
        .reason("User requested stop")
        .mark_stop_requested();
    match apply_transition(ctx.db(), meeting_id, request).await? {
        TransitionOutcome::Applied { meeting, .. } => ctx.publish_status(&meeting).await,
        TransitionOutcome::Rejected { meeting, .. } => {
            warn!(
                "Meeting {meeting_id} moved to '{}' before it could be marked stopping",
                meeting.status
            );
        }
        _ => {}
    }

    Ok(())
}

async fn finalize_stopped(
    ctx: &LifecycleContext,
    meeting_id: Id,
    source: TransitionSource,
    reason: &str,
) -> Result<TransitionOutcome, Error> {
    let request = TransitionRequest::completed(CompletionReason::Stopped)
        .source(source)
        .reason(reason);
    let outcome = apply_transition(ctx.db(), meeting_id, request).await?;
    if let TransitionOutcome::Applied { meeting, .. } = &outcome {
        ctx.publish_status(meeting).await;
    }
    Ok(outcome)
}

/// Stops the runtime instance after `delay`, then finalizes the meeting if nothing
/// else has.
///
/// Never cancelled: if the meeting finished in the meantime this only re-issues the
/// (idempotent) runtime stop.
pub async fn delayed_stop(ctx: LifecycleContext, meeting_id: Id, handle: String, delay: Duration) {
    tokio::time::sleep(delay).await;

    if let Err(err) = ctx.runtime.stop(&handle).await {
        warn!("Delayed stop of runtime instance {handle} (meeting {meeting_id}) failed: {err}");
    }

    tokio::time::sleep(ctx.settings.finalize_grace).await;

    match meeting::find_by_id(ctx.db(), meeting_id).await {
        Ok(meeting) if meeting.is_terminal() => {
            debug!("Meeting {meeting_id} already '{}' after delayed stop", meeting.status);
            return;
        }
        Ok(_) => {}
        Err(err) => {
            error!("Delayed stop could not load meeting {meeting_id}: {err}");
            return;
        }
    }

    let request = TransitionRequest::completed(CompletionReason::Stopped)
        .source(TransitionSource::DelayedStopFinalizer)
        .reason("delayed_stop_finalizer")
        .metadata("container_id", handle.as_str())
        .metadata("finalized_by", "delayed_stop");

    match apply_transition(ctx.db(), meeting_id, request).await {
        Ok(TransitionOutcome::Applied { meeting, .. }) => {
            warn!("Meeting {meeting_id} finalized by delayed stop; no exit callback arrived");
            ctx.publish_status(&meeting).await;
            ctx.post_lifecycle.dispatch(meeting_id).await;
        }
        Ok(_) => debug!("Meeting {meeting_id} finalized concurrently with delayed stop"),
        Err(err) => error!("Delayed stop could not finalize meeting {meeting_id}: {err}"),
    }
}
