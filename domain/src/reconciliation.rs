//! Periodic sweep that repairs drift between stored meeting state and the runtime.
//!
//! Phase one walks the store: unfinished meetings whose runtime instance is gone are
//! zombies and get finalized. Phase two walks the runtime: instances whose meeting is
//! unknown or finished are orphans and get stopped.

use crate::context::LifecycleContext;
use crate::error::Error;
use crate::transition::{apply_transition, TransitionOutcome, TransitionRequest, TransitionSource};
use crate::Id;
use bot_runtime::RunningInstance;
use entity::meetings::Model;
use entity::CompletionReason;
use entity_api::meeting;
use log::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tally of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Unfinished meetings with a runtime instance that were checked
    pub checked: usize,
    pub zombies_finalized: usize,
    /// Meetings left alone because the runtime could not give a definite answer
    pub skipped: usize,
    pub orphans_stopped: usize,
    pub errors: usize,
}

/// Runs both phases once. Per-meeting and per-instance failures are counted, not
/// returned; only a failure to read the meeting table aborts the sweep.
pub async fn run_sweep(ctx: &LifecycleContext) -> Result<SweepReport, Error> {
    let mut report = SweepReport::default();

    let unfinished = meeting::find_non_terminal(ctx.db()).await?;
    debug!("Reconciliation: {} unfinished meetings", unfinished.len());
    for meeting in unfinished {
        check_for_zombie(ctx, meeting, &mut report).await;
    }

    match ctx.runtime.list_running(None).await {
        Ok(instances) => {
            for instance in instances {
                check_for_orphan(ctx, instance, &mut report).await;
            }
        }
        Err(err) => {
            warn!("Reconciliation: could not list running instances: {err}");
            report.errors += 1;
        }
    }

    Ok(report)
}

async fn check_for_zombie(ctx: &LifecycleContext, meeting: Model, report: &mut SweepReport) {
    let Some(handle) = meeting.runtime_instance_id.clone() else {
        return;
    };
    let meeting_id = meeting.id;
    report.checked += 1;

    match ctx.runtime.is_running(&handle).await {
        Ok(true) => return,
        Ok(false) => {}
        Err(err) => {
            warn!("Reconciliation: liveness of {handle} (meeting {meeting_id}) unknown: {err}");
            report.skipped += 1;
            return;
        }
    }

    // Named instances may not have reached the registry yet; if the owner has anything
    // running, wait for the next sweep before declaring a zombie.
    if is_named_handle(&handle) {
        match ctx.runtime.list_running(Some(&meeting.user_id)).await {
            Ok(instances) if !instances.is_empty() => {
                info!(
                    "Reconciliation: {handle} not found but user {} has {} running; skipping meeting {meeting_id}",
                    meeting.user_id,
                    instances.len()
                );
                report.skipped += 1;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("Reconciliation: could not list instances of user {}: {err}", meeting.user_id);
                report.skipped += 1;
                return;
            }
        }
    }

    let request = TransitionRequest::completed(CompletionReason::Stopped)
        .source(TransitionSource::Reconciliation)
        .reason("reconciliation_zombie_meeting")
        .metadata("detected_by", "reconciliation_task")
        .metadata("original_status", meeting.status.as_str())
        .metadata("container_id", handle.as_str());

    match apply_transition(ctx.db(), meeting_id, request).await {
        Ok(TransitionOutcome::Applied { meeting, from }) => {
            warn!("Reconciliation: finalized zombie meeting {meeting_id} (was '{from}', instance {handle})");
            report.zombies_finalized += 1;
            ctx.publish_status(&meeting).await;
            ctx.schedule_post_lifecycle(meeting_id);
        }
        Ok(_) => debug!("Reconciliation: meeting {meeting_id} finished during the sweep"),
        Err(err) => {
            error!("Reconciliation: could not finalize meeting {meeting_id}: {err}");
            report.errors += 1;
        }
    }
}

async fn check_for_orphan(
    ctx: &LifecycleContext,
    instance: RunningInstance,
    report: &mut SweepReport,
) {
    let handle = instance.handle.as_str();

    let meeting_id = match instance.meeting_id().map(str::parse::<Id>) {
        Some(Ok(meeting_id)) => meeting_id,
        _ => {
            warn!("Reconciliation: instance {handle} carries no valid meeting id");
            stop_orphan(ctx, handle, report).await;
            return;
        }
    };

    match meeting::find_by_id(ctx.db(), meeting_id).await {
        Ok(meeting) if meeting.is_terminal() => {
            warn!(
                "Reconciliation: instance {handle} still running for '{}' meeting {meeting_id}",
                meeting.status
            );
            stop_orphan(ctx, handle, report).await;
        }
        Ok(_) => {}
        Err(err) => {
            let err = Error::from(err);
            if err.is_not_found() {
                warn!("Reconciliation: instance {handle} belongs to unknown meeting {meeting_id}");
                stop_orphan(ctx, handle, report).await;
            } else {
                error!("Reconciliation: could not load meeting {meeting_id}: {err}");
                report.errors += 1;
            }
        }
    }
}

async fn stop_orphan(ctx: &LifecycleContext, handle: &str, report: &mut SweepReport) {
    match ctx.runtime.stop(handle).await {
        Ok(()) => report.orphans_stopped += 1,
        Err(err) => {
            error!("Reconciliation: could not stop orphan instance {handle}: {err}");
            report.errors += 1;
        }
    }
}

/// Container names and job names, as opposed to numeric ids such as PIDs.
fn is_named_handle(handle: &str) -> bool {
    !handle.is_empty() && !handle.chars().all(|c| c.is_ascii_digit())
}

/// Starts the reconciliation loop. It sweeps immediately, then every
/// `reconcile_interval`, backing off for `reconcile_backoff` after a failed sweep,
/// until `shutdown` is cancelled.
pub fn start(ctx: LifecycleContext, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(ctx, shutdown))
}

async fn run(ctx: LifecycleContext, shutdown: CancellationToken) {
    let interval = ctx.settings.reconcile_interval;
    let backoff = ctx.settings.reconcile_backoff;
    info!("Reconciliation loop started, sweeping every {interval:?}");

    loop {
        let sweep_ctx = ctx.clone();
        // A panicking sweep must not take the loop down with it.
        let delay = match tokio::spawn(async move { run_sweep(&sweep_ctx).await }).await {
            Ok(Ok(report)) => {
                info!(
                    "Reconciliation sweep: checked {}, zombies {}, skipped {}, orphans {}, errors {}",
                    report.checked,
                    report.zombies_finalized,
                    report.skipped,
                    report.orphans_stopped,
                    report.errors
                );
                interval
            }
            Ok(Err(err)) => {
                error!("Reconciliation sweep failed: {err}; retrying in {backoff:?}");
                backoff
            }
            Err(err) => {
                error!("Reconciliation sweep aborted: {err}; retrying in {backoff:?}");
                backoff
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Reconciliation loop stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
