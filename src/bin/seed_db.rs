//! Fills a development database with a handful of meetings in different lifecycle stages.

use domain::meeting_data::MeetingData;
use domain::transition::{apply_transition, TransitionRequest, TransitionSource};
use domain::{CompletionReason, FailureStage, MeetingStatus};
use entity_api::meeting::{self, NewMeeting};
use log::{error, info};
use sea_orm::DatabaseConnection;
use service::{config::Config, logging::Logger};
use std::process;

const DEMO_USER: &str = "demo-user";

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    info!("Seeding database [{}]...", config.database_url());

    let db = match service::init_database(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = seed_meetings(&db).await {
        error!("Failed to seed meetings: {e}");
        process::exit(1);
    }

    info!("Seeding complete");
}

async fn seed_meetings(db: &DatabaseConnection) -> Result<(), domain::error::Error> {
    // A finished recording.
    let completed = create(db, "google_meet", "abc-defg-hij").await?;
    walk(
        db,
        completed.id,
        vec![
            TransitionRequest::new(MeetingStatus::Joining),
            TransitionRequest::new(MeetingStatus::AwaitingAdmission),
            TransitionRequest::new(MeetingStatus::Active),
            TransitionRequest::completed(CompletionReason::Stopped).reason("seeded"),
        ],
    )
    .await?;

    // A bot nobody let in.
    let rejected = create(db, "zoom", "1234567890").await?;
    walk(
        db,
        rejected.id,
        vec![
            TransitionRequest::new(MeetingStatus::Joining),
            TransitionRequest::new(MeetingStatus::AwaitingAdmission),
            TransitionRequest::completed(CompletionReason::AwaitingAdmissionTimeout),
        ],
    )
    .await?;

    // A bot that crashed while joining.
    let failed = create(db, "teams", "123456789012").await?;
    walk(
        db,
        failed.id,
        vec![
            TransitionRequest::new(MeetingStatus::Joining),
            TransitionRequest::failed(FailureStage::Joining)
                .error_details("Bot exited with code 1; reason: seeded"),
        ],
    )
    .await?;

    // Left in REQUESTED with no runtime instance; the stop endpoint finalizes it at once.
    let pending = create(db, "google_meet", "xyz-abcd-efg").await?;
    info!("Seeded pending meeting {}", pending.id);

    Ok(())
}

async fn create(
    db: &DatabaseConnection,
    platform: &str,
    native_meeting_id: &str,
) -> Result<entity_api::meetings::Model, domain::error::Error> {
    Ok(meeting::create(
        db,
        NewMeeting {
            user_id: DEMO_USER.to_string(),
            platform: platform.to_string(),
            native_meeting_id: native_meeting_id.to_string(),
            data: MeetingData::default(),
        },
    )
    .await?)
}

async fn walk(
    db: &DatabaseConnection,
    meeting_id: domain::Id,
    requests: Vec<TransitionRequest>,
) -> Result<(), domain::error::Error> {
    for request in requests {
        let outcome = apply_transition(db, meeting_id, request.source(TransitionSource::System)).await?;
        info!(
            "Seeded meeting {meeting_id} -> {}",
            outcome.meeting().status
        );
    }
    Ok(())
}
