//! CRUD operations for the meetings table.
//!
//! Status changes should go through the domain transition engine; the writers here
//! only persist what they are handed.

use super::error::{EntityApiErrorKind, Error};
use entity::meeting_data::MeetingData;
use entity::meetings::{ActiveModel, Column, Entity, Model};
use entity::{Id, MeetingStatus};
use log::*;
use sea_orm::{
    entity::prelude::*,
    ActiveValue::{Set, Unchanged},
    ConnectionTrait, DatabaseBackend, PaginatorTrait, QueryOrder, QuerySelect,
};

/// Fields supplied by the caller when a bot is requested.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMeeting {
    pub user_id: String,
    pub platform: String,
    pub native_meeting_id: String,
    pub data: MeetingData,
}

/// Inserts a meeting in REQUESTED status.
pub async fn create(db: &impl ConnectionTrait, new_meeting: NewMeeting) -> Result<Model, Error> {
    debug!(
        "Creating meeting for user {} on {}/{}",
        new_meeting.user_id, new_meeting.platform, new_meeting.native_meeting_id
    );

    let now = chrono::Utc::now();

    let active_model = ActiveModel {
        id: Set(Id::new_v4()),
        user_id: Set(new_meeting.user_id),
        platform: Set(new_meeting.platform),
        native_meeting_id: Set(new_meeting.native_meeting_id),
        status: Set(MeetingStatus::Requested.to_string()),
        runtime_instance_id: Set(None),
        data: Set(new_meeting.data),
        start_time: Set(None),
        end_time: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?)
}

pub async fn find_by_id(db: &impl ConnectionTrait, id: Id) -> Result<Model, Error> {
    Entity::find_by_id(id).one(db).await?.ok_or_else(|| Error {
        source: None,
        error_kind: EntityApiErrorKind::RecordNotFound,
    })
}

/// Loads a meeting and takes a row lock on it for the rest of the enclosing transaction.
///
/// SQLite has no `FOR UPDATE`; it serializes writers at the database level instead, so
/// the lock clause is only added for backends that understand it.
pub async fn find_by_id_for_update(db: &impl ConnectionTrait, id: Id) -> Result<Model, Error> {
    let mut query = Entity::find_by_id(id);

    if db.get_database_backend() != DatabaseBackend::Sqlite {
        query = query.lock_exclusive();
    }

    query.one(db).await?.ok_or_else(|| Error {
        source: None,
        error_kind: EntityApiErrorKind::RecordNotFound,
    })
}

/// All meetings for the natural key, newest first.
pub async fn find_by_natural_key(
    db: &impl ConnectionTrait,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Platform.eq(platform))
        .filter(Column::NativeMeetingId.eq(native_meeting_id))
        .order_by_desc(Column::CreatedAt)
        .all(db)
        .await?)
}

/// The most recently created meeting for the natural key, optionally restricted to a status.
pub async fn find_latest_by_natural_key(
    db: &impl ConnectionTrait,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
    status: Option<MeetingStatus>,
) -> Result<Option<Model>, Error> {
    let mut query = Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Platform.eq(platform))
        .filter(Column::NativeMeetingId.eq(native_meeting_id));

    if let Some(status) = status {
        query = query.filter(Column::Status.eq(status.as_str()));
    }

    Ok(query.order_by_desc(Column::CreatedAt).one(db).await?)
}

/// Meetings whose stored status is one of `statuses`.
pub async fn find_by_statuses(
    db: &impl ConnectionTrait,
    statuses: &[MeetingStatus],
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::Status.is_in(statuses.iter().map(|s| s.as_str())))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn find_non_terminal(db: &impl ConnectionTrait) -> Result<Vec<Model>, Error> {
    find_by_statuses(db, &MeetingStatus::NON_TERMINAL).await
}

/// Number of meetings holding a bot slot for `user_id`. STOPPING meetings are on their
/// way out and do not count.
pub async fn count_active_for_user(db: &impl ConnectionTrait, user_id: &str) -> Result<u64, Error> {
    let counted = [
        MeetingStatus::Requested,
        MeetingStatus::Joining,
        MeetingStatus::AwaitingAdmission,
        MeetingStatus::Active,
    ];

    Ok(Entity::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Status.is_in(counted.iter().map(|s| s.as_str())))
        .count(db)
        .await?)
}

/// Persists the mutable columns of `model` and bumps `updated_at`.
pub async fn update(db: &impl ConnectionTrait, model: Model) -> Result<Model, Error> {
    debug!("Updating meeting {} (status {})", model.id, model.status);

    let active_model = ActiveModel {
        id: Unchanged(model.id),
        user_id: Unchanged(model.user_id),
        platform: Unchanged(model.platform),
        native_meeting_id: Unchanged(model.native_meeting_id),
        status: Set(model.status),
        runtime_instance_id: Set(model.runtime_instance_id),
        data: Set(model.data),
        start_time: Set(model.start_time),
        end_time: Set(model.end_time),
        created_at: Unchanged(model.created_at),
        updated_at: Set(chrono::Utc::now().into()),
    };

    Ok(active_model.update(db).await?)
}

/// Records the handle of the runtime instance serving this meeting, whatever its status.
///
/// Takes the row lock, so call it inside a transaction to keep concurrent transitions out
/// until commit.
pub async fn set_runtime_instance_id(
    db: &impl ConnectionTrait,
    id: Id,
    runtime_instance_id: &str,
) -> Result<Model, Error> {
    let existing = find_by_id_for_update(db, id).await?;
    debug!(
        "Setting runtime instance {runtime_instance_id} on meeting {id} ('{}')",
        existing.status
    );

    let active_model = ActiveModel {
        id: Unchanged(existing.id),
        runtime_instance_id: Set(Some(runtime_instance_id.to_string())),
        updated_at: Set(chrono::Utc::now().into()),
        ..Default::default()
    };

    Ok(active_model.update(db).await?)
}
