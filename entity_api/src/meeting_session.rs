//! Lookup table from a bot's connection id to its meeting.

use super::error::Error;
use entity::meeting_sessions::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{entity::prelude::*, ActiveValue::Set, ConnectionTrait, QueryOrder};

pub async fn create(
    db: &impl ConnectionTrait,
    meeting_id: Id,
    session_uid: &str,
) -> Result<Model, Error> {
    debug!("Registering session {session_uid} for meeting {meeting_id}");

    let now = chrono::Utc::now();

    let active_model = ActiveModel {
        id: Set(Id::new_v4()),
        meeting_id: Set(meeting_id),
        session_uid: Set(session_uid.to_string()),
        session_start_time: Set(now.into()),
        created_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?)
}

pub async fn find_by_session_uid(
    db: &impl ConnectionTrait,
    session_uid: &str,
) -> Result<Option<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::SessionUid.eq(session_uid))
        .one(db)
        .await?)
}

pub async fn find_by_meeting_id(
    db: &impl ConnectionTrait,
    meeting_id: Id,
) -> Result<Vec<Model>, Error> {
    Ok(Entity::find()
        .filter(Column::MeetingId.eq(meeting_id))
        .order_by_asc(Column::SessionStartTime)
        .all(db)
        .await?)
}

#[cfg(test)]
// We need to gate seaORM's mock feature behind conditional compilation because
// the feature removes the Clone trait implementation from seaORM's DatabaseConnection.
// see https://github.com/SeaQL/sea-orm/issues/830
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, Transaction};

    #[tokio::test]
    async fn find_by_session_uid_filters_on_the_connection_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let _ = find_by_session_uid(&db, "session-123").await;

        assert_eq!(
            db.into_transaction_log(),
            [Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"SELECT "meeting_sessions"."id", "meeting_sessions"."meeting_id", "meeting_sessions"."session_uid", "meeting_sessions"."session_start_time", "meeting_sessions"."created_at" FROM "meeting_sessions" WHERE "meeting_sessions"."session_uid" = $1 LIMIT $2"#,
                [
                    "session-123".into(),
                    sea_orm::Value::BigUnsigned(Some(1))
                ]
            )]
        );
    }

    #[tokio::test]
    async fn create_returns_the_new_session() -> Result<(), Error> {
        let now = chrono::Utc::now();
        let session_model = Model {
            id: Id::new_v4(),
            meeting_id: Id::new_v4(),
            session_uid: "session-123".to_string(),
            session_start_time: now.into(),
            created_at: now.into(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![session_model.clone()]])
            .into_connection();

        let session = create(&db, session_model.meeting_id, "session-123").await?;

        assert_eq!(session.meeting_id, session_model.meeting_id);
        assert_eq!(session.session_uid, "session-123");

        Ok(())
    }
}
