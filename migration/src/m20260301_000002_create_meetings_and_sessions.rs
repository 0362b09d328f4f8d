use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // status is free text so that values written by older releases can still be
        // read and normalized by the transition engine.
        let create_meetings_sql = "CREATE TABLE IF NOT EXISTS bot_manager.meetings (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id TEXT NOT NULL,
            platform VARCHAR(64) NOT NULL,
            native_meeting_id VARCHAR(255) NOT NULL,
            status VARCHAR(32) NOT NULL DEFAULT 'requested',
            runtime_instance_id VARCHAR(255),
            data JSONB NOT NULL DEFAULT '{}'::jsonb,
            start_time TIMESTAMPTZ,
            end_time TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )";

        manager
            .get_connection()
            .execute_unprepared(create_meetings_sql)
            .await?;

        // Natural key lookups are always "newest first"
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS meetings_natural_key_idx
                ON bot_manager.meetings(user_id, platform, native_meeting_id, created_at DESC)",
            )
            .await?;

        // Reconciliation scans by status
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS meetings_status_idx ON bot_manager.meetings(status)",
            )
            .await?;

        let create_sessions_sql = "CREATE TABLE IF NOT EXISTS bot_manager.meeting_sessions (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            meeting_id UUID NOT NULL,
            session_uid VARCHAR(255) NOT NULL,
            session_start_time TIMESTAMPTZ NOT NULL DEFAULT now(),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT fk_meeting_sessions_meeting
                FOREIGN KEY (meeting_id)
                REFERENCES bot_manager.meetings(id)
                ON DELETE CASCADE
                ON UPDATE CASCADE
        )";

        manager
            .get_connection()
            .execute_unprepared(create_sessions_sql)
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS meeting_sessions_session_uid_unique
                ON bot_manager.meeting_sessions(session_uid)",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS meeting_sessions_meeting_id_idx
                ON bot_manager.meeting_sessions(meeting_id)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS bot_manager.meeting_sessions")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS bot_manager.meetings")
            .await?;

        Ok(())
    }
}
