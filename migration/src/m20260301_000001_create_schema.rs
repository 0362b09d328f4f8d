use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("CREATE SCHEMA IF NOT EXISTS bot_manager;")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("SET search_path TO bot_manager, public;")
            .await?;

        // The service connects as bot_manager; migrations may run as a superuser.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DO $$ BEGIN
                    IF EXISTS (SELECT FROM pg_roles WHERE rolname = 'bot_manager') THEN
                        GRANT ALL ON SCHEMA bot_manager TO bot_manager;
                        ALTER DEFAULT PRIVILEGES IN SCHEMA bot_manager GRANT ALL ON TABLES TO bot_manager;
                        ALTER DEFAULT PRIVILEGES IN SCHEMA bot_manager GRANT ALL ON SEQUENCES TO bot_manager;
                    END IF;
                END $$;
            "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP SCHEMA IF EXISTS bot_manager CASCADE;")
            .await?;

        Ok(())
    }
}
