use config::Config;
use log::info;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::sync::Arc;
use tokio::time::Duration;

pub mod config;
pub mod logging;

/// PostgreSQL schema holding the bot manager's tables.
pub const DB_SCHEMA: &str = "bot_manager";

/// Pool settings for the meeting store. Every pooled connection searches [`DB_SCHEMA`].
pub fn connect_options(config: &Config) -> ConnectOptions {
    let mut opt = ConnectOptions::new::<&str>(config.database_url());
    opt.max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .connect_timeout(Duration::from_secs(config.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime_secs))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug)
        .set_schema_search_path(DB_SCHEMA);
    opt
}

pub async fn init_database(config: &Config) -> Result<DatabaseConnection, DbErr> {
    info!(
        "Connecting to the meeting store: {}..{} pooled connections, \
         {}s connect / {}s acquire timeout, schema '{DB_SCHEMA}'",
        config.db_min_connections,
        config.db_max_connections,
        config.db_connect_timeout_secs,
        config.db_acquire_timeout_secs,
    );

    Database::connect(connect_options(config)).await
}

/// Configuration and store handle, cloned into every request handler and background task.
#[derive(Clone)]
pub struct AppState {
    pub database_connection: Arc<DatabaseConnection>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, db: &Arc<DatabaseConnection>) -> Self {
        Self {
            database_connection: Arc::clone(db),
            config: app_config,
        }
    }

    pub fn db_conn_ref(&self) -> &DatabaseConnection {
        self.database_connection.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn pool_options_follow_the_config() {
        let config = Config::try_parse_from([
            "bot_manager",
            "--database-url",
            "postgres://bots:secret@db:5432/bots",
            "--db-max-connections",
            "12",
            "--db-min-connections",
            "2",
            "--db-connect-timeout-secs",
            "4",
            "--db-acquire-timeout-secs",
            "3",
        ])
        .unwrap();

        let opt = connect_options(&config);

        assert_eq!(opt.get_url(), "postgres://bots:secret@db:5432/bots");
        assert_eq!(opt.get_max_connections(), Some(12));
        assert_eq!(opt.get_min_connections(), Some(2));
        assert_eq!(opt.get_connect_timeout(), Some(Duration::from_secs(4)));
        assert_eq!(opt.get_acquire_timeout(), Some(Duration::from_secs(3)));
    }
}
