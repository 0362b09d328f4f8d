//! SeaORM Entity for the meetings table.
//! One row per bot-join attempt; rows are never deleted.

use crate::meeting_data::MeetingData;
use crate::meeting_status::MeetingStatus;
use crate::Id;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = entity::meetings::Model)]
#[sea_orm(table_name = "meetings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[schema(value_type = Uuid)]
    pub id: Id,

    /// Owner of the bot; every lookup is scoped by this
    pub user_id: String,

    /// Meeting platform, e.g. `google_meet`, `zoom`, `teams`
    pub platform: String,

    /// The platform's own identifier for the meeting
    pub native_meeting_id: String,

    /// Raw stored status. Use [`Model::status`] to read it.
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub status: String,

    /// Container ID, job name or PID of the running bot
    pub runtime_instance_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    #[schema(value_type = Object)]
    pub data: MeetingData,

    /// Set on the first transition into ACTIVE
    #[schema(value_type = Option<String>, format = DateTime)]
    pub start_time: Option<DateTimeWithTimeZone>,

    /// Set on the transition into COMPLETED or FAILED
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<DateTimeWithTimeZone>,

    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,

    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parsed status. Unknown legacy values read as `Failed`.
    pub fn status(&self) -> MeetingStatus {
        MeetingStatus::parse_or_failed(&self.status).0
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn stop_requested(&self) -> bool {
        self.data.stop_requested
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::meeting_sessions::Entity")]
    MeetingSessions,
}

impl Related<super::meeting_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MeetingSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
