//! Planning reads: filtered session lists reshaped for display.
//!
//! [`PlanningService::fetch_sessions`] never fails; callers get a success
//! flag, the rows (empty on failure) and the error text.
use crate::db::{self, model::SessionWithClient, Pool};
pub use crate::db::SessionFilter;
use crate::model::SessionStatus;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{instrument, warn};

/// Session as shown on the planning board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningSession {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub region: String,
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub required_operators: i64,
    pub accepted_operators: i64,
    pub pending_operators: i64,
    pub open_slots: i64,
    pub fully_staffed: bool,
    pub marketplace_visible: bool,
}

impl From<SessionWithClient> for PlanningSession {
    fn from(row: SessionWithClient) -> Self {
        let client_name = row.client_name();
        let s = row.session;
        Self {
            id: s.id,
            date: s.date,
            start_time: s.start_time,
            end_time: s.end_time,
            region: s.region,
            client_id: s.client_id,
            client_name,
            title: s.title,
            status: s.status,
            required_operators: s.min_operators,
            accepted_operators: s.accepted_operators,
            pending_operators: s.pending_operators,
            open_slots: (s.min_operators - s.accepted_operators).max(0),
            fully_staffed: s.accepted_operators >= s.min_operators,
            marketplace_visible: s.marketplace_visible,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanningResponse {
    pub success: bool,
    pub data: Vec<PlanningSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PlanningResponse {
    fn from_result(result: Result<Vec<PlanningSession>>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data,
                message: None,
            },
            Err(err) => {
                warn!(?err, "planning read failed");
                Self {
                    success: false,
                    data: Vec::new(),
                    message: Some(format!("{:#}", err)),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanningService {
    pool: Pool,
}

impl PlanningService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn try_fetch_sessions(&self, filter: &SessionFilter) -> Result<Vec<PlanningSession>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                anyhow::bail!("date range starts after it ends ({} > {})", from, to);
            }
        }
        let rows = db::list_sessions(&self.pool, filter).await?;
        Ok(rows.into_iter().map(PlanningSession::from).collect())
    }

    pub async fn fetch_sessions(&self, filter: &SessionFilter) -> PlanningResponse {
        PlanningResponse::from_result(self.try_fetch_sessions(filter).await)
    }

    #[instrument(skip(self))]
    pub async fn try_marketplace_for(
        &self,
        operator_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<PlanningSession>> {
        let rows = db::list_marketplace_sessions(&self.pool, operator_id, today).await?;
        Ok(rows.into_iter().map(PlanningSession::from).collect())
    }

    /// Sessions `operator_id` can still apply to, from `today` on.
    pub async fn marketplace_for(&self, operator_id: i64, today: NaiveDate) -> PlanningResponse {
        PlanningResponse::from_result(self.try_marketplace_for(operator_id, today).await)
    }
}
