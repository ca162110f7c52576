//! Staffing actions on operator applications.
//!
//! Every action is a single-row write. Accept and reject only apply to rows
//! that are still pending, so two concurrent accepts of the same application
//! produce one success and one `NotPending`.
use crate::db::{self, Pool};
use crate::model::{ApplicationStatus, SessionApplication, SessionStatus};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StaffingError {
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("operator {operator_id} has no application for session {session_id}")]
    NotFound { session_id: i64, operator_id: i64 },
    #[error("application is no longer pending (currently {0})")]
    NotPending(ApplicationStatus),
    #[error("session {0} is not open on the marketplace")]
    NotMarketplace(i64),
    #[error("session {0} is {1} and cannot be staffed")]
    SessionClosed(i64, SessionStatus),
    #[error("operator {operator_id} already applied to session {session_id}")]
    AlreadyApplied { session_id: i64, operator_id: i64 },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of one staffing action, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffingOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StaffingOutcome {
    fn from_result<T>(action: &str, result: Result<T, StaffingError>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                message: None,
            },
            Err(err) => {
                warn!(action, error = %err, "staffing action failed");
                Self {
                    success: false,
                    message: Some(err.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaffingHandler {
    pool: Pool,
}

impl StaffingHandler {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Explains why a conditional update touched no row.
    async fn missed_update(&self, session_id: i64, operator_id: i64) -> StaffingError {
        match db::get_application(&self.pool, session_id, operator_id).await {
            // Still pending, so the session guard is what stopped it.
            Ok(Some(app)) if app.status == ApplicationStatus::Pending => {
                match db::get_session(&self.pool, session_id).await {
                    Ok(Some(session)) => StaffingError::SessionClosed(session_id, session.status),
                    Ok(None) => StaffingError::SessionNotFound(session_id),
                    Err(err) => StaffingError::Store(err),
                }
            }
            Ok(Some(app)) => StaffingError::NotPending(app.status),
            Ok(None) => StaffingError::NotFound {
                session_id,
                operator_id,
            },
            Err(err) => StaffingError::Store(err),
        }
    }

    #[instrument(skip(self))]
    pub async fn try_accept(&self, session_id: i64, operator_id: i64) -> Result<(), StaffingError> {
        if db::accept_application(&self.pool, session_id, operator_id).await? {
            info!(session_id, operator_id, "application accepted");
            Ok(())
        } else {
            Err(self.missed_update(session_id, operator_id).await)
        }
    }

    #[instrument(skip(self))]
    pub async fn try_reject(&self, session_id: i64, operator_id: i64) -> Result<(), StaffingError> {
        if db::reject_application(&self.pool, session_id, operator_id).await? {
            info!(session_id, operator_id, "application rejected");
            Ok(())
        } else {
            Err(self.missed_update(session_id, operator_id).await)
        }
    }

    pub async fn accept(&self, session_id: i64, operator_id: i64) -> StaffingOutcome {
        StaffingOutcome::from_result("accept", self.try_accept(session_id, operator_id).await)
    }

    pub async fn reject(&self, session_id: i64, operator_id: i64) -> StaffingOutcome {
        StaffingOutcome::from_result("reject", self.try_reject(session_id, operator_id).await)
    }

    async fn insert_pending(
        &self,
        session_id: i64,
        operator_id: i64,
        require_marketplace: bool,
    ) -> Result<SessionApplication, StaffingError> {
        let session = db::get_session(&self.pool, session_id)
            .await?
            .ok_or(StaffingError::SessionNotFound(session_id))?;
        if !session.status.is_open() {
            return Err(StaffingError::SessionClosed(session_id, session.status));
        }
        if require_marketplace && !session.marketplace_visible {
            return Err(StaffingError::NotMarketplace(session_id));
        }
        let app = db::insert_application(&self.pool, session_id, operator_id)
            .await?
            .ok_or(StaffingError::AlreadyApplied {
                session_id,
                operator_id,
            })?;
        info!(session_id, operator_id, "application created");
        Ok(app)
    }

    /// Operator self-applies to a marketplace-visible session.
    #[instrument(skip(self))]
    pub async fn try_apply(
        &self,
        session_id: i64,
        operator_id: i64,
    ) -> Result<SessionApplication, StaffingError> {
        self.insert_pending(session_id, operator_id, true).await
    }

    /// Staff proposes an operator for any open session, marketplace or not.
    #[instrument(skip(self))]
    pub async fn try_propose(
        &self,
        session_id: i64,
        operator_id: i64,
    ) -> Result<SessionApplication, StaffingError> {
        self.insert_pending(session_id, operator_id, false).await
    }

    pub async fn apply(&self, session_id: i64, operator_id: i64) -> StaffingOutcome {
        StaffingOutcome::from_result("apply", self.try_apply(session_id, operator_id).await)
    }

    pub async fn propose(&self, session_id: i64, operator_id: i64) -> StaffingOutcome {
        StaffingOutcome::from_result("propose", self.try_propose(session_id, operator_id).await)
    }

    #[instrument(skip(self))]
    pub async fn try_withdraw(&self, session_id: i64, operator_id: i64) -> Result<(), StaffingError> {
        if db::withdraw_application(&self.pool, session_id, operator_id).await? {
            info!(session_id, operator_id, "application withdrawn");
            Ok(())
        } else {
            Err(self.missed_update(session_id, operator_id).await)
        }
    }

    pub async fn withdraw(&self, session_id: i64, operator_id: i64) -> StaffingOutcome {
        StaffingOutcome::from_result("withdraw", self.try_withdraw(session_id, operator_id).await)
    }

    pub async fn pending_for(&self, session_id: i64) -> Result<Vec<SessionApplication>, StaffingError> {
        Ok(db::list_applications(&self.pool, session_id, Some(ApplicationStatus::Pending)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::model::{EmploymentType, NewOperator, NewSession};
    use chrono::NaiveDate;

    async fn seed(pool: &Pool, marketplace_visible: bool) -> (i64, i64) {
        let session = db::create_session(
            pool,
            &NewSession {
                date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                start_time: None,
                end_time: None,
                region: "north".into(),
                client_id: None,
                title: None,
                status: SessionStatus::PendingConfirmation,
                min_operators: 2,
                marketplace_visible,
                notes: None,
            },
        )
        .await
        .unwrap();
        let operator = db::create_operator(
            pool,
            &NewOperator {
                first_name: "Jo".into(),
                last_name: "Reyes".into(),
                email: None,
                phone: None,
                employment_type: EmploymentType::Freelance,
            },
        )
        .await
        .unwrap();
        (session.id, operator.id)
    }

    #[tokio::test]
    async fn accept_twice_reports_not_pending() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, true).await;
        let handler = StaffingHandler::new(pool);
        assert!(handler.apply(sid, oid).await.success);

        assert_eq!(
            handler.accept(sid, oid).await,
            StaffingOutcome { success: true, message: None }
        );
        let second = handler.accept(sid, oid).await;
        assert!(!second.success);
        assert!(second.message.unwrap().contains("no longer pending"));
        assert!(matches!(
            handler.try_reject(sid, oid).await,
            Err(StaffingError::NotPending(ApplicationStatus::Accepted))
        ));
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, true).await;
        let handler = StaffingHandler::new(pool);
        assert!(matches!(
            handler.try_accept(sid, oid).await,
            Err(StaffingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn marketplace_gate_applies_to_self_service_only() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, false).await;
        let handler = StaffingHandler::new(pool);
        assert!(matches!(
            handler.try_apply(sid, oid).await,
            Err(StaffingError::NotMarketplace(_))
        ));
        assert!(handler.try_propose(sid, oid).await.is_ok());
        assert!(matches!(
            handler.try_propose(sid, oid).await,
            Err(StaffingError::AlreadyApplied { .. })
        ));
    }

    #[tokio::test]
    async fn closed_sessions_cannot_be_staffed() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, true).await;
        db::update_session_status(&pool, sid, SessionStatus::Cancelled).await.unwrap();
        let handler = StaffingHandler::new(pool);
        assert!(matches!(
            handler.try_apply(sid, oid).await,
            Err(StaffingError::SessionClosed(_, SessionStatus::Cancelled))
        ));
        assert!(matches!(
            handler.try_apply(sid + 100, oid).await,
            Err(StaffingError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn accept_requires_open_session() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, true).await;
        let handler = StaffingHandler::new(pool.clone());
        handler.try_apply(sid, oid).await.unwrap();
        db::update_session_status(&pool, sid, SessionStatus::Completed).await.unwrap();

        assert!(matches!(
            handler.try_accept(sid, oid).await,
            Err(StaffingError::SessionClosed(_, SessionStatus::Completed))
        ));
        let session = db::get_session(&pool, sid).await.unwrap().unwrap();
        assert_eq!(session.pending_operators, 1);
        assert_eq!(session.accepted_operators, 0);

        // Rejecting a leftover application is still allowed.
        assert!(handler.reject(sid, oid).await.success);
    }

    #[tokio::test]
    async fn withdraw_only_while_pending() {
        let pool = memory_pool().await.unwrap();
        let (sid, oid) = seed(&pool, true).await;
        let handler = StaffingHandler::new(pool.clone());
        handler.try_apply(sid, oid).await.unwrap();
        assert!(handler.withdraw(sid, oid).await.success);
        assert!(handler.pending_for(sid).await.unwrap().is_empty());

        handler.try_apply(sid, oid).await.unwrap();
        handler.try_reject(sid, oid).await.unwrap();
        assert!(!handler.withdraw(sid, oid).await.success);
        let session = db::get_session(&pool, sid).await.unwrap().unwrap();
        assert_eq!(session.pending_operators, 0);
        assert_eq!(session.accepted_operators, 0);
    }
}
