//! Application context construction and retrying bring-up of optional services.
//!
//! [`AppContext::init`] is called once at startup and the context is passed
//! to whoever needs it. Optional services that may not be reachable yet are
//! retried on a fixed interval by [`spawn_init_retry`]; dropping the returned
//! [`RetryHandle`] stops the retry task.
use crate::config::Config;
use crate::contact::ContactClient;
use crate::db::{self, Pool};
use crate::planning::PlanningService;
use crate::staffing::StaffingHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a command needs, built once.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub pool: Pool,
    pub planning: PlanningService,
    pub staffing: StaffingHandler,
    pub contact: Option<Arc<ContactClient>>,
}

impl AppContext {
    pub async fn init(config: Config) -> Result<Self> {
        config.ensure_dirs().context("failed to create data directory")?;
        let pool = db::init_pool(&config.database_url()).await?;
        Self::with_pool(config, pool).await
    }

    /// Builds the context over an existing pool, running migrations first.
    pub async fn with_pool(config: Config, pool: Pool) -> Result<Self> {
        db::run_migrations(&pool).await?;
        let contact = config
            .contact
            .as_ref()
            .map(|c| ContactClient::from_config(c).map(Arc::new))
            .transpose()?;
        info!(contact = contact.is_some(), "application context ready");
        Ok(Self {
            planning: PlanningService::new(pool.clone()),
            staffing: StaffingHandler::new(pool.clone()),
            contact,
            pool,
            config,
        })
    }

    /// Starts the bring-up retry for every optional service in the context.
    pub fn spawn_optional_services(&self) -> Vec<RetryHandle> {
        let bootstrap = &self.config.bootstrap;
        self.contact
            .iter()
            .map(|contact| {
                spawn_init_retry(
                    contact.clone(),
                    bootstrap.retry_interval(),
                    bootstrap.max_attempts,
                )
            })
            .collect()
    }
}

/// A service that may need several attempts before it is usable.
#[async_trait]
pub trait InitService: Send + Sync {
    fn name(&self) -> &str;

    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Service came up after this many attempts (0 if it already was).
    Initialized { attempts: u32 },
    /// Gave up after `max_attempts`.
    Exhausted { attempts: u32 },
}

/// Owns the retry task; dropping it aborts the task.
#[derive(Debug)]
pub struct RetryHandle {
    task: Option<JoinHandle<RetryOutcome>>,
}

impl RetryHandle {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Waits for the task to end. `None` if it was cancelled.
    pub async fn wait(mut self) -> Option<RetryOutcome> {
        let task = self.task.take()?;
        task.await.ok()
    }
}

impl Drop for RetryHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Calls `service.initialize()` every `interval` until it reports
/// initialized, or until `max_attempts` when set. The interval is fixed.
pub fn spawn_init_retry(
    service: Arc<dyn InitService>,
    interval: Duration,
    max_attempts: Option<u32>,
) -> RetryHandle {
    let task = tokio::spawn(async move {
        let mut attempts = 0_u32;
        loop {
            if service.is_initialized() {
                info!(service = service.name(), attempts, "optional service initialized");
                return RetryOutcome::Initialized { attempts };
            }
            if max_attempts.is_some_and(|max| attempts >= max) {
                warn!(service = service.name(), attempts, "giving up on optional service");
                return RetryOutcome::Exhausted { attempts };
            }
            attempts += 1;
            match service.initialize().await {
                Ok(()) if service.is_initialized() => continue,
                Ok(()) => debug!(service = service.name(), attempts, "service not ready yet"),
                Err(err) => {
                    debug!(service = service.name(), attempts, error = %err, "initialization attempt failed")
                }
            }
            tokio::time::sleep(interval).await;
        }
    });
    RetryHandle { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Comes up on the `ready_after`-th call to `initialize`.
    struct Flaky {
        calls: AtomicU32,
        ready_after: u32,
        ready: AtomicBool,
    }

    impl Flaky {
        fn new(ready_after: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                ready_after,
                ready: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InitService for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn is_initialized(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn initialize(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(anyhow::anyhow!("not yet ({n})"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_once_initialized() {
        let service = Flaky::new(3);
        let handle = spawn_init_retry(service.clone(), Duration::from_millis(1500), None);
        let outcome = handle.wait().await;
        assert_eq!(outcome, Some(RetryOutcome::Initialized { attempts: 3 }));
        assert_eq!(service.calls(), 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn already_initialized_makes_no_attempt() {
        let service = Flaky::new(1);
        service.ready.store(true, Ordering::SeqCst);
        let handle = spawn_init_retry(service.clone(), Duration::from_millis(1500), None);
        assert_eq!(handle.wait().await, Some(RetryOutcome::Initialized { attempts: 0 }));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_retry_gives_up() {
        let service = Flaky::new(u32::MAX);
        let handle = spawn_init_retry(service.clone(), Duration::from_millis(1500), Some(4));
        assert_eq!(handle.wait().await, Some(RetryOutcome::Exhausted { attempts: 4 }));
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_the_timer() {
        let service = Flaky::new(u32::MAX);
        let handle = spawn_init_retry(service.clone(), Duration::from_millis(1500), None);

        tokio::time::sleep(Duration::from_millis(4600)).await;
        let seen = service.calls();
        assert!(seen >= 3, "expected several attempts, saw {seen}");
        assert!(!handle.is_finished());

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(service.calls(), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_handle_reports_nothing() {
        let service = Flaky::new(u32::MAX);
        let handle = spawn_init_retry(service.clone(), Duration::from_millis(1500), None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let before = service.calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.calls(), before);
    }
}
