//! Run scheduler: fires pipeline runs once, on a fixed interval, or on cron
//! ticks, with a per-(keyword, locale) cap on runs in flight.
//!
//! A tick that finds the cap exhausted is dropped, not queued. Every run
//! executes in its own task and panics are caught there, so one failing run
//! never takes down the scheduler or another job.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::pipeline::{Pipeline, RunReport};
use crate::storage::{partition_key, Locale};

/// Executes one run for a (keyword, locale) pair.
pub type Runner = Arc<dyn Fn(String, Locale) -> BoxFuture<'static, RunReport> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    #[error("Interval must be greater than zero")]
    ZeroInterval,

    #[error("Run cap must be at least 1")]
    ZeroCap,
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Immediately, exactly once.
    Once,
    /// Every period, starting one period after the scheduler starts.
    Interval(Duration),
    /// Six-field, seconds-first cron expression (UTC).
    Cron(String),
}

/// What happened to one tick of a job.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed(RunReport),
    /// The job already had its maximum number of runs in flight.
    Skipped { keyword: String, locale: Locale },
    Panicked {
        keyword: String,
        locale: Locale,
        message: String,
    },
}

/// Shared state of one scheduled (keyword, locale) job.
struct JobContext {
    keyword: String,
    locale: Locale,
    gate: Arc<Semaphore>,
    runner: Runner,
    events: Option<mpsc::Sender<JobEvent>>,
}

impl JobContext {
    /// Start a run if the gate has a free permit.
    ///
    /// Returns the supervising task, or `None` when the tick was dropped.
    fn fire(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let permit = match self.gate.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    keyword = %self.keyword,
                    locale = %self.locale,
                    "Run cap reached, dropping tick"
                );
                self.emit_now(JobEvent::Skipped {
                    keyword: self.keyword.clone(),
                    locale: self.locale,
                });
                return None;
            }
        };

        let ctx = Arc::clone(self);
        Some(tokio::spawn(async move {
            let runner = Arc::clone(&ctx.runner);
            let keyword = ctx.keyword.clone();
            let locale = ctx.locale;
            let outcome = catch_run_panic(async move { runner(keyword, locale).await }).await;
            drop(permit);

            let event = match outcome {
                Ok(report) => JobEvent::Completed(report),
                Err(message) => {
                    tracing::error!(
                        keyword = %ctx.keyword,
                        locale = %ctx.locale,
                        error = %message,
                        "Run panicked"
                    );
                    JobEvent::Panicked {
                        keyword: ctx.keyword.clone(),
                        locale: ctx.locale,
                        message,
                    }
                }
            };
            if let Some(tx) = &ctx.events {
                if let Err(e) = tx.send(event).await {
                    tracing::debug!(error = %e, "Job event receiver dropped");
                }
            }
        }))
    }

    fn emit_now(&self, event: JobEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(error = %e, "Job event not delivered");
            }
        }
    }
}

/// Wraps a run future, converting a panic into its message.
async fn catch_run_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}

pub struct RunScheduler {
    inner: JobScheduler,
    runner: Runner,
    max_concurrent_runs: usize,
    gates: Mutex<HashMap<(String, Locale), Arc<Semaphore>>>,
    events: Option<mpsc::Sender<JobEvent>>,
}

impl RunScheduler {
    pub async fn new(runner: Runner, max_concurrent_runs: usize) -> Result<Self, SchedulerError> {
        if max_concurrent_runs == 0 {
            return Err(SchedulerError::ZeroCap);
        }
        Ok(Self {
            inner: JobScheduler::new().await?,
            runner,
            max_concurrent_runs,
            gates: Mutex::new(HashMap::new()),
            events: None,
        })
    }

    /// Runner that executes `pipeline.run` for each tick.
    pub fn pipeline_runner(pipeline: Arc<Pipeline>) -> Runner {
        Arc::new(move |keyword: String, locale: Locale| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.run(&keyword, locale).await }.boxed()
        })
    }

    /// Report every tick's outcome on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Gate shared by every job of the same (keyword, locale). Keywords are
    /// matched by their collection key, so spellings differing only in case
    /// share one cap.
    async fn context(&self, keyword: &str, locale: Locale) -> Arc<JobContext> {
        let keyword = keyword.trim().to_string();
        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(
                gates
                    .entry((partition_key(&keyword), locale))
                    .or_insert_with(|| Arc::new(Semaphore::new(self.max_concurrent_runs))),
            )
        };
        Arc::new(JobContext {
            keyword,
            locale,
            gate,
            runner: Arc::clone(&self.runner),
            events: self.events.clone(),
        })
    }

    /// Register a job. It fires once [`RunScheduler::start`] has been called.
    pub async fn schedule(
        &self,
        keyword: &str,
        locale: Locale,
        trigger: Trigger,
    ) -> Result<Uuid, SchedulerError> {
        let ctx = self.context(keyword, locale).await;
        let tick = move |_uuid: Uuid, _sched: JobScheduler| {
            let ctx = Arc::clone(&ctx);
            Box::pin(async move {
                let _ = ctx.fire();
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        };

        let job = match &trigger {
            Trigger::Once => Job::new_one_shot_async(Duration::ZERO, tick)?,
            Trigger::Interval(period) => {
                if period.is_zero() {
                    return Err(SchedulerError::ZeroInterval);
                }
                Job::new_repeated_async(*period, tick)?
            }
            Trigger::Cron(expr) => Job::new_async(expr.as_str(), tick)?,
        };

        let id = self.inner.add(job).await?;
        tracing::info!(keyword = %keyword, locale = %locale, trigger = ?trigger, job = %id, "Scheduled job");
        Ok(id)
    }

    /// Fire a job's tick right now, outside any trigger.
    ///
    /// Subject to the same cap as scheduled ticks. Returns the run's
    /// supervising task, or `None` if the tick was dropped.
    pub async fn trigger(&self, keyword: &str, locale: Locale) -> Option<JoinHandle<()>> {
        self.context(keyword, locale).await.fire()
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.inner.start().await?;
        Ok(())
    }

    /// Stop firing new ticks. Runs already in flight finish on their own.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
