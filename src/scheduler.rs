use anyhow::{anyhow, Result};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use std::{fmt, sync::Arc, time::Duration, time::Instant};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::metrics;

pub type TaskAction = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSchedule {
    Every(Duration),
    Cron(String),
}

impl fmt::Display for TaskSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSchedule::Every(interval) => write!(f, "every {}s", interval.as_secs()),
            TaskSchedule::Cron(expr) => write!(f, "cron '{}'", expr),
        }
    }
}

#[derive(Clone)]
pub struct CronTask {
    pub name: String,
    pub schedule: TaskSchedule,
    pub action: TaskAction,
}

impl CronTask {
    pub fn new<F>(name: &str, schedule: TaskSchedule, action: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            schedule,
            action: Arc::new(action),
        }
    }

    /// Runs the action once, recording outcome and duration. Errors are
    /// logged here and never reach the scheduler.
    pub async fn run_once(&self) -> bool {
        let started = Instant::now();
        let result = (self.action)().await;
        metrics::TASK_DURATION
            .with_label_values(&[self.name.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                metrics::TASK_RUNS
                    .with_label_values(&[self.name.as_str(), "success"])
                    .inc();
                true
            }
            Err(e) => {
                metrics::TASK_RUNS
                    .with_label_values(&[self.name.as_str(), "error"])
                    .inc();
                error!(task = %self.name, error = %format!("{:#}", e), "Task failed");
                false
            }
        }
    }
}

impl fmt::Debug for CronTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronTask")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .finish()
    }
}

/// tokio-cron-scheduler wants a leading seconds field; classic five-field
/// expressions fire at second zero.
pub fn normalize_cron(expr: &str) -> Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(anyhow!(
            "Invalid cron expression '{}': expected 5 to 7 fields, got {}",
            expr,
            n
        )),
    }
}

/// Cron expressions are evaluated in `timezone`; intervals ignore it.
fn build_job(task: CronTask, timezone: Tz) -> Result<Job> {
    let job = match task.schedule.clone() {
        TaskSchedule::Every(interval) => Job::new_repeated_async(interval, move |_id, _scheduler| {
            let task = task.clone();
            Box::pin(async move {
                task.run_once().await;
            })
        }),
        TaskSchedule::Cron(expr) => {
            let expr = normalize_cron(&expr)?;
            Job::new_async_tz(expr.as_str(), timezone, move |_id, _scheduler| {
                let task = task.clone();
                Box::pin(async move {
                    task.run_once().await;
                })
            })
        }
    };

    job.map_err(|e| anyhow!("Failed to build job: {}", e))
}

pub struct TaskScheduler {
    scheduler: JobScheduler,
    timezone: Tz,
}

impl TaskScheduler {
    pub async fn new(timezone: Tz) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create scheduler: {}", e))?;
        Ok(Self { scheduler, timezone })
    }

    pub async fn register(&self, task: CronTask) -> Result<()> {
        let name = task.name.clone();
        let schedule = task.schedule.clone();
        let job = build_job(task, self.timezone).map_err(|e| anyhow!("Task {}: {}", name, e))?;
        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to register task {}: {}", name, e))?;
        info!(task = %name, schedule = %schedule, timezone = %self.timezone, "Task scheduled");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow!("Failed to stop scheduler: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("1 0 * * *").unwrap(), "0 1 0 * * *");
        assert_eq!(normalize_cron("*/15  *  * * *").unwrap(), "0 */15 * * * *");
        assert_eq!(normalize_cron("30 0 * * * *").unwrap(), "30 0 * * * *");
        assert!(normalize_cron("* *").is_err());
    }

    #[test]
    fn test_invalid_cron_is_rejected() {
        let task = CronTask::new(
            "broken",
            TaskSchedule::Cron("* * *".to_string()),
            || async { Ok(()) }.boxed(),
        );
        assert!(build_job(task, Tz::UTC).is_err());
    }

    #[test]
    fn test_cron_jobs_accept_local_timezone() {
        let task = CronTask::new(
            "missions",
            TaskSchedule::Cron("1 0 * * *".to_string()),
            || async { Ok(()) }.boxed(),
        );
        assert!(build_job(task, chrono_tz::America::Argentina::Buenos_Aires).is_ok());
    }

    #[tokio::test]
    async fn test_failed_run_is_contained() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = CronTask::new(
            "flaky",
            TaskSchedule::Every(Duration::from_secs(60)),
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(anyhow!("rpc timeout"))
                    } else {
                        Ok(())
                    }
                }
                .boxed()
            },
        );

        assert!(!task.run_once().await);
        assert!(task.run_once().await);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_schedule_display() {
        assert_eq!(TaskSchedule::Every(Duration::from_secs(300)).to_string(), "every 300s");
        assert_eq!(
            TaskSchedule::Cron("0 * * * *".to_string()).to_string(),
            "cron '0 * * * *'"
        );
    }
}
