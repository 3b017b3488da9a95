//! Batch scheduler.
//!
//! Jobs are admitted in queue order: a permit from the `max_parallel_videos`
//! semaphore is acquired before a job is spawned, so a queued job starts
//! only after a running one has reached a terminal state and released its
//! permit. Each job gets a child cancellation token; the job timeout and a
//! global cancel both trip it, and the pipeline honours it at its next
//! stage boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use scenecast_models::{BatchJob, BatchJobState, ProjectId};
use scenecast_storage::ProjectStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{ProjectOutcome, ProjectRunner};
use crate::progress::BatchProgress;
use crate::report::BatchReport;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_parallel_videos: usize,
    pub auto_cleanup: bool,
    pub job_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_parallel_videos: 3,
            auto_cleanup: true,
            job_timeout: Duration::from_secs(3600),
        }
    }
}

impl From<&WorkerConfig> for SchedulerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_parallel_videos: config.max_parallel_videos,
            auto_cleanup: config.auto_cleanup,
            job_timeout: config.job_timeout,
        }
    }
}

pub struct BatchScheduler {
    runner: Arc<dyn ProjectRunner>,
    store: ProjectStore,
    settings: SchedulerSettings,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl BatchScheduler {
    pub fn new(
        runner: Arc<dyn ProjectRunner>,
        store: ProjectStore,
        settings: SchedulerSettings,
    ) -> Self {
        let permits = settings.max_parallel_videos.max(1);
        Self {
            runner,
            store,
            settings,
            semaphore: Arc::new(Semaphore::new(permits)),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels the whole batch when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every project and block until all jobs are terminal.
    ///
    /// After a global cancel, queued jobs are cancelled without starting and
    /// running jobs stop at their next stage boundary.
    pub async fn run(&self, projects: Vec<ProjectId>, progress: Arc<BatchProgress>) -> BatchReport {
        let total = projects.len();
        info!(
            jobs = total,
            max_parallel = self.settings.max_parallel_videos,
            "Starting batch"
        );

        let mut jobs: Vec<BatchJob> = projects.into_iter().map(BatchJob::new).collect();
        let mut tasks: JoinSet<(usize, BatchJob)> = JoinSet::new();

        for (slot, job) in jobs.iter_mut().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                break;
            };

            let job_snapshot = job.clone();
            let runner = Arc::clone(&self.runner);
            let store = self.store.clone();
            let settings = self.settings.clone();
            let token = self.cancel.child_token();
            let progress = Arc::clone(&progress);
            tasks.spawn(async move {
                let _permit = permit;
                let job = execute_job(job_snapshot, runner, store, settings, token).await;
                progress.record_completion();
                (slot, job)
            });
            // Mark as handed off so the post-loop sweep leaves it alone.
            job.state = BatchJobState::Running;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, finished)) => jobs[slot] = finished,
                Err(e) => error!(error = %e, "Job task panicked"),
            }
        }

        for job in jobs.iter_mut() {
            match job.state {
                BatchJobState::Queued => {
                    if job.cancel("batch cancelled before start").is_ok() {
                        metrics::record_job(BatchJobState::Cancelled.as_str(), 0.0);
                        progress.record_completion();
                    }
                }
                // Only reachable when a job task panicked.
                BatchJobState::Running => {
                    let _ = job.fail("job task aborted");
                    progress.record_completion();
                }
                _ => {}
            }
        }

        let report = BatchReport::from_jobs(&jobs);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Batch finished"
        );
        report
    }
}

/// Run one job from `queued` to a terminal state.
async fn execute_job(
    mut job: BatchJob,
    runner: Arc<dyn ProjectRunner>,
    store: ProjectStore,
    settings: SchedulerSettings,
    cancel: CancellationToken,
) -> BatchJob {
    let logger = JobLogger::new(&job.id, &job.project_id);
    let span = logger.create_span();
    let started = Instant::now();

    async {
        if cancel.is_cancelled() {
            let _ = job.cancel("batch cancelled before start");
            return;
        }
        if let Err(e) = job.start() {
            logger.log_error(&e.to_string());
            return;
        }
        logger.log_start("running pipeline");

        let timed_out = CancellationToken::new();
        let watchdog = {
            let cancel = cancel.clone();
            let timed_out = timed_out.clone();
            let timeout = settings.job_timeout;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        timed_out.cancel();
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        };

        let result = runner.run(&job.project_id, cancel.clone(), &logger).await;
        watchdog.abort();

        apply_outcome(&mut job, result, timed_out.is_cancelled(), settings.job_timeout, &logger);

        if settings.auto_cleanup {
            match store.cleanup_transient(&job.project_id).await {
                Ok(removed) => logger.log_progress(&format!("removed {removed} transient files")),
                Err(e) => logger.log_warning(&format!("cleanup failed: {e}")),
            }
        }
    }
    .instrument(span)
    .await;

    metrics::record_job(job.state.as_str(), started.elapsed().as_secs_f64());
    job
}

fn apply_outcome(
    job: &mut BatchJob,
    result: WorkerResult<ProjectOutcome>,
    timed_out: bool,
    timeout: Duration,
    logger: &JobLogger,
) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let kind = if e.is_configuration() { "configuration" } else { "error" };
            logger.log_error(&format!("{kind}: {e}"));
            let _ = job.fail(e.to_string());
            return;
        }
    };

    job.scenes_total = outcome.scenes_total;
    job.scenes_generated = outcome.scenes_generated;
    job.scene_failures = outcome.scene_failures;
    job.warnings = outcome.warnings;

    let transition = if outcome.cancelled {
        let reason = if timed_out {
            format!("job timed out after {timeout:?}")
        } else {
            "cancelled".to_string()
        };
        warn!(job_id = %job.id, reason = %reason, "Job cancelled");
        job.cancel(reason)
    } else if outcome.scenes_generated == 0 {
        job.fail(format!(
            "no scene produced a usable asset ({} failed)",
            job.scene_failures.len()
        ))
    } else {
        let result = job.succeed();
        let problems: Vec<String> = [outcome.persistence_error, outcome.assembly_error]
            .into_iter()
            .flatten()
            .collect();
        if !problems.is_empty() {
            job.error_summary = Some(problems.join("; "));
        }
        result
    };

    if let Err(e) = transition {
        logger.log_error(&e.to_string());
        return;
    }
    logger.log_completion(&format!(
        "{} ({}/{} scenes)",
        job.state, job.scenes_generated, job.scenes_total
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use scenecast_models::SceneFailure;

    use crate::error::WorkerError;

    /// Runner that records how many jobs are active at once.
    struct Instrumented {
        active: AtomicUsize,
        peak: AtomicUsize,
        starts: Mutex<Vec<String>>,
        finishes: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl Instrumented {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                starts: Mutex::new(Vec::new()),
                finishes: Mutex::new(Vec::new()),
                delay,
            })
        }
    }

    #[async_trait]
    impl ProjectRunner for Instrumented {
        async fn run(
            &self,
            project_id: &ProjectId,
            cancel: CancellationToken,
            _logger: &JobLogger,
        ) -> WorkerResult<ProjectOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.starts.lock().unwrap().push(project_id.to_string());

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {}
            }

            self.finishes.lock().unwrap().push(project_id.to_string());
            self.active.fetch_sub(1, Ordering::SeqCst);

            match project_id.as_str() {
                "broken" => Err(WorkerError::config_error("missing script")),
                "empty" => Ok(ProjectOutcome {
                    scenes_total: 2,
                    scene_failures: vec![
                        SceneFailure { scene_index: 0, error: "terminal".into() },
                        SceneFailure { scene_index: 1, error: "terminal".into() },
                    ],
                    ..ProjectOutcome::default()
                }),
                _ => Ok(ProjectOutcome {
                    scenes_total: 3,
                    scenes_generated: 2,
                    scene_failures: vec![SceneFailure { scene_index: 1, error: "terminal".into() }],
                    cancelled: cancel.is_cancelled(),
                    ..ProjectOutcome::default()
                }),
            }
        }
    }

    fn ids(names: &[&str]) -> Vec<ProjectId> {
        names.iter().map(|n| ProjectId::from_string(*n)).collect()
    }

    fn scheduler(runner: Arc<Instrumented>, store: ProjectStore, max: usize) -> BatchScheduler {
        BatchScheduler::new(
            runner,
            store,
            SchedulerSettings {
                max_parallel_videos: max,
                auto_cleanup: true,
                job_timeout: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn test_never_exceeds_max_parallel_videos() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Instrumented::new(Duration::from_millis(40));
        let scheduler = scheduler(Arc::clone(&runner), ProjectStore::new(dir.path()), 2);
        let progress = Arc::new(BatchProgress::new(5));

        let report = scheduler
            .run(ids(&["p1", "p2", "p3", "p4", "p5"]), Arc::clone(&progress))
            .await;

        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);
        assert_eq!(report.succeeded, 5);
        assert_eq!(progress.snapshot().completed, 5);

        // The third job starts only after one of the first two finished.
        let starts = runner.starts.lock().unwrap().clone();
        let finishes = runner.finishes.lock().unwrap().clone();
        assert_eq!(&starts[..2], &["p1", "p2"]);
        assert!(finishes[0] == "p1" || finishes[0] == "p2");
        assert_eq!(starts[2], "p3");
    }

    #[tokio::test]
    async fn test_partial_success_and_failure_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Instrumented::new(Duration::from_millis(1));
        let scheduler = scheduler(runner, ProjectStore::new(dir.path()), 3);

        let report = scheduler
            .run(ids(&["ok", "empty", "broken"]), Arc::new(BatchProgress::new(3)))
            .await;

        assert_eq!(report.jobs[0].state, BatchJobState::Succeeded);
        assert_eq!(report.jobs[0].scene_failures.len(), 1);
        assert_eq!(report.jobs[1].state, BatchJobState::Failed);
        assert!(report.jobs[1].error_summary.as_deref().unwrap().contains("no scene"));
        assert_eq!(report.jobs[2].state, BatchJobState::Failed);
        assert!(report.jobs[2].error_summary.as_deref().unwrap().contains("missing script"));
    }

    #[tokio::test]
    async fn test_global_cancel_stops_queued_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Instrumented::new(Duration::from_secs(30));
        let scheduler = scheduler(Arc::clone(&runner), ProjectStore::new(dir.path()), 1);
        let token = scheduler.cancellation_token();
        let progress = Arc::new(BatchProgress::new(3));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let report = scheduler.run(ids(&["a", "b", "c"]), Arc::clone(&progress)).await;

        assert_eq!(report.cancelled, 3);
        assert_eq!(runner.starts.lock().unwrap().len(), 1);
        assert_eq!(progress.snapshot().completed, 3);
        assert_eq!(report.jobs[1].error_summary.as_deref(), Some("batch cancelled before start"));
    }

    #[tokio::test]
    async fn test_job_timeout_cancels_cooperatively() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Instrumented::new(Duration::from_secs(30));
        let scheduler = BatchScheduler::new(
            runner,
            ProjectStore::new(dir.path()),
            SchedulerSettings {
                max_parallel_videos: 1,
                auto_cleanup: false,
                job_timeout: Duration::from_millis(20),
            },
        );

        let report = scheduler.run(ids(&["slow"]), Arc::new(BatchProgress::new(1))).await;
        assert_eq!(report.jobs[0].state, BatchJobState::Cancelled);
        assert!(report.jobs[0].error_summary.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.jobs[0].scenes_generated, 2);
    }

    #[tokio::test]
    async fn test_auto_cleanup_removes_transient_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let id = ProjectId::from_string("p1");
        let tmp = store.transient_dir(&id).await.unwrap();
        std::fs::write(tmp.join("partial.mp4"), b"x").unwrap();
        let assets = store.assets_dir(&id).await.unwrap();
        std::fs::write(assets.join("scene_000.webp"), b"x").unwrap();

        let runner = Instrumented::new(Duration::from_millis(1));
        scheduler(runner, store, 1)
            .run(vec![id], Arc::new(BatchProgress::new(1)))
            .await;

        assert!(!tmp.exists());
        assert!(assets.join("scene_000.webp").exists());
    }
}
