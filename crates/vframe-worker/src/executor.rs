//! Job executor.
//!
//! A single logical worker drains a FIFO queue. Each job goes through the
//! output existence check, the memory gate and the media processor, then a
//! webhook is fired and the submitter's handle is resolved. Consecutive jobs
//! are separated by the configured inter-job delay.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, error, Instrument};

use vframe_media::{output_exists, LogProgressSink, ProgressSink, TerminalProgressSink};
use vframe_models::{Job, JobId, NotificationPayload, QueueStatus};

use crate::config::{ProgressOutput, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::memory::MemoryMonitor;
use crate::metrics;
use crate::notifier::NotificationDispatcher;
use crate::processor::{FfmpegProcessor, MediaProcessor, ProcessReport};

/// Successful result of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// Output was already present and nothing ran
    pub existing: bool,
    /// Wall-clock time spent in the handler
    pub elapsed: Duration,
    /// Frames written, for frame extraction jobs that ran
    pub frames_extracted: Option<usize>,
}

/// Completion handle returned by [`TaskExecutor::submit`].
///
/// Resolves exactly once, with the job's outcome or its error. Dropping the
/// handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    rx: oneshot::Receiver<WorkerResult<JobOutcome>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Future for JobHandle {
    type Output = WorkerResult<JobOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkerError::Abandoned(self.job_id.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct QueuedJob {
    job: Job,
    reply: oneshot::Sender<WorkerResult<JobOutcome>>,
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<QueuedJob>,
    /// A job is between dequeue and handle resolution
    busy: bool,
    current_task: Option<String>,
    /// The worker loop task exists (possibly sleeping out the delay)
    worker_active: bool,
    last_finished: Option<Instant>,
}

enum Execution {
    Existing,
    Completed(ProcessReport),
}

struct ExecutorInner {
    config: WorkerConfig,
    processor: Arc<dyn MediaProcessor>,
    memory: MemoryMonitor,
    notifier: NotificationDispatcher,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Single-worker FIFO executor. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
}

impl TaskExecutor {
    /// Create an executor from its collaborators.
    pub fn new(
        config: WorkerConfig,
        processor: Arc<dyn MediaProcessor>,
        memory: MemoryMonitor,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                config,
                processor,
                memory,
                notifier,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Create an FFmpeg-backed executor watching host memory.
    pub fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        let processor = Arc::new(FfmpegProcessor::from_config(&config));
        let memory = MemoryMonitor::from_config(&config);
        let notifier = NotificationDispatcher::from_config(&config)?;
        Ok(Self::new(config, processor, memory, notifier))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.inner.memory
    }

    /// Enqueue a job and return immediately.
    ///
    /// Starts the worker loop if it is not already running, so this must be
    /// called from within a Tokio runtime.
    pub fn submit(&self, job: Job) -> JobHandle {
        let (reply, rx) = oneshot::channel();
        let job_id = job.id.clone();
        let kind = job.kind();
        let logger = JobLogger::new(&job);

        let (queue_length, start_worker) = {
            let mut state = self.inner.lock_state();
            state.queue.push_back(QueuedJob { job, reply });
            let start_worker = !state.worker_active;
            state.worker_active = true;
            (state.queue.len(), start_worker)
        };

        metrics::record_enqueued(kind);
        metrics::set_queue_length(queue_length);
        logger.log_queued(queue_length);

        if start_worker {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.run_loop());
        }

        JobHandle { job_id, rx }
    }

    /// Snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        let state = self.inner.lock_state();
        QueueStatus {
            busy: state.busy,
            queue_length: state.queue.len(),
            current_task: state.current_task.clone(),
        }
    }

    /// Resolve once the queue is drained and the worker has gone idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.lock_state();
                if !state.worker_active && state.queue.is_empty() {
                    return;
                }
            }

            notified.await;
        }
    }
}

impl ExecutorInner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time left in the inter-job window, or `None` if the queue is empty
    /// (in which case the worker has been marked inactive).
    fn next_wait(&self) -> Option<Duration> {
        let mut state = self.lock_state();
        if state.queue.is_empty() {
            state.worker_active = false;
            return None;
        }
        let wait = state
            .last_finished
            .map(|at| (at + self.config.inter_job_delay).saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        Some(wait)
    }

    fn dequeue(&self) -> Option<QueuedJob> {
        let mut state = self.lock_state();
        if state.busy {
            return None;
        }
        let next = state.queue.pop_front()?;
        state.busy = true;
        state.current_task = Some(next.job.describe());
        metrics::set_queue_length(state.queue.len());
        Some(next)
    }

    fn finish(&self) {
        let mut state = self.lock_state();
        state.busy = false;
        state.current_task = None;
        state.last_finished = Some(Instant::now());
    }

    async fn run_loop(self: Arc<Self>) {
        debug!("Worker loop started");
        loop {
            let Some(wait) = self.next_wait() else {
                break;
            };
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "Inter-job delay");
                tokio::time::sleep(wait).await;
            }

            let Some(QueuedJob { job, reply }) = self.dequeue() else {
                continue;
            };

            let result = AssertUnwindSafe(self.handle(&job))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(WorkerError::processing_failed("job handler panicked")));
            self.finish();

            if reply.send(result).is_err() {
                debug!(job_id = %job.id, "Job handle dropped before completion");
            }
        }

        debug!("Worker loop idle");
        self.idle.notify_waiters();
    }

    /// Run one job through the pipeline and notify. Never panics; every
    /// failure ends up in the returned error.
    async fn handle(&self, job: &Job) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(job);
        let span = logger.create_span();

        async {
            let started = Instant::now();
            logger.log_start(&job.describe());

            let result = AssertUnwindSafe(self.execute(job, &logger))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(WorkerError::processing_failed("job handler panicked")));
            let elapsed = started.elapsed();

            match result {
                Ok(Execution::Existing) => {
                    metrics::record_skipped(job.kind());
                    self.notify(job, NotificationPayload::existing(job)).await;
                    Ok(JobOutcome {
                        job_id: job.id.clone(),
                        existing: true,
                        elapsed,
                        frames_extracted: None,
                    })
                }
                Ok(Execution::Completed(report)) => {
                    logger.log_completion(elapsed);
                    metrics::record_completed(job.kind(), elapsed.as_secs_f64());
                    let payload = NotificationPayload::completed(job, elapsed.as_secs_f64())
                        .with_frames_extracted(report.frames_extracted);
                    self.notify(job, payload).await;
                    Ok(JobOutcome {
                        job_id: job.id.clone(),
                        existing: false,
                        elapsed,
                        frames_extracted: report.frames_extracted,
                    })
                }
                Err(e) => {
                    logger.log_error(&e.to_string(), elapsed);
                    metrics::record_failed(job.kind(), e.reason());
                    self.notify(
                        job,
                        NotificationPayload::failed(job, &e, elapsed.as_secs_f64()),
                    )
                    .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &Job, logger: &JobLogger) -> WorkerResult<Execution> {
        if output_exists(job).await {
            logger.log_skipped(&job.output_path.display().to_string());
            return Ok(Execution::Existing);
        }

        let max_wait = self.config.admission_max_wait;
        if !self
            .memory
            .wait_until_available(max_wait, self.config.admission_poll_interval)
            .await
        {
            return Err(WorkerError::admission_deferred(max_wait));
        }

        let sink = self.progress_sink(job);
        let report = self.processor.process(job, sink.as_ref()).await?;
        Ok(Execution::Completed(report))
    }

    /// Deliver a payload. A panicking notifier is logged and never reaches
    /// the job outcome or the worker loop.
    async fn notify(&self, job: &Job, payload: NotificationPayload) {
        let delivery = AssertUnwindSafe(self.notifier.dispatch(job, &payload)).catch_unwind();
        if delivery.await.is_err() {
            error!(job_id = %job.id, "Notification panicked");
            metrics::record_notification("failed");
        }
    }

    fn progress_sink(&self, job: &Job) -> Box<dyn ProgressSink> {
        match self.config.progress_output {
            ProgressOutput::Log => Box::new(LogProgressSink::new(job.id.to_string())),
            ProgressOutput::Terminal => Box::new(TerminalProgressSink::new(job.describe())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;
    use url::Url;
    use vframe_models::{JobKind, ProgressSnapshot};

    use crate::error::NotifyResult;
    use crate::memory::tests::ScriptedProbe;
    use crate::notifier::JobNotifier;

    /// Records job order and peak concurrency; fails inputs named `fail*`.
    /// With a gate, each job waits for a permit after signalling `entered`.
    #[derive(Default)]
    struct MockProcessor {
        delay: Duration,
        gate: Option<Arc<Semaphore>>,
        entered: Notify,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaProcessor for MockProcessor {
        async fn process(&self, job: &Job, sink: &dyn ProgressSink) -> WorkerResult<ProcessReport> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let name = job.input_path.display().to_string();
            self.calls.lock().unwrap().push(name.clone());
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::time::sleep(self.delay).await;
            sink.on_progress(&ProgressSnapshot::default());

            self.active.fetch_sub(1, Ordering::SeqCst);
            if name.starts_with("fail") {
                return Err(WorkerError::processing_failed(format!("{} exploded", name)));
            }
            if name.starts_with("panic") {
                panic!("processor bug");
            }
            let frames_extracted = (job.kind() == JobKind::FrameExtract).then_some(7);
            Ok(ProcessReport { frames_extracted })
        }
    }

    struct PanickingNotifier;

    #[async_trait]
    impl JobNotifier for PanickingNotifier {
        async fn notify(&self, _url: &Url, _payload: &NotificationPayload) -> NotifyResult<()> {
            panic!("webhook client bug");
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        payloads: Mutex<Vec<NotificationPayload>>,
    }

    #[async_trait]
    impl JobNotifier for RecordingNotifier {
        async fn notify(&self, _url: &Url, payload: &NotificationPayload) -> NotifyResult<()> {
            self.payloads.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    struct Harness {
        executor: TaskExecutor,
        processor: Arc<MockProcessor>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(memory_percents: &[f64], delay: Duration) -> Harness {
        harness_with(
            memory_percents,
            MockProcessor {
                delay,
                ..Default::default()
            },
        )
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            inter_job_delay: Duration::from_millis(50),
            admission_max_wait: Duration::from_secs(2),
            admission_poll_interval: Duration::from_millis(500),
            callback_url: Some(Url::parse("http://hooks.invalid/done").unwrap()),
            ..Default::default()
        }
    }

    fn scripted_memory(memory_percents: &[f64]) -> MemoryMonitor {
        MemoryMonitor::with_probe(
            Arc::new(ScriptedProbe::new(memory_percents)),
            70.0,
            Duration::from_secs(30),
        )
    }

    fn harness_with(memory_percents: &[f64], processor: MockProcessor) -> Harness {
        let config = test_config();
        let processor = Arc::new(processor);
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), config.callback_url.clone());
        let executor = TaskExecutor::new(
            config,
            processor.clone(),
            scripted_memory(memory_percents),
            dispatcher,
        );

        Harness {
            executor,
            processor,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_fifo_order_and_single_worker() {
        let h = harness(&[10.0], Duration::from_millis(20));

        let handles: Vec<JobHandle> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| h.executor.submit(Job::transcode(name, "/nonexistent/out.mp4")))
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(!outcome.existing);
        }

        assert_eq!(*h.processor.calls.lock().unwrap(), vec!["a", "b", "c", "d"]);
        assert_eq!(h.processor.peak.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.payloads.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_submit_returns_before_execution() {
        let h = harness(&[10.0], Duration::from_millis(50));

        let first = h.executor.submit(Job::transcode("a", "/nonexistent/a.mp4"));
        let second = h.executor.submit(Job::transcode("b", "/nonexistent/b.mp4"));
        assert_eq!(h.executor.status().queue_length + usize::from(h.executor.status().busy), 2);

        first.await.unwrap();
        second.await.unwrap();
        h.executor.wait_idle().await;
        assert_eq!(h.executor.status(), QueueStatus::default());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let h = harness(&[10.0], Duration::ZERO);

        let bad = h.executor.submit(Job::transcode("fail-1", "/nonexistent/x.mp4"));
        let boom = h.executor.submit(Job::transcode("panic-1", "/nonexistent/y.mp4"));
        let good = h.executor.submit(Job::transcode("ok-1", "/nonexistent/z.mp4"));

        let err = bad.await.unwrap_err();
        assert!(err.to_string().contains("fail-1 exploded"));
        assert!(matches!(boom.await, Err(WorkerError::ProcessingFailed(_))));
        assert!(good.await.is_ok());

        let payloads = h.notifier.payloads.lock().unwrap();
        let successes: Vec<bool> = payloads.iter().map(|p| p.success).collect();
        assert_eq!(successes, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_existing_output_skips_processing() {
        let h = harness(&[10.0], Duration::ZERO);
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("frame_000001.jpg"), b"").unwrap();

        let outcome = h
            .executor
            .submit(Job::frame_extract("a.mov", dir.path(), 2.0))
            .await
            .unwrap();

        assert!(outcome.existing);
        assert!(h.processor.calls.lock().unwrap().is_empty());
        let payloads = h.notifier.payloads.lock().unwrap();
        assert!(payloads[0].success && payloads[0].existing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_deferred_when_memory_stays_high() {
        let h = harness(&[95.0], Duration::ZERO);

        let err = h
            .executor
            .submit(Job::transcode("a", "/nonexistent/a.mp4"))
            .await
            .unwrap_err();

        assert!(err.is_admission_deferred());
        assert!(h.processor.calls.lock().unwrap().is_empty());
        assert!(!h.notifier.payloads.lock().unwrap()[0].success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_proceeds_when_memory_drops() {
        let h = harness(&[95.0, 95.0, 40.0], Duration::ZERO);

        let started = Instant::now();
        h.executor
            .submit(Job::transcode("a", "/nonexistent/a.mp4"))
            .await
            .unwrap();

        assert_eq!(*h.processor.calls.lock().unwrap(), vec!["a"]);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_job_delay_spans_idle_submissions() {
        let h = harness(&[10.0], Duration::ZERO);

        h.executor
            .submit(Job::transcode("a", "/nonexistent/a.mp4"))
            .await
            .unwrap();
        h.executor.wait_idle().await;

        let started = Instant::now();
        h.executor
            .submit(Job::transcode("b", "/nonexistent/b.mp4"))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let h = harness(&[10.0], Duration::ZERO);

        drop(h.executor.submit(Job::transcode("a", "/nonexistent/a.mp4")));
        h.executor
            .submit(Job::transcode("b", "/nonexistent/b.mp4"))
            .await
            .unwrap();

        assert_eq!(*h.processor.calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_status_while_job_runs() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(
            &[10.0],
            MockProcessor {
                gate: Some(gate.clone()),
                ..Default::default()
            },
        );

        let first = h.executor.submit(Job::transcode("a.mov", "/nonexistent/a.mp4"));
        let second = h.executor.submit(Job::transcode("b.mov", "/nonexistent/b.mp4"));
        h.processor.entered.notified().await;

        let status = h.executor.status();
        assert!(status.busy);
        assert_eq!(status.queue_length, 1);
        assert_eq!(
            status.current_task.as_deref(),
            Some("transcode a.mov -> /nonexistent/a.mp4")
        );

        gate.add_permits(2);
        first.await.unwrap();
        second.await.unwrap();
        h.executor.wait_idle().await;

        let status = h.executor.status();
        assert!(!status.busy);
        assert_eq!(status.queue_length, 0);
        assert!(status.current_task.is_none());
    }

    #[tokio::test]
    async fn test_frame_count_reaches_outcome_and_payload() {
        let h = harness(&[10.0], Duration::ZERO);
        let dir = TempDir::new().unwrap();

        let outcome = h
            .executor
            .submit(Job::frame_extract("a.mov", dir.path().join("empty"), 2.0))
            .await
            .unwrap();
        assert_eq!(outcome.frames_extracted, Some(7));

        let transcoded = h
            .executor
            .submit(Job::transcode("b.mov", "/nonexistent/b.mp4"))
            .await
            .unwrap();
        assert_eq!(transcoded.frames_extracted, None);

        let payloads = h.notifier.payloads.lock().unwrap();
        assert_eq!(payloads[0].frames_extracted, Some(7));
        assert_eq!(payloads[1].frames_extracted, None);
    }

    #[tokio::test]
    async fn test_panicking_notifier_keeps_worker_alive() {
        let config = test_config();
        let processor = Arc::new(MockProcessor::default());
        let dispatcher =
            NotificationDispatcher::new(Arc::new(PanickingNotifier), config.callback_url.clone());
        let executor = TaskExecutor::new(
            config,
            processor.clone(),
            scripted_memory(&[10.0]),
            dispatcher,
        );

        executor
            .submit(Job::transcode("a", "/nonexistent/a.mp4"))
            .await
            .unwrap();
        executor
            .submit(Job::transcode("fail-b", "/nonexistent/b.mp4"))
            .await
            .unwrap_err();
        executor.wait_idle().await;

        // A later submission still gets a worker
        executor
            .submit(Job::transcode("c", "/nonexistent/c.mp4"))
            .await
            .unwrap();
        assert_eq!(*processor.calls.lock().unwrap(), vec!["a", "fail-b", "c"]);
    }
}
