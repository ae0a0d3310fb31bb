// Asynchronous classification pipeline: bounded queues around one worker thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbImage;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{ClassificationResult, Confidences, ImageRegion};
use crate::preprocess::prepare_region;

/// Longest single wait while joining the worker in `stop`
const MAX_JOIN_STEP: Duration = Duration::from_millis(5);

/// Capability turning a prepared face image into an emotion distribution
pub trait EmotionClassifier: Send {
    fn classify(&mut self, face: &RgbImage) -> Result<Confidences>;
}

impl<F> EmotionClassifier for F
where
    F: FnMut(&RgbImage) -> Result<Confidences> + Send,
{
    fn classify(&mut self, face: &RgbImage) -> Result<Confidences> {
        self(face)
    }
}

/// Counters describing pipeline throughput
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    classified: AtomicU64,
    failed: AtomicU64,
    results_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Regions accepted into the submission queue
    pub submitted: u64,
    /// Regions rejected because the queue was full or stopped
    pub dropped: u64,
    /// Successful classifier calls
    pub classified: u64,
    /// Classifier calls that errored, panicked or returned no signal
    pub failed: u64,
    /// Results discarded because the result queue was full
    pub results_dropped: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Bounded two-queue pipeline with one background classifier worker.
///
/// Both ends use non-blocking operations: a full queue drops the new item
/// instead of stalling the capture loop. Classifier failures never leave the
/// worker.
pub struct ClassificationPipeline {
    submissions: mpsc::Sender<ImageRegion>,
    results: mpsc::Receiver<ClassificationResult>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    worker: Option<JoinHandle<()>>,
    config: PipelineConfig,
}

impl ClassificationPipeline {
    /// Starts the worker thread around `classifier`
    pub fn start<C>(classifier: C, config: PipelineConfig) -> Result<Self>
    where
        C: EmotionClassifier + 'static,
    {
        config.validate()?;

        let (submissions, submission_rx) = mpsc::channel(config.submission_capacity);
        let (result_tx, results) = mpsc::channel(config.result_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(PipelineStats::default());

        let worker = Worker {
            classifier: Box::new(classifier),
            submissions: submission_rx,
            results: result_tx,
            running: running.clone(),
            stats: stats.clone(),
            config: config.clone(),
        };
        let handle = thread::Builder::new()
            .name("emotion-classifier".to_string())
            .spawn(move || worker.run())?;

        info!(
            submission_capacity = config.submission_capacity,
            result_capacity = config.result_capacity,
            "Classification pipeline started"
        );

        Ok(Self {
            submissions,
            results,
            running,
            stats,
            worker: Some(handle),
            config,
        })
    }

    /// Offers a region to the worker without blocking.
    ///
    /// Returns `false` when the queue is full or the pipeline has stopped;
    /// the region is dropped in both cases.
    pub fn submit(&self, region: ImageRegion) -> bool {
        if !self.is_running() {
            return false;
        }
        match self.submissions.try_send(region) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Submission queue full, dropping face region");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pops every pending result and returns only the newest one
    pub fn drain_latest(&mut self) -> Option<ClassificationResult> {
        let mut latest = None;
        loop {
            match self.results.try_recv() {
                Ok(result) => latest = Some(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }

    /// Regions waiting in the submission queue
    pub fn pending(&self) -> usize {
        self.submissions.max_capacity() - self.submissions.capacity()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Signals the worker and waits for it up to the configured timeout.
    ///
    /// A worker that is still busy past the deadline is detached.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + self.config.join_timeout();
        let step = self.config.poll_interval().min(MAX_JOIN_STEP);
        while !handle.is_finished() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(step.min(remaining));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                error!("Classification worker terminated with a panic");
            } else {
                info!("Classification pipeline stopped");
            }
        } else {
            warn!(
                "Classification worker did not finish within {:?}; detaching",
                self.config.join_timeout()
            );
        }
    }
}

impl Drop for ClassificationPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved onto the worker thread
struct Worker {
    classifier: Box<dyn EmotionClassifier>,
    submissions: mpsc::Receiver<ImageRegion>,
    results: mpsc::Sender<ClassificationResult>,
    running: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    config: PipelineConfig,
}

impl Worker {
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.submissions.try_recv() {
                Ok(region) => self.process(region),
                Err(TryRecvError::Empty) => thread::sleep(self.config.poll_interval()),
                Err(TryRecvError::Disconnected) => break,
            }
        }
        debug!("Classification worker exiting");
    }

    fn process(&mut self, region: ImageRegion) {
        let origin = region.origin();
        let face = prepare_region(region, &self.config);

        let classifier = &mut self.classifier;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(&face)));

        let confidences = match outcome {
            Ok(Ok(confidences)) => confidences,
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                debug!("Emotion classification failed for region at {:?}: {}", origin, e);
                return;
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("Emotion classifier panicked for region at {:?}", origin);
                return;
            }
        };

        let Some(result) = ClassificationResult::from_confidences(confidences) else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            debug!("Classifier returned an empty distribution, discarding");
            return;
        };

        self.stats.classified.fetch_add(1, Ordering::Relaxed);
        if self.results.try_send(result).is_err() {
            self.stats.results_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Result queue full, dropping classification");
        }
    }
}
