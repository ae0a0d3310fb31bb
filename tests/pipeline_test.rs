use emotion_tracker::config::{AppConfig, PipelineConfig};
use emotion_tracker::error::{EmotionTrackerError, Result};
use emotion_tracker::models::{Confidences, Emotion, FaceBox, ImageRegion};
use emotion_tracker::monitor::EmotionMonitor;
use emotion_tracker::pipeline::ClassificationPipeline;
use emotion_tracker::state::CurrentLabel;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        poll_interval_ms: 1,
        join_timeout_ms: 500,
        ..PipelineConfig::default()
    }
}

fn region(width: u32) -> ImageRegion {
    ImageRegion::new(RgbImage::new(width, width), (0, 0))
}

/// Polls `condition` until it holds or `timeout` elapses
fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn happy() -> Confidences {
    Confidences::from_pairs([(Emotion::Happy, 90.0), (Emotion::Neutral, 10.0)])
}

#[test]
fn burst_beyond_capacity_is_dropped_without_blocking() {
    let gate = Arc::new(AtomicBool::new(false));
    let worker_gate = gate.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker_gate.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(happy())
    };

    let config = fast_config();
    let capacity = config.submission_capacity;
    let mut pipeline = ClassificationPipeline::start(classifier, config).unwrap();

    let started = Instant::now();
    let accepted = (0..20).filter(|_| pipeline.submit(region(120))).count();
    assert!(started.elapsed() < Duration::from_secs(1));

    // One region may already sit inside the blocked classifier
    assert!(accepted >= capacity);
    assert!(accepted <= capacity + 1);
    assert_eq!(pipeline.stats().dropped as usize, 20 - accepted);

    gate.store(true, Ordering::SeqCst);
    pipeline.stop();
}

#[test]
fn drain_returns_only_the_newest_result() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        let label = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Emotion::Sad
        } else {
            Emotion::Fear
        };
        Ok(Confidences::from_pairs([(label, 80.0), (Emotion::Neutral, 20.0)]))
    };

    let mut pipeline = ClassificationPipeline::start(classifier, fast_config()).unwrap();
    assert!(pipeline.submit(region(120)));
    assert!(pipeline.submit(region(120)));
    assert!(wait_for(Duration::from_secs(2), || pipeline.stats().classified == 2));

    let latest = pipeline.drain_latest().unwrap();
    assert_eq!(latest.label, Emotion::Fear);
    assert!(pipeline.drain_latest().is_none());
    pipeline.stop();
}

#[test]
fn failing_classifier_publishes_nothing() {
    let classifier = |_face: &RgbImage| -> Result<Confidences> {
        Err(EmotionTrackerError::Classification("model unavailable".to_string()))
    };
    let mut pipeline = ClassificationPipeline::start(classifier, fast_config()).unwrap();

    for _ in 0..3 {
        assert!(pipeline.submit(region(50)));
        assert!(wait_for(Duration::from_secs(2), || pipeline.pending() == 0));
    }
    assert!(wait_for(Duration::from_secs(2), || pipeline.stats().failed == 3));
    assert!(pipeline.drain_latest().is_none());
    assert_eq!(pipeline.stats().classified, 0);
    pipeline.stop();
}

#[test]
fn panicking_and_empty_classifiers_are_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => panic!("classifier blew up"),
            1 => Ok(Confidences::default()),
            _ => Ok(happy()),
        }
    };
    let mut pipeline = ClassificationPipeline::start(classifier, fast_config()).unwrap();

    for _ in 0..3 {
        assert!(pipeline.submit(region(120)));
        assert!(wait_for(Duration::from_secs(2), || pipeline.pending() == 0));
    }
    assert!(wait_for(Duration::from_secs(2), || pipeline.stats().classified == 1));
    assert_eq!(pipeline.stats().failed, 2);
    assert_eq!(pipeline.drain_latest().unwrap().label, Emotion::Happy);
    pipeline.stop();
}

#[test]
fn submit_after_stop_is_a_no_op() {
    let classifier = |_face: &RgbImage| -> Result<Confidences> { Ok(happy()) };
    let mut pipeline = ClassificationPipeline::start(classifier, fast_config()).unwrap();
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert!(!pipeline.submit(region(120)));
    pipeline.stop();
}

#[test]
fn stop_returns_even_when_classifier_hangs() {
    let entered = Arc::new(AtomicBool::new(false));
    let flag = entered.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        flag.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_secs(3));
        Ok(happy())
    };
    let config = PipelineConfig {
        join_timeout_ms: 100,
        ..fast_config()
    };
    let mut pipeline = ClassificationPipeline::start(classifier, config).unwrap();
    assert!(pipeline.submit(region(120)));
    assert!(wait_for(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn stop_honors_join_timeout_with_long_poll_interval() {
    let classifier = |_face: &RgbImage| -> Result<Confidences> { Ok(happy()) };
    let config = PipelineConfig {
        poll_interval_ms: 2000,
        join_timeout_ms: 100,
        ..PipelineConfig::default()
    };
    let mut pipeline = ClassificationPipeline::start(classifier, config).unwrap();
    // Let the worker settle into its empty-queue sleep
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(!pipeline.is_running());
}

#[test]
fn full_result_queue_drops_newest_results() {
    const LABELS: [Emotion; 5] = [
        Emotion::Sad,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Surprise,
    ];
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        let label = LABELS[counter.fetch_add(1, Ordering::SeqCst) % LABELS.len()];
        Ok(Confidences::from_pairs([(label, 75.0), (Emotion::Neutral, 25.0)]))
    };

    let config = fast_config();
    let result_capacity = config.result_capacity as u64;
    let mut pipeline = ClassificationPipeline::start(classifier, config).unwrap();

    for done in 1..=LABELS.len() as u64 {
        assert!(pipeline.submit(region(120)));
        assert!(wait_for(Duration::from_secs(2), || pipeline.stats().classified == done));
    }

    assert!(wait_for(Duration::from_secs(2), || {
        pipeline.stats().results_dropped == 5 - result_capacity
    }));
    assert_eq!(pipeline.stats().classified, 5);

    // Only the first `result_capacity` results were kept; the newest of those wins
    let latest = pipeline.drain_latest().unwrap();
    assert_eq!(latest.label, LABELS[result_capacity as usize - 1]);
    assert!(pipeline.drain_latest().is_none());
    pipeline.stop();
}

#[test]
fn monitor_publishes_stabilized_emotion() {
    let classifier = |_face: &RgbImage| -> Result<Confidences> { Ok(happy()) };
    let mut config = AppConfig::default();
    config.pipeline = fast_config();
    config.thresholds.frame_skip = 1;

    let mut monitor = EmotionMonitor::new(classifier, &config).unwrap();
    let state = monitor.state();
    assert_eq!(state.read().label, CurrentLabel::Initializing);

    let face = FaceBox::new(200, 140, 160, 160);
    let published = wait_for(Duration::from_secs(3), || {
        let mut frame = RgbImage::new(640, 480);
        monitor.process_frame(&mut frame, &[face]);
        state.read().label == CurrentLabel::Emotion(Emotion::Happy)
    });
    assert!(published);
    assert_eq!(state.read().label_confidence(), 90.0);
    monitor.stop();
}

#[test]
fn monitor_keeps_last_good_value_when_classifier_starts_failing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Confidences::from_pairs([(Emotion::Angry, 70.0), (Emotion::Neutral, 30.0)]))
        } else {
            Err(EmotionTrackerError::Classification("transient".to_string()))
        }
    };
    let mut config = AppConfig::default();
    config.pipeline = fast_config();
    config.thresholds.frame_skip = 1;

    let mut monitor = EmotionMonitor::new(classifier, &config).unwrap();
    let state = monitor.state();
    let face = FaceBox::new(200, 140, 160, 160);

    assert!(wait_for(Duration::from_secs(3), || {
        let mut frame = RgbImage::new(640, 480);
        monitor.process_frame(&mut frame, &[face]);
        state.read().label != CurrentLabel::Initializing
    }));
    assert_eq!(state.read().label, CurrentLabel::Emotion(Emotion::Angry));

    for _ in 0..20 {
        let mut frame = RgbImage::new(640, 480);
        monitor.process_frame(&mut frame, &[face]);
        thread::sleep(Duration::from_millis(2));
        assert_eq!(state.read().label, CurrentLabel::Emotion(Emotion::Angry));
    }
    assert!(calls.load(Ordering::SeqCst) > 1);
    monitor.stop();
}

#[test]
fn monitor_without_faces_never_submits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let classifier = move |_face: &RgbImage| -> Result<Confidences> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(happy())
    };
    let mut config = AppConfig::default();
    config.pipeline = fast_config();

    let mut monitor = EmotionMonitor::new(classifier, &config).unwrap();
    for _ in 0..10 {
        let mut frame = RgbImage::new(320, 240);
        let report = monitor.process_frame(&mut frame, &[]);
        assert!(report.face.is_none());
        assert!(!report.submitted);
    }
    assert_eq!(monitor.stats().submitted, 0);
    assert_eq!(monitor.state().read().label, CurrentLabel::Initializing);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    monitor.stop();
}
