//! Integration tests for the streaming event segmenter

use pore_segmenter::dispatch::DispatchStats;
use pore_segmenter::{
    AlgorithmSettings, ChannelSource, Dispatch, DriftLimits, EventProcessor, EventRecord,
    EventSegmenter, InlineDispatcher, MemorySource, ProcessError, SegmentConfig, StopReason,
    WorkerPool,
};
use std::sync::{Arc, Mutex};
use std::thread;

/// Processor that keeps every event it receives.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<EventRecord>>,
}

impl Recorder {
    fn take(&self) -> Vec<EventRecord> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventProcessor for Recorder {
    fn process(&self, event: EventRecord) -> Result<(), ProcessError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Baseline 100 pA, SD 5 pA, k = 3 -> threshold 85 pA.
fn fixed_config(pad_length: usize, min_event_length: usize) -> SegmentConfig {
    SegmentConfig {
        pad_length,
        min_event_length,
        threshold_sigma: 3.0,
        mean_open_current: Some(100.0),
        sd_open_current: Some(5.0),
        slope_open_current: Some(0.0),
        drift: DriftLimits::disabled(),
        ..Default::default()
    }
}

fn stream(parts: &[(f64, usize)]) -> Vec<f64> {
    parts
        .iter()
        .flat_map(|&(value, count)| std::iter::repeat(value).take(count))
        .collect()
}

fn segment(config: SegmentConfig, samples: Vec<f64>) -> (Vec<EventRecord>, pore_segmenter::RunSummary) {
    let recorder = Arc::new(Recorder::default());
    let mut segmenter = EventSegmenter::with_settings(
        config,
        AlgorithmSettings::new(),
        MemorySource::new(samples, 10_000.0),
        InlineDispatcher::new(Arc::clone(&recorder)),
    )
    .unwrap();
    let summary = segmenter.run().unwrap();
    (recorder.take(), summary)
}

/// Small deterministic generator for noisy traces.
struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn noisy_trace(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = XorShift(seed);
    let mut samples = Vec::with_capacity(len);
    while samples.len() < len {
        if rng.next_f64() < 0.01 {
            let depth = 30.0 + 40.0 * rng.next_f64();
            let width = 1 + (rng.next_f64() * 20.0) as usize;
            for _ in 0..width {
                samples.push(depth + 4.0 * (rng.next_f64() - 0.5));
            }
        } else {
            samples.push(100.0 + 10.0 * (rng.next_f64() - 0.5));
        }
    }
    samples.truncate(len);
    samples
}

/// Open channel noise only: 100 +/- 5 pA.
fn noisy_baseline(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = XorShift(seed);
    (0..len).map(|_| 100.0 + 10.0 * (rng.next_f64() - 0.5)).collect()
}

#[test]
fn test_single_event_layout() {
    let samples = stream(&[(100.0, 20), (50.0, 10), (100.0, 20)]);
    let (events, summary) = segment(fixed_config(3, 5), samples);

    assert_eq!(summary.stats.accepted, 1);
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event.run_length(), 10);
    assert_eq!(event.samples.len(), 16);
    assert_eq!(event.start_offset, 4);
    assert_eq!(event.end_offset, 14);
    assert_eq!(event.event_samples(), &[50.0; 10][..]);
    assert_eq!(event.trailing_pad(), &[100.0; 3][..]);
    assert_eq!(event.baseline.mean, 100.0);
    assert_eq!(event.baseline.sd, 5.0);
    assert_eq!(event.sample_rate_hz, 10_000.0);
    assert!(event.persist_raw_series);
}

#[test]
fn test_short_excursion_rejected() {
    let samples = stream(&[(100.0, 20), (50.0, 3), (100.0, 20)]);
    let (events, summary) = segment(fixed_config(3, 5), samples);

    assert_eq!(summary.stats.accepted, 0);
    assert_eq!(summary.stats.rejected, 1);
    assert_eq!(summary.stats.processed, 0);
    assert!(events.is_empty());
}

#[test]
fn test_rejected_run_clears_look_behind() {
    // The second event's look-behind must not reach back into the first.
    // The first 100 after the short run ends it and is not observed again.
    let samples = stream(&[(100.0, 10), (50.0, 3), (100.0, 2), (40.0, 6), (100.0, 10)]);
    let (events, summary) = segment(fixed_config(5, 5), samples);

    assert_eq!(summary.stats.rejected, 1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].lead_pad(), &[100.0, 40.0][..]);
    assert_eq!(events[0].start_offset, 3);
    assert_eq!(events[0].run_length(), 6);
}

#[test]
fn test_trailing_pad_excludes_second_excursion() {
    let samples = stream(&[(100.0, 10), (50.0, 10), (100.0, 2), (50.0, 10), (100.0, 10)]);
    let (events, summary) = segment(fixed_config(5, 5), samples);

    assert_eq!(summary.stats.accepted, 2);

    let first = &events[0];
    assert_eq!(first.trailing_pad(), &[100.0, 100.0][..]);
    assert!(first
        .trailing_pad()
        .iter()
        .all(|s| (s.abs() - 100.0).abs() <= 7.5));
    assert_eq!(first.samples.len(), 5 + 10 + 2);

    // The pad window was only peeked, so the second excursion is its own event.
    let second = &events[1];
    assert_eq!(second.run_length(), 10);
    assert_eq!(second.lead_pad(), &[100.0, 50.0][..]);
    assert!(second.absolute_start_index > first.absolute_start_index);
}

#[test]
fn test_trailing_pad_drops_spikes() {
    let samples = stream(&[(100.0, 10), (50.0, 6), (100.0, 1), (140.0, 1), (100.0, 10)]);
    let (events, _) = segment(fixed_config(4, 5), samples);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].trailing_pad(), &[100.0, 100.0, 100.0][..]);
}

#[test]
fn test_invariants_on_noisy_trace() {
    let config = fixed_config(50, 5);
    let (events, summary) = segment(config.clone(), noisy_trace(0x5eed, 200_000));

    assert!(summary.stats.accepted > 0);
    assert_eq!(summary.stats.accepted as usize, events.len());
    assert_eq!(summary.stats.processed, summary.stats.accepted);

    let mut last_start = i64::MIN;
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64 + 1);
        assert!(event.run_length() >= config.min_event_length);
        assert!(1 <= event.start_offset);
        assert!(event.start_offset <= event.end_offset);
        assert!(event.end_offset <= event.samples.len());
        assert!(event.lead_pad().len() <= config.pad_length);
        assert!(event.trailing_pad().len() <= config.pad_length);
        assert!(event.absolute_start_index > last_start);
        last_start = event.absolute_start_index;
    }
}

#[test]
fn test_deterministic_boundaries() {
    let samples = noisy_trace(42, 100_000);
    let (first, first_summary) = segment(fixed_config(20, 5), samples.clone());
    let (second, second_summary) = segment(fixed_config(20, 5), samples);

    let boundaries = |events: &[EventRecord]| {
        events
            .iter()
            .map(|e| (e.absolute_start_index, e.start_offset, e.end_offset, e.samples.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(boundaries(&first), boundaries(&second));
    assert_eq!(first_summary.stats, second_summary.stats);
}

#[test]
fn test_degenerate_threshold_does_not_panic() {
    let config = SegmentConfig {
        threshold_sigma: 50.0,
        ..fixed_config(10, 5)
    };
    let (events, summary) = segment(config, noisy_trace(7, 10_000));

    assert!(events.is_empty());
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.samples_consumed, 10_000);
}

#[test]
fn test_zero_pad_uses_global_baseline() {
    let samples = stream(&[(100.0, 10), (50.0, 8), (100.0, 10)]);
    let (events, _) = segment(fixed_config(0, 5), samples);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].start_offset, 1);
    assert_eq!(events[0].end_offset, 9);
    assert_eq!(events[0].samples.len(), 8);
}

#[test]
fn test_event_at_stream_start() {
    let samples = stream(&[(50.0, 10), (100.0, 10)]);
    let (events, _) = segment(fixed_config(3, 5), samples);

    // Local baseline is the lone trigger sample, so the run ends at once.
    assert!(events.is_empty());
}

#[test]
fn test_settings_snapshot_travels_with_event() {
    let mut settings = AlgorithmSettings::new();
    settings.insert("fitIters".into(), serde_json::json!(5000));

    let recorder = Arc::new(Recorder::default());
    let mut segmenter = EventSegmenter::with_settings(
        SegmentConfig {
            write_event_ts: false,
            ..fixed_config(3, 5)
        },
        settings,
        MemorySource::new(stream(&[(100.0, 10), (50.0, 10), (100.0, 10)]), 1_000.0),
        InlineDispatcher::new(Arc::clone(&recorder)),
    )
    .unwrap();
    segmenter.run().unwrap();

    let events = recorder.take();
    assert_eq!(events[0].settings["fitIters"], 5000);
    assert!(!events[0].persist_raw_series);
}

#[test]
fn test_default_config_tolerates_partial_tail_window() {
    // Two full one-second windows plus three samples at 1 kHz.
    let recorder = Arc::new(Recorder::default());
    let mut segmenter = EventSegmenter::with_settings(
        SegmentConfig::default(),
        AlgorithmSettings::new(),
        MemorySource::new(noisy_baseline(11, 2003), 1_000.0),
        InlineDispatcher::new(Arc::clone(&recorder)),
    )
    .unwrap();
    let summary = segmenter.run().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.samples_consumed, 2003);
    assert_eq!(summary.drift.blocks, 2);
    assert!(recorder.take().is_empty());
}

#[test]
fn test_default_config_with_chunked_channel() {
    let (sender, source) = ChannelSource::with_capacity(4, 1_000.0);
    let producer = thread::spawn(move || {
        for chunk in noisy_baseline(23, 5000).chunks(50) {
            sender.send(chunk.to_vec()).unwrap();
        }
    });

    let recorder = Arc::new(Recorder::default());
    let mut segmenter = EventSegmenter::with_settings(
        SegmentConfig::default(),
        AlgorithmSettings::new(),
        source,
        InlineDispatcher::new(Arc::clone(&recorder)),
    )
    .unwrap();
    let summary = segmenter.run().unwrap();
    producer.join().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.samples_consumed, 5000);
    assert_eq!(summary.drift.blocks, 5);
    let baseline = summary.baseline.unwrap();
    assert!((baseline.mean - 100.0).abs() < 1.0);
    assert!(summary.drift.max_slope.unwrap().abs() < 2.0);
    assert!(recorder.take().is_empty());
}

#[test]
fn test_worker_pool_dispatch() {
    let recorder = Arc::new(Recorder::default());
    let pool = WorkerPool::spawn(recorder.clone(), 4, 8).unwrap();
    assert_eq!(pool.worker_count(), 4);

    let mut segmenter = EventSegmenter::with_settings(
        fixed_config(20, 5),
        AlgorithmSettings::new(),
        MemorySource::new(noisy_trace(99, 100_000), 10_000.0),
        pool,
    )
    .unwrap();
    let summary = segmenter.run().unwrap();

    let stats: DispatchStats = segmenter.into_dispatcher().shutdown();
    assert_eq!(stats.dispatched, summary.stats.accepted);
    assert_eq!(stats.processed, summary.stats.accepted);
    assert_eq!(stats.failed, 0);

    let mut sequences: Vec<u64> = recorder.take().iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=summary.stats.accepted).collect();
    assert_eq!(sequences, expected);
}

#[test]
fn test_failing_processor_does_not_stop_run() {
    struct Failing;

    impl EventProcessor for Failing {
        fn process(&self, _event: EventRecord) -> Result<(), ProcessError> {
            Err(ProcessError::Failed("fit did not converge".into()))
        }
    }

    let mut segmenter = EventSegmenter::with_settings(
        fixed_config(3, 5),
        AlgorithmSettings::new(),
        MemorySource::new(
            stream(&[(100.0, 10), (50.0, 10), (100.0, 10), (50.0, 10), (100.0, 10)]),
            1_000.0,
        ),
        InlineDispatcher::new(Failing),
    )
    .unwrap();
    let summary = segmenter.run().unwrap();

    assert_eq!(summary.stats.accepted, 2);
    assert_eq!(summary.stats.processed, 0);
    assert_eq!(segmenter.dispatcher().stats().failed, 2);
}

#[test]
fn test_channel_source_stream() {
    let (sender, source) = ChannelSource::with_capacity(2, 1_000.0);
    let producer = thread::spawn(move || {
        for block in stream(&[(100.0, 30), (50.0, 10), (100.0, 30)]).chunks(7) {
            sender.send(block.to_vec()).unwrap();
        }
    });

    let recorder = Arc::new(Recorder::default());
    let mut segmenter = EventSegmenter::with_settings(
        fixed_config(5, 5),
        AlgorithmSettings::new(),
        source,
        InlineDispatcher::new(Arc::clone(&recorder)),
    )
    .unwrap();
    let summary = segmenter.run().unwrap();
    producer.join().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.samples_consumed, 70);
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].run_length(), 10);
    assert_eq!(segmenter.dispatcher().processed_count(), 1);
}

#[test]
fn test_cancel_from_processor() {
    struct CancelOnFirst(pore_segmenter::CancelHandle);

    impl EventProcessor for CancelOnFirst {
        fn process(&self, _event: EventRecord) -> Result<(), ProcessError> {
            self.0.cancel();
            Ok(())
        }
    }

    let handle = pore_segmenter::CancelHandle::new();
    let samples = stream(&[(100.0, 10), (50.0, 10), (100.0, 10), (50.0, 10), (100.0, 10)]);
    let mut segmenter = EventSegmenter::with_settings(
        fixed_config(3, 5),
        AlgorithmSettings::new(),
        MemorySource::new(samples, 1_000.0),
        InlineDispatcher::new(CancelOnFirst(handle.clone())),
    )
    .unwrap();

    // Wire the processor's handle to the segmenter's flag.
    let segmenter_handle = segmenter.cancel_handle();
    let watcher = thread::spawn(move || {
        while !handle.is_cancelled() {
            thread::yield_now();
        }
        segmenter_handle.cancel();
    });

    let summary = segmenter.run().unwrap();
    watcher.join().unwrap();

    assert!(summary.stats.accepted >= 1);
    assert!(matches!(
        summary.stop_reason,
        StopReason::Cancelled | StopReason::Exhausted
    ));
}
