// Capture path - feeds captured audio through the engine into the recording
//
// The audio callback only pushes samples into a lock-free ringbuffer. The
// recorder drains it into the active section under the recording lock,
// copies each complete window out, releases the lock for the inference call,
// then re-locks to record the analysed step.

use crate::analysis::engine::{EngineError, InferenceEngine};
use crate::timeline::recording::{Recording, TimelineError};
use crate::timeline::section::SectionId;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Split};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Recording shared between the capture path and foreground readers
pub type SharedRecording = Arc<Mutex<Recording>>;

pub type SampleProducer = ringbuf::HeapProd<f32>;
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Samples moved from the ringbuffer per lock acquisition
const DRAIN_CHUNK: usize = 4096;

pub fn create_sample_channel(capacity: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity);
    rb.split()
}

pub fn share(recording: Recording) -> SharedRecording {
    Arc::new(Mutex::new(recording))
}

/// Capture error types
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Recording lock poisoned")]
    LockPoisoned,

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Inference error: {0}")]
    Engine(#[from] EngineError),
}

fn lock(recording: &SharedRecording) -> Result<MutexGuard<'_, Recording>, CaptureError> {
    recording.lock().map_err(|_| CaptureError::LockPoisoned)
}

/// Drives capture and inference for one recording
pub struct Recorder {
    recording: SharedRecording,
    engine: InferenceEngine,
    samples: SampleConsumer,
    scratch: Vec<f32>,
}

impl Recorder {
    pub fn new(recording: SharedRecording, engine: InferenceEngine, samples: SampleConsumer) -> Self {
        Self {
            recording,
            engine,
            samples,
            scratch: vec![0.0; DRAIN_CHUNK],
        }
    }

    pub fn recording(&self) -> &SharedRecording {
        &self.recording
    }

    /// Open a new section to capture into
    pub fn start_section(&mut self) -> Result<SectionId, CaptureError> {
        Ok(lock(&self.recording)?.start_section()?)
    }

    /// Analyse everything available, then gather the active section
    pub fn finish_section(&mut self) -> Result<Option<SectionId>, CaptureError> {
        self.pump()?;
        Ok(lock(&self.recording)?.end_section())
    }

    /// Drain captured audio and analyse every complete window
    ///
    /// Returns the number of time steps recorded.
    pub fn pump(&mut self) -> Result<usize, CaptureError> {
        self.drain()?;

        let config = lock(&self.recording)?.config().clone();
        let mut recorded = 0;
        loop {
            let (id, step, mut primed, frame) = {
                let recording = lock(&self.recording)?;
                let Some(section) = recording.active_section() else {
                    break;
                };
                let Some(frame) = section.pending_frame(&config) else {
                    break;
                };
                (section.id(), section.len(), section.is_primed(), frame)
            };

            let analysed = self.engine.analyze(&frame, &mut primed);

            let mut recording = lock(&self.recording)?;
            match recording.section_by_id_mut(id) {
                Some(section) if !section.is_gathered() && section.len() == step => {
                    if primed {
                        section.mark_primed();
                    }
                    section.record_frame(analysed?, &config)?;
                    recorded += 1;
                }
                _ => {
                    log::warn!("Dropped frame {} of section {}: section changed", step, id);
                    break;
                }
            }
        }
        Ok(recorded)
    }

    /// Run `pump` on a background thread until `stop` is set and the
    /// ringbuffer is empty; the thread hands the recorder back when done
    pub fn spawn(
        mut self,
        stop: Arc<AtomicBool>,
        poll: Duration,
    ) -> JoinHandle<Result<Recorder, CaptureError>> {
        std::thread::spawn(move || {
            loop {
                let recorded = self.pump()?;
                if stop.load(Ordering::Acquire) && self.samples.is_empty() {
                    break;
                }
                if recorded == 0 {
                    std::thread::sleep(poll);
                }
            }
            self.pump()?;
            Ok(self)
        })
    }

    /// Move buffered samples into the active section
    fn drain(&mut self) -> Result<usize, CaptureError> {
        let mut moved = 0;
        loop {
            let count = self.samples.pop_slice(&mut self.scratch);
            if count == 0 {
                break;
            }
            let mut recording = lock(&self.recording)?;
            match recording.push_samples(&self.scratch[..count]) {
                Ok(_) => moved += count,
                Err(TimelineError::NoActiveSection) => {
                    log::debug!("Discarded {} samples captured outside a section", count);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::config::AnalysisConfig;
    use crate::analysis::engine::{InferenceOutput, PitchModel};
    use crate::timeline::tuning::Tuning;
    use ringbuf::traits::Producer;
    use std::sync::atomic::AtomicUsize;

    struct LoudnessModel {
        config: AnalysisConfig,
        primes: Arc<AtomicUsize>,
        fail_next: bool,
    }

    impl PitchModel for LoudnessModel {
        fn prime(&mut self, _initial_frame: &[f32]) -> Result<(), EngineError> {
            self.primes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn infer(&mut self, frame: &[f32]) -> Result<InferenceOutput, EngineError> {
            if std::mem::take(&mut self.fail_next) {
                return Err(EngineError::Inference("device busy".to_string()));
            }
            let level = frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len() as f32;
            let mut predictions = vec![0.0; self.config.pitch_count];
            predictions[0] = level;
            Ok(InferenceOutput {
                predictions,
                spectrum: vec![0.0; self.config.spectrum_bins],
                reconstruction: frame.to_vec(),
                power: level,
            })
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            frame_size: 16,
            stride: 8,
            padding: 8,
            pitch_count: 4,
            spectrum_bins: 9,
            ..AnalysisConfig::default()
        }
    }

    fn recorder(capacity: usize) -> (Recorder, SampleProducer, Arc<AtomicUsize>) {
        recorder_with(capacity, false)
    }

    fn recorder_with(
        capacity: usize,
        fail_next: bool,
    ) -> (Recorder, SampleProducer, Arc<AtomicUsize>) {
        let primes = Arc::new(AtomicUsize::new(0));
        let model = LoudnessModel {
            config: config(),
            primes: primes.clone(),
            fail_next,
        };
        let engine = InferenceEngine::new(Box::new(model), config());
        let recording = share(Recording::new("Capture", Tuning::default(), config()));
        let (producer, consumer) = create_sample_channel(capacity);
        (Recorder::new(recording, engine, consumer), producer, primes)
    }

    #[test]
    fn test_pump_analyses_complete_windows() {
        let (mut recorder, mut producer, primes) = recorder(1024);
        recorder.start_section().unwrap();

        producer.push_slice(&[1.0; 40]);
        assert_eq!(recorder.pump().unwrap(), 4);

        producer.push_slice(&[0.0; 4]);
        assert_eq!(recorder.pump().unwrap(), 0);
        producer.push_slice(&[0.0; 4]);
        assert_eq!(recorder.pump().unwrap(), 1);

        let recording = recorder.recording().lock().unwrap();
        let section = recording.section(0).unwrap();
        assert_eq!(section.len(), 5);
        assert_eq!(section.samples().len(), 48);
        assert_eq!(section.notes().len(), 1);
        // the fifth window is half ones, half zeros: still at the cutoff
        assert_eq!(section.notes()[0].duration, 5);
        assert_eq!(primes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_first_window_keeps_priming() {
        let (mut recorder, mut producer, primes) = recorder_with(1024, true);
        recorder.start_section().unwrap();

        producer.push_slice(&[1.0; 24]);
        assert!(matches!(
            recorder.pump(),
            Err(CaptureError::Engine(EngineError::Inference(_)))
        ));
        {
            let recording = recorder.recording().lock().unwrap();
            let section = recording.section(0).unwrap();
            assert!(section.is_primed());
            assert!(section.is_empty());
        }

        assert_eq!(recorder.pump().unwrap(), 2);
        assert_eq!(primes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_samples_outside_section_discarded() {
        let (mut recorder, mut producer, _) = recorder(1024);
        producer.push_slice(&[1.0; 32]);
        assert_eq!(recorder.pump().unwrap(), 0);

        recorder.start_section().unwrap();
        assert_eq!(recorder.pump().unwrap(), 0);
        let recording = recorder.recording().lock().unwrap();
        assert!(recording.section(0).unwrap().samples().is_empty());
    }

    #[test]
    fn test_each_section_primes_once() {
        let (mut recorder, mut producer, primes) = recorder(1024);
        for _ in 0..3 {
            recorder.start_section().unwrap();
            producer.push_slice(&[0.5; 64]);
            recorder.finish_section().unwrap();
        }
        assert_eq!(primes.load(Ordering::SeqCst), 3);

        let recording = recorder.recording().lock().unwrap();
        assert_eq!(recording.section_count(), 3);
        assert!(recording.sections().iter().all(|s| s.is_gathered()));
        assert!(recording.check_offsets().is_ok());
        assert_eq!(recording.total_time_steps(), 3 * 7);
    }

    #[test]
    fn test_background_thread_with_concurrent_reader() {
        let (mut recorder, mut producer, _) = recorder(256);
        recorder.start_section().unwrap();
        let shared = recorder.recording().clone();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = recorder.spawn(stop.clone(), Duration::from_millis(1));

        let writer = std::thread::spawn(move || {
            let mut remaining = 8 + 8 * 100;
            while remaining > 0 {
                let pushed = producer.push_slice(&vec![0.25; remaining.min(64)]);
                remaining -= pushed;
                if pushed == 0 {
                    std::thread::yield_now();
                }
            }
        });

        for _ in 0..50 {
            let recording = shared.lock().unwrap();
            if let Some(section) = recording.section(0) {
                assert!(section.samples().len() >= section.len() * 8);
            }
            drop(recording);
            std::thread::yield_now();
        }

        writer.join().unwrap();
        stop.store(true, Ordering::Release);
        let recorder = handle.join().unwrap().unwrap();

        let recording = recorder.recording().lock().unwrap();
        assert_eq!(recording.section(0).unwrap().len(), 100);
    }
}
