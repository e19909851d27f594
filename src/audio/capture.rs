//! Voice-sample capture.
//!
//! [`AudioDevice`] is the seam to the hardware: `open(format)` yields an
//! [`InputStream`] that is `read` block by block and `close`d.  Two devices
//! ship with the crate:
//!
//! * [`CpalDevice`]: the system default input via `cpal`.  The cpal stream
//!   is not `Send`, so it lives on a dedicated `audio-capture` thread that
//!   forwards sample blocks over an mpsc channel; closing the stream stops
//!   and joins that thread.
//! * [`PlaybackDevice`]: replays a pre-recorded buffer, then silence.
//!
//! [`AudioCapture`] enforces exclusivity: only one [`CaptureSession`] may be
//! open at a time; a second `open` fails with `DeviceUnavailable`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::watch;

use crate::audio::{f32_to_i16, rms_level, AudioBuffer, AudioFormat};
use crate::error::{Result, VoiceError};

/// How long a cpal read waits for the next block before reporting an empty
/// one, so cancellation is observed promptly.
const READ_POLL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Device seam
// ---------------------------------------------------------------------------

/// An input device that can be opened with a requested format.
pub trait AudioDevice: Send + Sync {
    /// Open an input stream.
    ///
    /// # Errors
    ///
    /// [`VoiceError::DeviceUnavailable`] when no device exists or `format`
    /// is not supported.
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn InputStream>>;
}

/// An open input stream.  Samples are interleaved 16-bit PCM in the format
/// the stream was opened with.
pub trait InputStream: Send {
    /// Next block of samples.  May return an empty block when nothing
    /// arrived within a short poll interval.
    fn read(&mut self) -> Result<Vec<i16>>;

    /// Stop the stream and release the device.  Idempotent.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// CaptureLevel
// ---------------------------------------------------------------------------

/// Live monitoring sample emitted while recording.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureLevel {
    /// Recorded time so far, in seconds.
    pub elapsed_secs: f32,
    /// RMS of the most recent block relative to full scale (`0.0..=1.0`).
    pub volume: f32,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Owner of the process-wide input device.
pub struct AudioCapture {
    device: Arc<dyn AudioDevice>,
    busy: Arc<AtomicBool>,
    level_interval: Duration,
}

impl AudioCapture {
    pub fn new(device: Arc<dyn AudioDevice>, level_interval: Duration) -> Self {
        Self {
            device,
            busy: Arc::new(AtomicBool::new(false)),
            level_interval,
        }
    }

    /// Returns `true` while a session is open.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Open a capture session.
    ///
    /// # Errors
    ///
    /// [`VoiceError::DeviceUnavailable`] when another session is active, or
    /// when the device rejects `format`.
    pub fn open(&self, format: AudioFormat) -> Result<CaptureSession> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceError::DeviceUnavailable(
                "another capture session is already active".into(),
            ));
        }
        let guard = DeviceGuard(Arc::clone(&self.busy));
        let stream = self.device.open(&format)?;
        log::debug!(
            "capture session opened ({} Hz, {} ch, {}-bit)",
            format.sample_rate,
            format.channels,
            format.bits_per_sample
        );
        Ok(CaptureSession {
            stream: Some(stream),
            format,
            cancel: CancelHandle::default(),
            level_interval: self.level_interval,
            _guard: guard,
        })
    }
}

/// Clears the busy flag when the session (or a failed open) goes away.
struct DeviceGuard(Arc<AtomicBool>);

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// CancelHandle
// ---------------------------------------------------------------------------

/// Cloneable signal that stops an in-progress capture.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// An open, exclusive recording session.
pub struct CaptureSession {
    stream: Option<Box<dyn InputStream>>,
    format: AudioFormat,
    cancel: CancelHandle,
    level_interval: Duration,
    _guard: DeviceGuard,
}

impl CaptureSession {
    /// Handle that can stop [`capture`](Self::capture) from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Record until `bound` elapses or the session is cancelled.
    ///
    /// Blocking; run it on a dedicated worker.  Level updates, if a sender
    /// is given, are published every `level_interval` of recorded audio.
    /// The device is closed before this returns, on every path.
    ///
    /// # Errors
    ///
    /// [`VoiceError::RecordingInterrupted`] when the device fails
    /// mid-capture or nothing was recorded.
    pub fn capture(
        mut self,
        bound: Duration,
        levels: Option<&watch::Sender<CaptureLevel>>,
    ) -> Result<AudioBuffer> {
        let mut stream = self.stream.take().ok_or_else(|| {
            VoiceError::RecordingInterrupted("capture session already consumed".into())
        })?;

        let rate = self.format.sample_rate.max(1) as f64;
        let channels = self.format.channels.max(1) as usize;
        let max_samples = (bound.as_secs_f64() * rate).round() as usize * channels;
        let level_every =
            ((self.level_interval.as_secs_f64() * rate).round() as usize).max(1) * channels;

        let started = Instant::now();
        // Reserve at most a minute up front; longer takes grow on demand.
        let mut recorded: Vec<i16> =
            Vec::with_capacity(max_samples.min(rate as usize * channels * 60));
        let mut next_level = level_every;

        while recorded.len() < max_samples {
            if self.cancel.is_cancelled() {
                log::debug!("capture cancelled after {} samples", recorded.len());
                break;
            }
            if started.elapsed() >= bound {
                break;
            }
            let block = match stream.read() {
                Ok(block) => block,
                Err(err) => {
                    stream.close();
                    log::error!("capture failed: {err}");
                    return Err(match err {
                        VoiceError::RecordingInterrupted(_) => err,
                        other => VoiceError::RecordingInterrupted(other.to_string()),
                    });
                }
            };
            if block.is_empty() {
                continue;
            }
            let take = block.len().min(max_samples - recorded.len());
            recorded.extend_from_slice(&block[..take]);

            if let Some(tx) = levels {
                if recorded.len() >= next_level {
                    tx.send_replace(CaptureLevel {
                        elapsed_secs: (recorded.len() / channels) as f32 / rate as f32,
                        volume: rms_level(&block[..take]),
                    });
                    next_level = recorded.len() + level_every;
                }
            }
        }
        stream.close();

        if recorded.is_empty() {
            return Err(VoiceError::RecordingInterrupted(
                "no audio was captured".into(),
            ));
        }

        let samples = if channels > 1 {
            recorded
                .chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        } else {
            recorded
        };
        Ok(AudioBuffer::mono(samples, self.format.sample_rate))
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// System default input device via `cpal`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevice;

impl CpalDevice {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDevice for CpalDevice {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn InputStream>> {
        if format.bits_per_sample != 16 {
            return Err(VoiceError::DeviceUnavailable(format!(
                "{}-bit capture is not supported",
                format.bits_per_sample
            )));
        }

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<i16>>();
        let (err_tx, err_rx) = mpsc::channel::<String>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let format = *format;

        let worker = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_cpal_stream(&format, sample_tx, err_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Hold the stream until asked to stop (or the owner vanished).
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::DeviceUnavailable(format!("capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                samples: sample_rx,
                errors: err_rx,
                stop: Some(stop_tx),
                worker: Some(worker),
            })),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(VoiceError::DeviceUnavailable(
                    "capture thread exited before the stream started".into(),
                ))
            }
        }
    }
}

fn build_cpal_stream(
    format: &AudioFormat,
    sample_tx: mpsc::Sender<Vec<i16>>,
    err_tx: mpsc::Sender<String>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("no input device found".into()))?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?
        .find(|range| {
            range.channels() == format.channels
                && range.min_sample_rate().0 <= format.sample_rate
                && range.max_sample_rate().0 >= format.sample_rate
                && matches!(
                    range.sample_format(),
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16
                )
        })
        .ok_or_else(|| {
            VoiceError::DeviceUnavailable(format!(
                "device does not support {} Hz / {} ch",
                format.sample_rate, format.channels
            ))
        })?
        .with_sample_rate(cpal::SampleRate(format.sample_rate));

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let on_error = move |err: cpal::StreamError| {
        log::error!("cpal stream error: {err}");
        let _ = err_tx.send(err.to_string());
    };

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // Ignore send errors; the reader may already be gone.
                let _ = sample_tx.send(data.to_vec());
            },
            on_error,
            None,
        ),
        _ => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = sample_tx.send(data.iter().map(|&s| f32_to_i16(s)).collect());
            },
            on_error,
            None,
        ),
    }
    .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

/// Reader half of a cpal stream running on the `audio-capture` thread.
struct CpalStream {
    samples: mpsc::Receiver<Vec<i16>>,
    errors: mpsc::Receiver<String>,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl InputStream for CpalStream {
    fn read(&mut self) -> Result<Vec<i16>> {
        if let Ok(message) = self.errors.try_recv() {
            return Err(VoiceError::RecordingInterrupted(message));
        }
        match self.samples.recv_timeout(READ_POLL) {
            Ok(block) => Ok(block),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(VoiceError::RecordingInterrupted(
                "input stream closed unexpectedly".into(),
            )),
        }
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("audio-capture thread panicked during shutdown");
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// PlaybackDevice
// ---------------------------------------------------------------------------

/// Replays a pre-recorded buffer as if it were a microphone, followed by
/// silence.  Only the buffer's own format can be opened.
#[derive(Debug, Clone)]
pub struct PlaybackDevice {
    buffer: Arc<AudioBuffer>,
    block: usize,
}

impl PlaybackDevice {
    pub fn new(buffer: AudioBuffer) -> Self {
        let block = (buffer.sample_rate as usize / 100).max(1);
        Self {
            buffer: Arc::new(buffer),
            block,
        }
    }
}

impl AudioDevice for PlaybackDevice {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn InputStream>> {
        if *format != self.buffer.format() {
            return Err(VoiceError::DeviceUnavailable(format!(
                "playback device only supports {} Hz / {} ch / 16-bit",
                self.buffer.sample_rate, self.buffer.channels
            )));
        }
        Ok(Box::new(PlaybackStream {
            buffer: Arc::clone(&self.buffer),
            pos: 0,
            block: self.block,
            open: true,
        }))
    }
}

struct PlaybackStream {
    buffer: Arc<AudioBuffer>,
    pos: usize,
    block: usize,
    open: bool,
}

impl InputStream for PlaybackStream {
    fn read(&mut self) -> Result<Vec<i16>> {
        if !self.open {
            return Err(VoiceError::RecordingInterrupted("stream closed".into()));
        }
        let samples = &self.buffer.samples;
        if self.pos >= samples.len() {
            return Ok(vec![0; self.block]);
        }
        let end = (self.pos + self.block).min(samples.len());
        let block = samples[self.pos..end].to_vec();
        self.pos = end;
        Ok(block)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Scripted device for unit tests: serves fixed blocks, optionally fails
/// after a number of reads, and records whether it was closed.
#[cfg(test)]
pub struct ScriptedDevice {
    pub format: AudioFormat,
    pub block: Vec<i16>,
    pub fail_after: Option<usize>,
    pub read_delay: Duration,
    pub closed: Arc<AtomicBool>,
}

#[cfg(test)]
impl ScriptedDevice {
    pub fn new(format: AudioFormat, block: Vec<i16>) -> Self {
        Self {
            format,
            block,
            fail_after: None,
            read_delay: Duration::ZERO,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
impl AudioDevice for ScriptedDevice {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn InputStream>> {
        if *format != self.format {
            return Err(VoiceError::DeviceUnavailable("format not supported".into()));
        }
        self.closed.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            block: self.block.clone(),
            reads: 0,
            fail_after: self.fail_after,
            read_delay: self.read_delay,
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[cfg(test)]
struct ScriptedStream {
    block: Vec<i16>,
    reads: usize,
    fail_after: Option<usize>,
    read_delay: Duration,
    closed: Arc<AtomicBool>,
}

#[cfg(test)]
impl InputStream for ScriptedStream {
    fn read(&mut self) -> Result<Vec<i16>> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(VoiceError::RecordingInterrupted("device unplugged".into()));
        }
        self.reads += 1;
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        Ok(self.block.clone())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> AudioFormat {
        AudioFormat::mono16(16_000)
    }

    fn capture_with(device: ScriptedDevice) -> (AudioCapture, Arc<AtomicBool>) {
        let closed = Arc::clone(&device.closed);
        (
            AudioCapture::new(Arc::new(device), Duration::from_millis(50)),
            closed,
        )
    }

    #[test]
    fn captures_until_duration_bound() {
        let (capture, closed) = capture_with(ScriptedDevice::new(format(), vec![100; 160]));
        let session = capture.open(format()).unwrap();
        let buf = session.capture(Duration::from_millis(500), None).unwrap();

        assert_eq!(buf.len(), 8_000);
        assert_eq!(buf.sample_rate, 16_000);
        assert!(closed.load(Ordering::SeqCst), "device not released");
        assert!(!capture.is_busy());
    }

    #[test]
    fn unsupported_format_is_device_unavailable() {
        let (capture, _) = capture_with(ScriptedDevice::new(format(), vec![0; 160]));
        let err = capture.open(AudioFormat::mono16(44_100)).err().unwrap();
        assert!(matches!(err, VoiceError::DeviceUnavailable(_)));
        // A failed open must not leave the device marked busy.
        assert!(!capture.is_busy());
    }

    #[test]
    fn second_session_is_rejected() {
        let (capture, _) = capture_with(ScriptedDevice::new(format(), vec![0; 160]));
        let first = capture.open(format()).unwrap();
        let err = capture.open(format()).err().unwrap();
        assert!(matches!(err, VoiceError::DeviceUnavailable(_)));

        drop(first);
        assert!(capture.open(format()).is_ok());
    }

    #[test]
    fn failure_releases_device_and_interrupts() {
        let mut device = ScriptedDevice::new(format(), vec![5; 160]);
        device.fail_after = Some(3);
        let (capture, closed) = capture_with(device);

        let session = capture.open(format()).unwrap();
        let err = session.capture(Duration::from_secs(1), None).unwrap_err();

        assert!(matches!(err, VoiceError::RecordingInterrupted(_)), "{err}");
        assert!(closed.load(Ordering::SeqCst));
        assert!(!capture.is_busy());
    }

    #[test]
    fn cancel_stops_capture_early() {
        let mut device = ScriptedDevice::new(format(), vec![1; 160]);
        device.read_delay = Duration::from_millis(10);
        let (capture, closed) = capture_with(device);

        let session = capture.open(format()).unwrap();
        let cancel = session.cancel_handle();
        let worker = std::thread::spawn(move || session.capture(Duration::from_secs(30), None));
        std::thread::sleep(Duration::from_millis(60));
        cancel.cancel();

        let buf = worker.join().unwrap().unwrap();
        assert!(buf.len() < 16_000 * 30);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_any_audio_is_interrupted() {
        let (capture, _) = capture_with(ScriptedDevice::new(format(), vec![1; 160]));
        let session = capture.open(format()).unwrap();
        session.cancel_handle().cancel();
        let err = session.capture(Duration::from_secs(1), None).unwrap_err();
        assert!(matches!(err, VoiceError::RecordingInterrupted(_)));
    }

    #[test]
    fn level_updates_report_rms_and_elapsed() {
        let (capture, _) = capture_with(ScriptedDevice::new(format(), vec![16_384; 160]));
        let (tx, rx) = watch::channel(CaptureLevel::default());
        let session = capture.open(format()).unwrap();
        session
            .capture(Duration::from_millis(200), Some(&tx))
            .unwrap();

        let last = *rx.borrow();
        assert!((last.volume - 0.5).abs() < 1e-3, "volume {}", last.volume);
        assert!(last.elapsed_secs > 0.1 && last.elapsed_secs <= 0.2);
    }

    #[test]
    fn playback_device_replays_then_silence() {
        let source = AudioBuffer::mono(vec![7; 300], 1_000);
        let capture = AudioCapture::new(
            Arc::new(PlaybackDevice::new(source.clone())),
            Duration::from_millis(50),
        );
        let session = capture.open(source.format()).unwrap();
        let buf = session.capture(Duration::from_millis(500), None).unwrap();

        assert_eq!(buf.len(), 500);
        assert!(buf.samples[..300].iter().all(|&s| s == 7));
        assert!(buf.samples[300..].iter().all(|&s| s == 0));
    }
}
