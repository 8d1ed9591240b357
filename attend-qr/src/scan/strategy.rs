//! Camera and detection strategy seams
//!
//! Two interchangeable strategies feed detected text into the scan loop:
//! - [`NativePollStrategy`] polls a platform detector against the current
//!   frame on a fixed interval
//! - [`FallbackDecoderStrategy`] lazily loads a software decoder that runs
//!   its own continuous loop and reports through a callback sink
//!
//! One is chosen when scanning starts; the rest of the loop does not care which.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ScanError;

/// A single captured video frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Luma plane, row-major
    pub data: Arc<[u8]>,
}

/// Live camera stream held by a scan session
pub trait VideoStream: Send + Sync {
    /// Most recent frame, if one has been captured
    fn current_frame(&self) -> Option<Frame>;

    fn is_live(&self) -> bool;

    /// Stop capture and hand the device back; must be idempotent
    fn release(&self);
}

/// Camera acquisition; may wait on a user or platform permission prompt
#[async_trait]
pub trait Camera: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn VideoStream>, ScanError>;
}

/// Single-frame detection failure
#[derive(Debug, Error)]
pub enum DetectError {
    /// Nothing readable in this frame; keep polling
    #[error("Frame not decodable: {0}")]
    Transient(String),

    /// The detector cannot continue
    #[error("Detector failed: {0}")]
    Fatal(String),
}

/// Platform-native, zero-dependency code detection against one frame
#[async_trait]
pub trait NativeDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<String>, DetectError>;
}

/// Software decoder running its own continuous loop
pub trait ContinuousDecoder: Send {
    /// Begin decoding from `stream`, reporting every read through `sink`
    fn start(&mut self, stream: Arc<dyn VideoStream>, sink: DetectionSink) -> Result<(), ScanError>;

    /// End the decoder's loop; must be idempotent
    fn stop(&mut self);
}

/// Lazily loads the software fallback decoder
#[async_trait]
pub trait DecoderLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn ContinuousDecoder>, ScanError>;
}

/// Message from a strategy to the scan loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Text(String),
    Fatal(String),
}

/// Callback handle through which strategies report detections
#[derive(Debug, Clone)]
pub struct DetectionSink {
    tx: mpsc::UnboundedSender<Detection>,
}

impl DetectionSink {
    pub fn new(tx: mpsc::UnboundedSender<Detection>) -> Self {
        Self { tx }
    }

    /// Report detected text; returns false once the scan loop is gone
    pub fn detected(&self, text: impl Into<String>) -> bool {
        self.tx.send(Detection::Text(text.into())).is_ok()
    }

    /// Report an unrecoverable decode failure
    pub fn fatal(&self, message: impl Into<String>) {
        let _ = self.tx.send(Detection::Fatal(message.into()));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Common shape of both detection strategies
#[async_trait]
pub trait DetectionStrategy: Send {
    fn name(&self) -> &'static str;

    async fn start(&mut self, stream: Arc<dyn VideoStream>, sink: DetectionSink) -> Result<(), ScanError>;

    /// Release the strategy's timer or decoder; must be idempotent
    fn stop(&mut self);
}

/// Polls a native detector on a fixed interval
pub struct NativePollStrategy {
    detector: Arc<dyn NativeDetector>,
    interval: Duration,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl NativePollStrategy {
    pub fn new(detector: Arc<dyn NativeDetector>, interval: Duration) -> Self {
        Self {
            detector,
            interval,
            cancel: None,
            task: None,
        }
    }
}

async fn poll_loop(
    detector: Arc<dyn NativeDetector>,
    stream: Arc<dyn VideoStream>,
    sink: DetectionSink,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !stream.is_live() {
            sink.fatal("video stream ended");
            break;
        }
        let Some(frame) = stream.current_frame() else {
            continue;
        };

        match detector.detect(&frame).await {
            Ok(texts) => {
                for text in texts {
                    if !sink.detected(text) {
                        return;
                    }
                }
            }
            Err(DetectError::Transient(reason)) => {
                debug!("Native detector skipped frame: {}", reason);
            }
            Err(DetectError::Fatal(reason)) => {
                sink.fatal(reason);
                break;
            }
        }
    }
}

#[async_trait]
impl DetectionStrategy for NativePollStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn start(&mut self, stream: Arc<dyn VideoStream>, sink: DetectionSink) -> Result<(), ScanError> {
        self.stop();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.detector),
            stream,
            sink,
            self.interval,
            cancel.clone(),
        ));

        info!("Native detector polling every {:?}", self.interval);
        self.cancel = Some(cancel);
        self.task = Some(task);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NativePollStrategy {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs a lazily loaded software decoder
pub struct FallbackDecoderStrategy {
    loader: Arc<dyn DecoderLoader>,
    decoder: Option<Box<dyn ContinuousDecoder>>,
}

impl FallbackDecoderStrategy {
    pub fn new(loader: Arc<dyn DecoderLoader>) -> Self {
        Self {
            loader,
            decoder: None,
        }
    }
}

#[async_trait]
impl DetectionStrategy for FallbackDecoderStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn start(&mut self, stream: Arc<dyn VideoStream>, sink: DetectionSink) -> Result<(), ScanError> {
        self.stop();

        let mut decoder = self.loader.load().await?;
        if let Err(e) = decoder.start(stream, sink) {
            decoder.stop();
            return Err(e);
        }

        info!("Fallback decoder started");
        self.decoder = Some(decoder);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.stop();
        }
    }
}

impl Drop for FallbackDecoderStrategy {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Detection capabilities available on this platform
///
/// The native detector is preferred; the fallback is only loaded when no
/// native capability exists.
#[derive(Clone)]
pub struct DetectorSet {
    pub native: Option<Arc<dyn NativeDetector>>,
    pub fallback: Option<Arc<dyn DecoderLoader>>,
    pub poll_interval: Duration,
}

impl DetectorSet {
    pub fn native(detector: Arc<dyn NativeDetector>, poll_interval: Duration) -> Self {
        Self {
            native: Some(detector),
            fallback: None,
            poll_interval,
        }
    }

    pub fn fallback(loader: Arc<dyn DecoderLoader>) -> Self {
        Self {
            native: None,
            fallback: Some(loader),
            poll_interval: Duration::from_millis(attend_common::config::DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Poll interval for a native detector (`[scan] poll_interval_ms`)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Choose the strategy for one scan lifecycle
    pub fn select(&self) -> Result<Box<dyn DetectionStrategy>, ScanError> {
        if let Some(detector) = &self.native {
            return Ok(Box::new(NativePollStrategy::new(
                Arc::clone(detector),
                self.poll_interval,
            )));
        }
        if let Some(loader) = &self.fallback {
            return Ok(Box::new(FallbackDecoderStrategy::new(Arc::clone(loader))));
        }
        Err(ScanError::NoDetector)
    }
}
