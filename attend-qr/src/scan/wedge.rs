//! Keyboard-wedge input
//!
//! Hardware QR readers in keyboard mode "type" each decoded code followed by
//! Enter. The wedge camera stands in for a video device and the line decoder
//! is the continuous fallback decoder: every non-blank line read is one
//! detection. End of input is reported as fatal, which ends the lifecycle.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::strategy::{Camera, ContinuousDecoder, DecoderLoader, DetectionSink, Frame, VideoStream};
use super::ScanError;

/// Frameless stream that is live until released
#[derive(Debug)]
pub struct WedgeStream {
    live: AtomicBool,
}

impl WedgeStream {
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
        }
    }
}

impl Default for WedgeStream {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoStream for WedgeStream {
    fn current_frame(&self) -> Option<Frame> {
        None
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Camera backed by a keyboard-wedge reader; acquisition always succeeds
#[derive(Debug, Default)]
pub struct WedgeCamera;

#[async_trait]
impl Camera for WedgeCamera {
    async fn acquire(&self) -> Result<Arc<dyn VideoStream>, ScanError> {
        Ok(Arc::new(WedgeStream::new()))
    }
}

/// Continuous decoder reading one code per line
pub struct LineDecoder<R> {
    reader: Option<R>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<R> LineDecoder<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

async fn read_lines<R>(reader: R, stream: Arc<dyn VideoStream>, sink: DetectionSink, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next_line() => next,
        };

        if !stream.is_live() {
            return;
        }

        match next {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("Wedge read {} chars", line.len());
                if !sink.detected(line) {
                    return;
                }
            }
            Ok(None) => {
                sink.fatal("input closed");
                return;
            }
            Err(e) => {
                sink.fatal(format!("input read failed: {}", e));
                return;
            }
        }
    }
}

impl<R> ContinuousDecoder for LineDecoder<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn start(&mut self, stream: Arc<dyn VideoStream>, sink: DetectionSink) -> Result<(), ScanError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| ScanError::DecoderUnavailable("input already consumed".to_string()))?;

        self.task = Some(tokio::spawn(read_lines(reader, stream, sink, self.cancel.clone())));
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Loads a line decoder over the process's standard input
#[derive(Debug, Default)]
pub struct StdinDecoderLoader;

#[async_trait]
impl DecoderLoader for StdinDecoderLoader {
    async fn load(&self) -> Result<Box<dyn ContinuousDecoder>, ScanError> {
        Ok(Box::new(LineDecoder::new(tokio::io::stdin())))
    }
}
