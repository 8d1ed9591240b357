//! Mock camera, scripted native detector and decoder loaders

use async_trait::async_trait;
use attend_qr::scan::wedge::LineDecoder;
use attend_qr::scan::{
    Camera, ContinuousDecoder, DecoderLoader, DetectError, Frame, NativeDetector, VideoStream,
};
use attend_qr::ScanError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Stream that always has a frame until released
pub struct MockStream {
    live: AtomicBool,
    releases: AtomicUsize,
}

impl MockStream {
    fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn is_released(&self) -> bool {
        !self.live.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl VideoStream for MockStream {
    fn current_frame(&self) -> Option<Frame> {
        self.is_live().then(|| Frame {
            width: 2,
            height: 2,
            data: Arc::from(vec![0u8; 4]),
        })
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }
}

enum Access {
    Granted,
    Denied,
}

/// Camera that grants or denies access and remembers every stream handed out
pub struct MockCamera {
    access: Access,
    streams: Mutex<Vec<Arc<MockStream>>>,
}

impl MockCamera {
    pub fn granted() -> Self {
        Self {
            access: Access::Granted,
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn denied() -> Self {
        Self {
            access: Access::Denied,
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn streams(&self) -> Vec<Arc<MockStream>> {
        self.streams.lock().unwrap().clone()
    }

    pub fn last_stream(&self) -> Arc<MockStream> {
        self.streams().last().cloned().expect("no stream acquired")
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn acquire(&self) -> Result<Arc<dyn VideoStream>, ScanError> {
        match self.access {
            Access::Denied => Err(ScanError::PermissionDenied),
            Access::Granted => {
                let stream = Arc::new(MockStream::new());
                self.streams.lock().unwrap().push(Arc::clone(&stream));
                Ok(stream)
            }
        }
    }
}

/// One poll's outcome
#[derive(Debug, Clone)]
pub enum Step {
    Read(&'static str),
    Nothing,
    Fail(&'static str),
}

/// Native detector replaying a script, one step per poll
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Step>>,
    polls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            polls: AtomicUsize::new(0),
        }
    }

    /// Reads each text on consecutive polls
    pub fn reading(texts: &[&'static str]) -> Self {
        Self::new(texts.iter().map(|t| Step::Read(*t)).collect())
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeDetector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<String>, DetectError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Read(text)) => Ok(vec![text.to_string()]),
            Some(Step::Fail(reason)) => Err(DetectError::Fatal(reason.to_string())),
            Some(Step::Nothing) | None => Ok(Vec::new()),
        }
    }
}

/// Fallback decoder reading fixed lines, then reporting end of input
pub struct ScriptedLoader {
    input: &'static [u8],
    loads: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new(input: &'static [u8]) -> Self {
        Self {
            input,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecoderLoader for ScriptedLoader {
    async fn load(&self) -> Result<Box<dyn ContinuousDecoder>, ScanError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LineDecoder::new(self.input)))
    }
}

/// Fallback decoder that cannot be loaded
pub struct FailingLoader;

#[async_trait]
impl DecoderLoader for FailingLoader {
    async fn load(&self) -> Result<Box<dyn ContinuousDecoder>, ScanError> {
        Err(ScanError::DecoderUnavailable("decoder module missing".to_string()))
    }
}
