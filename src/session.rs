//! Capture session: the pipeline that connects one device input to the
//! photo output and preview layers.

use crate::errors::CameraError;
use crate::output::PhotoOutput;
use crate::platform::CaptureDevice;
use crate::types::CameraFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

const STREAM_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wraps a device for attachment to a session.
#[derive(Debug)]
pub struct DeviceInput {
    id: Uuid,
    device: Arc<dyn CaptureDevice>,
}

impl DeviceInput {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Result<Self, CameraError> {
        if !device.is_connected() {
            return Err(CameraError::InitializationError(format!(
                "{} is not connected",
                device.info().name
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            device,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &Arc<dyn CaptureDevice> {
        &self.device
    }
}

struct SlotState {
    frame: Option<CameraFrame>,
    generation: u64,
    closed: bool,
}

/// Most recent frame produced by a running session.
///
/// Only the latest frame is kept; readers that fall behind skip frames.
pub struct FrameSlot {
    state: Mutex<SlotState>,
    cv: Condvar,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: None,
                generation: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, frame: CameraFrame) {
        let mut state = self.lock();
        state.frame = Some(frame);
        state.generation = state.generation.wrapping_add(1);
        state.closed = false;
        self.cv.notify_all();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.cv.notify_all();
    }

    pub fn latest(&self) -> Option<CameraFrame> {
        self.lock().frame.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wait for a frame published after `generation`. Returns `None` on
    /// timeout or when the stream has failed.
    pub fn wait_newer(&self, generation: u64, timeout: Duration) -> Option<(u64, CameraFrame)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.generation != generation {
                if let Some(frame) = &state.frame {
                    return Some((state.generation, frame.clone()));
                }
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartGate {
    Waiting,
    Opened,
    Abandoned,
}

#[derive(Default)]
struct SessionInner {
    inputs: Vec<Arc<DeviceInput>>,
    outputs: Vec<Arc<PhotoOutput>>,
    capture_thread: Option<JoinHandle<()>>,
}

/// Coordinates camera inputs and outputs.
pub struct CaptureSession {
    id: Uuid,
    inner: Mutex<SessionInner>,
    frames: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    open_timeout: Duration,
}

impl CaptureSession {
    pub fn new() -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(SessionInner::default()),
            frames: Arc::new(FrameSlot::new()),
            running: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            open_timeout: STREAM_OPEN_TIMEOUT,
        };
        log::debug!("Created capture session {}", session.id);
        session
    }

    /// How long `start_running` waits for the input's stream to open.
    pub fn with_stream_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// A session carries a single video input, from a connected device.
    pub fn can_add_input(&self, input: &DeviceInput) -> bool {
        self.lock().inputs.is_empty() && input.device().is_connected()
    }

    pub fn add_input(&self, input: Arc<DeviceInput>) -> Result<(), CameraError> {
        let mut inner = self.lock();
        if !inner.inputs.is_empty() || !input.device().is_connected() {
            return Err(CameraError::InitializationError(format!(
                "session {} cannot accept input for {}",
                self.id,
                input.device().info().name
            )));
        }
        log::debug!(
            "Session {} added input {} ({})",
            self.id,
            input.id(),
            input.device().info().name
        );
        inner.inputs.push(input);
        Ok(())
    }

    /// A session carries a single photo output.
    pub fn can_add_output(&self, _output: &PhotoOutput) -> bool {
        self.lock().outputs.is_empty()
    }

    pub fn add_output(&self, output: Arc<PhotoOutput>) -> Result<(), CameraError> {
        let mut inner = self.lock();
        if !inner.outputs.is_empty() {
            return Err(CameraError::InitializationError(format!(
                "session {} cannot accept another photo output",
                self.id
            )));
        }
        output.attach(self.frames.clone());
        log::debug!("Session {} added photo output {}", self.id, output.id());
        inner.outputs.push(output);
        Ok(())
    }

    pub fn inputs(&self) -> Vec<Arc<DeviceInput>> {
        self.lock().inputs.clone()
    }

    pub fn outputs(&self) -> Vec<Arc<PhotoOutput>> {
        self.lock().outputs.clone()
    }

    pub fn frames(&self) -> &Arc<FrameSlot> {
        &self.frames
    }

    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.frames.latest()
    }

    /// Start frame delivery. Returns once the input's stream has opened.
    pub fn start_running(&self) -> Result<(), CameraError> {
        let mut inner = self.lock();
        if self.is_running() {
            return Err(CameraError::StreamError(format!(
                "session {} is already running",
                self.id
            )));
        }

        // A previous run may have ended on a stream error.
        if let Some(handle) = inner.capture_thread.take() {
            let _ = handle.join();
        }

        let Some(input) = inner.inputs.first().cloned() else {
            log::warn!("Session {} started without inputs", self.id);
            self.running.store(true, Ordering::Release);
            return Ok(());
        };

        self.stop_flag.store(false, Ordering::Release);
        let (open_tx, open_rx) = crossbeam_channel::bounded(1);
        let device = input.device().clone();
        let frames = self.frames.clone();
        let running = self.running.clone();
        let stop_flag = self.stop_flag.clone();
        let gate = Arc::new(Mutex::new(StartGate::Waiting));
        let thread_gate = gate.clone();

        let handle = std::thread::Builder::new()
            .name("camera-controller-capture".to_string())
            .spawn(move || capture_loop(device, frames, running, stop_flag, thread_gate, open_tx))
            .map_err(|e| CameraError::StreamError(format!("spawn failed: {e}")))?;

        match open_rx.recv_timeout(self.open_timeout) {
            Ok(Ok(())) => {
                inner.capture_thread = Some(handle);
                log::info!(
                    "Session {} running with {}",
                    self.id,
                    input.device().info().name
                );
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
                inner.capture_thread = Some(handle);
                if *gate == StartGate::Opened {
                    log::info!("Session {} opened at the start deadline", self.id);
                    return Ok(());
                }
                // The thread checks the gate before it may report running.
                *gate = StartGate::Abandoned;
                self.stop_flag.store(true, Ordering::Release);
                Err(CameraError::StreamError(format!(
                    "stream did not open within {:?}",
                    self.open_timeout
                )))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(CameraError::StreamError(
                    "capture thread exited before opening the stream".to_string(),
                ))
            }
        }
    }

    pub fn stop_running(&self) {
        self.stop_flag.store(true, Ordering::Release);
        let handle = self.lock().capture_thread.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("Capture thread of session {} panicked", self.id);
            }
            log::info!("Session {} stopped", self.id);
        }
        self.running.store(false, Ordering::Release);
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop_running();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

fn capture_loop(
    device: Arc<dyn CaptureDevice>,
    frames: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    gate: Arc<Mutex<StartGate>>,
    open_tx: crossbeam_channel::Sender<Result<(), CameraError>>,
) {
    let mut source = match device.open_stream() {
        Ok(source) => source,
        Err(e) => {
            let _ = open_tx.send(Err(e));
            return;
        }
    };

    {
        let mut gate = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if *gate == StartGate::Abandoned {
            log::warn!(
                "Stream of {} opened after its session gave up, closing it",
                device.info().name
            );
            if let Err(e) = source.stop() {
                log::warn!("Failed to stop stream of {}: {}", device.info().name, e);
            }
            return;
        }
        *gate = StartGate::Opened;
        running.store(true, Ordering::Release);
    }
    let _ = open_tx.send(Ok(()));

    while !stop_flag.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(frame) => frames.publish(frame),
            Err(e) => {
                log::error!("Capture from {} failed: {}", device.info().name, e);
                frames.close();
                break;
            }
        }
    }

    running.store(false, Ordering::Release);
    if let Err(e) = source.stop() {
        log::warn!("Failed to stop stream of {}: {}", device.info().name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SyntheticDevice;
    use crate::types::{DevicePosition, PhotoCodec};

    fn device(position: DevicePosition) -> Arc<dyn CaptureDevice> {
        Arc::new(SyntheticDevice::new("0", position))
    }

    #[test]
    fn accepts_a_single_input() {
        let session = CaptureSession::new();
        let first = Arc::new(DeviceInput::new(device(DevicePosition::Back)).unwrap());
        let second = DeviceInput::new(device(DevicePosition::Front)).unwrap();

        assert!(session.can_add_input(&first));
        session.add_input(first).unwrap();
        assert!(!session.can_add_input(&second));
        assert!(session.add_input(Arc::new(second)).is_err());
        assert_eq!(session.inputs().len(), 1);
    }

    #[test]
    fn disconnected_device_has_no_input() {
        let device: Arc<dyn CaptureDevice> =
            Arc::new(SyntheticDevice::new("0", DevicePosition::Back).disconnected());
        assert!(DeviceInput::new(device).is_err());
    }

    #[test]
    fn accepts_a_single_photo_output() {
        let session = CaptureSession::new();
        let first = Arc::new(PhotoOutput::new());
        let second = PhotoOutput::new();
        session.add_output(first).unwrap();
        assert!(!session.can_add_output(&second));
    }

    #[test]
    fn running_session_publishes_frames() {
        let session = CaptureSession::new();
        session
            .add_input(Arc::new(DeviceInput::new(device(DevicePosition::Back)).unwrap()))
            .unwrap();
        session.start_running().unwrap();
        assert!(session.is_running());

        let (_, frame) = session
            .frames()
            .wait_newer(0, Duration::from_secs(2))
            .expect("frame");
        assert!(frame.is_valid());

        assert!(session.start_running().is_err());
        session.stop_running();
        assert!(!session.is_running());
    }

    #[test]
    fn stream_open_failure_leaves_session_stopped() {
        let failing: Arc<dyn CaptureDevice> =
            Arc::new(SyntheticDevice::new("0", DevicePosition::Back).failing_stream());
        let session = CaptureSession::new();
        session
            .add_input(Arc::new(DeviceInput::new(failing).unwrap()))
            .unwrap();
        assert!(matches!(
            session.start_running(),
            Err(CameraError::StreamError(_))
        ));
        assert!(!session.is_running());
    }

    #[test]
    fn late_stream_open_never_reports_running() {
        let slow: Arc<dyn CaptureDevice> = Arc::new(
            SyntheticDevice::new("0", DevicePosition::Back)
                .with_open_delay(Duration::from_millis(150)),
        );
        let session = CaptureSession::new().with_stream_open_timeout(Duration::from_millis(20));
        session
            .add_input(Arc::new(DeviceInput::new(slow).unwrap()))
            .unwrap();

        assert!(matches!(
            session.start_running(),
            Err(CameraError::StreamError(_))
        ));
        let deadline = Instant::now() + Duration::from_millis(400);
        while Instant::now() < deadline {
            assert!(!session.is_running());
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(session.latest_frame().is_none());
    }

    #[test]
    fn attached_output_sees_session_frames() {
        let session = CaptureSession::new();
        session
            .add_input(Arc::new(DeviceInput::new(device(DevicePosition::Back)).unwrap()))
            .unwrap();
        let output = Arc::new(PhotoOutput::new());
        session.add_output(output.clone()).unwrap();
        session.start_running().unwrap();

        let photo = output
            .capture_photo(&crate::types::PhotoSettings::new(PhotoCodec::Png))
            .unwrap();
        assert_eq!(photo.codec, PhotoCodec::Png);
    }
}
