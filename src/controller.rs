//! The camera controller: prepares a capture session in four ordered steps
//! on a background queue and attaches live previews to views.

use crate::config::ControllerConfig;
use crate::dispatch::{MainContext, SerialQueue};
use crate::errors::{CameraControllerError, CameraError};
use crate::output::PhotoOutput;
use crate::platform::{self, CameraBackend, CaptureDevice};
use crate::preview::{Layer, PreviewLayer, View};
use crate::session::{CaptureSession, DeviceInput};
use crate::types::{CameraPosition, DevicePosition, DiscoveryQuery, PhotoSettings};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ControllerState {
    capture_session: Option<Arc<CaptureSession>>,
    front_camera: Option<Arc<dyn CaptureDevice>>,
    rear_camera: Option<Arc<dyn CaptureDevice>>,
    current_camera_position: Option<CameraPosition>,
    front_camera_input: Option<Arc<DeviceInput>>,
    rear_camera_input: Option<Arc<DeviceInput>>,
    photo_output: Option<Arc<PhotoOutput>>,
    preview_layer: Option<Arc<PreviewLayer>>,
}

type SharedState = Arc<Mutex<ControllerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sets up a camera pipeline and shows its preview.
///
/// ```rust,no_run
/// use camera_controller::{platform, CameraController, Rect, View};
/// use std::time::Duration;
///
/// let controller = CameraController::new(platform::default_backend())?;
/// controller.prepare(|result| {
///     if let Err(e) = result {
///         eprintln!("camera unavailable: {e}");
///     }
/// });
///
/// // On the UI thread:
/// controller.main_context().run_next(Duration::from_secs(5));
/// let mut view = View::new(Rect::new(0.0, 0.0, 390.0, 844.0));
/// controller.display_preview(&mut view)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct CameraController {
    setup: Arc<Setup>,
    queue: SerialQueue,
    main: MainContext,
}

impl CameraController {
    /// Controller with default configuration and its own main context.
    pub fn new(backend: Arc<dyn CameraBackend>) -> Result<Self, CameraError> {
        Self::with_config(backend, ControllerConfig::default(), MainContext::new())
    }

    pub fn with_config(
        backend: Arc<dyn CameraBackend>,
        config: ControllerConfig,
        main: MainContext,
    ) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::ConfigError)?;
        let queue = SerialQueue::new(config.dispatch.queue_label.clone()).map_err(|e| {
            CameraError::InitializationError(format!("Failed to start setup queue: {}", e))
        })?;
        log::debug!(
            "Camera controller using {} backend on queue '{}'",
            backend.name(),
            queue.label()
        );

        Ok(Self {
            setup: Arc::new(Setup {
                backend,
                config,
                state: Arc::new(Mutex::new(ControllerState::default())),
            }),
            queue,
            main,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.setup.config
    }

    /// Context on which `prepare` completions are delivered.
    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    /// Prepare the capture pipeline off the calling thread.
    ///
    /// `completion` runs on the main context with `Ok(())` on success or
    /// the error of the first failing step.
    pub fn prepare<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), CameraControllerError>) + Send + 'static,
    {
        let setup = self.setup.clone();
        let main = self.main.clone();
        self.queue.dispatch(move || {
            let result = setup.run();
            main.dispatch(move || completion(result));
        });
    }

    /// [`prepare`](Self::prepare) for async callers; resolves when setup
    /// finishes instead of going through the main context.
    pub async fn prepare_async(&self) -> Result<(), CameraControllerError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let setup = self.setup.clone();
        self.queue.dispatch(move || {
            let _ = tx.send(setup.run());
        });
        rx.await.unwrap_or(Err(CameraControllerError::Unknown))
    }

    /// Insert a new live preview beneath the view's existing layers.
    pub fn display_preview(
        &self,
        view: &mut View,
    ) -> Result<Arc<PreviewLayer>, CameraControllerError> {
        let mut state = lock(&self.setup.state);
        let session = state
            .capture_session
            .clone()
            .filter(|session| session.is_running())
            .ok_or(CameraControllerError::CaptureSessionIsMissing)?;

        let preview = &self.setup.config.preview;
        let layer = Arc::new(PreviewLayer::new(session));
        layer.set_video_gravity(preview.gravity);
        layer.connection().set_video_orientation(preview.orientation);

        view.insert_sublayer(layer.clone(), 0);
        layer.set_frame(view.frame());
        log::info!("Preview layer {} attached", layer.id());

        state.preview_layer = Some(layer.clone());
        Ok(layer)
    }

    pub fn current_camera_position(&self) -> Option<CameraPosition> {
        lock(&self.setup.state).current_camera_position
    }

    pub fn capture_session(&self) -> Option<Arc<CaptureSession>> {
        lock(&self.setup.state).capture_session.clone()
    }

    pub fn front_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        lock(&self.setup.state).front_camera.clone()
    }

    pub fn rear_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        lock(&self.setup.state).rear_camera.clone()
    }

    /// Input of the current camera position.
    pub fn current_input(&self) -> Option<Arc<DeviceInput>> {
        let state = lock(&self.setup.state);
        match state.current_camera_position? {
            CameraPosition::Front => state.front_camera_input.clone(),
            CameraPosition::Rear => state.rear_camera_input.clone(),
        }
    }

    pub fn photo_output(&self) -> Option<Arc<PhotoOutput>> {
        lock(&self.setup.state).photo_output.clone()
    }

    pub fn preview_layer(&self) -> Option<Arc<PreviewLayer>> {
        lock(&self.setup.state).preview_layer.clone()
    }
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("backend", &self.setup.backend.name())
            .field("queue", &self.queue)
            .field("position", &self.current_camera_position())
            .finish()
    }
}

/// The setup chain. Runs only on the controller's serial queue.
struct Setup {
    backend: Arc<dyn CameraBackend>,
    config: ControllerConfig,
    state: SharedState,
}

impl Setup {
    fn run(&self) -> Result<(), CameraControllerError> {
        let result = catch_unwind(AssertUnwindSafe(|| self.run_steps())).unwrap_or_else(|_| {
            log::error!("Camera setup panicked");
            Err(CameraControllerError::Unknown)
        });
        match &result {
            Ok(()) => log::info!("Camera prepared"),
            Err(e) => log::warn!("Camera setup failed: {}", e),
        }
        result
    }

    fn run_steps(&self) -> Result<(), CameraControllerError> {
        self.create_capture_session()?;
        self.configure_capture_devices()?;
        self.configure_device_inputs()?;
        self.configure_photo_output()?;
        Ok(())
    }

    fn session(&self) -> Result<Arc<CaptureSession>, CameraControllerError> {
        lock(&self.state)
            .capture_session
            .clone()
            .ok_or(CameraControllerError::CaptureSessionIsMissing)
    }

    fn create_capture_session(&self) -> Result<(), CameraControllerError> {
        let mut state = lock(&self.state);
        if state
            .capture_session
            .as_ref()
            .is_some_and(|session| session.is_running())
        {
            return Err(CameraControllerError::CaptureSessionAlreadyRunning);
        }

        // Devices and inputs of an earlier attempt belong to the old session.
        let session = Arc::new(CaptureSession::new());
        log::debug!("Step 1: created capture session {}", session.id());
        *state = ControllerState {
            capture_session: Some(session),
            ..ControllerState::default()
        };
        Ok(())
    }

    fn configure_capture_devices(&self) -> Result<(), CameraControllerError> {
        let permission = self.backend.authorization_status();
        if !permission.allows_capture() {
            log::warn!("Camera permission is {}", permission);
            return Err(CameraControllerError::NoCameraAvailable);
        }

        let query = DiscoveryQuery {
            device_types: self.config.discovery.device_types.clone(),
            position: DevicePosition::Unspecified,
        };
        let cameras = self.backend.discover_devices(&query).map_err(|e| {
            log::error!("Camera discovery failed: {}", e);
            CameraControllerError::Unknown
        })?;
        if cameras.is_empty() {
            return Err(CameraControllerError::NoCameraAvailable);
        }

        let mut front_camera = None;
        let mut rear_camera = None;
        for camera in cameras {
            match camera.info().position.camera_position() {
                Some(CameraPosition::Front) => front_camera = Some(camera),
                Some(CameraPosition::Rear) => {
                    self.configure_rear_focus(camera.as_ref())?;
                    rear_camera = Some(camera);
                }
                None => log::debug!("Ignoring camera {} with no position", camera.info().name),
            }
        }
        log::debug!(
            "Step 2: front camera {:?}, rear camera {:?}",
            front_camera.as_ref().map(|c| &c.info().name),
            rear_camera.as_ref().map(|c| &c.info().name)
        );

        let mut state = lock(&self.state);
        state.front_camera = front_camera;
        state.rear_camera = rear_camera;
        Ok(())
    }

    fn configure_rear_focus(&self, camera: &dyn CaptureDevice) -> Result<(), CameraControllerError> {
        let mode = self.config.capture.rear_focus_mode;
        let configuration = platform::configure(camera).map_err(|e| {
            log::warn!("Could not lock {}: {}", camera.info().name, e);
            CameraControllerError::InvalidOperation
        })?;
        if !camera.is_focus_mode_supported(mode) {
            log::debug!("{} does not support {:?}", camera.info().name, mode);
            return Ok(());
        }
        configuration.set_focus_mode(mode).map_err(|e| {
            log::warn!("Could not set focus on {}: {}", camera.info().name, e);
            CameraControllerError::InvalidOperation
        })
    }

    fn configure_device_inputs(&self) -> Result<(), CameraControllerError> {
        let session = self.session()?;
        let (front_camera, rear_camera) = {
            let state = lock(&self.state);
            (state.front_camera.clone(), state.rear_camera.clone())
        };

        let candidates = match self.config.capture.preferred_position {
            CameraPosition::Rear => [
                (CameraPosition::Rear, rear_camera),
                (CameraPosition::Front, front_camera),
            ],
            CameraPosition::Front => [
                (CameraPosition::Front, front_camera),
                (CameraPosition::Rear, rear_camera),
            ],
        };
        let (position, camera) = candidates
            .into_iter()
            .find_map(|(position, camera)| camera.map(|camera| (position, camera)))
            .ok_or(CameraControllerError::NoCameraAvailable)?;

        let input = DeviceInput::new(camera).map_err(|e| {
            log::warn!("Could not create device input: {}", e);
            CameraControllerError::InputsAreInvalid
        })?;
        if !session.can_add_input(&input) {
            return Err(CameraControllerError::InputsAreInvalid);
        }
        let input = Arc::new(input);
        session.add_input(input.clone()).map_err(|e| {
            log::warn!("Session rejected input: {}", e);
            CameraControllerError::InputsAreInvalid
        })?;
        log::debug!("Step 3: using {:?} camera", position);

        let mut state = lock(&self.state);
        match position {
            CameraPosition::Front => state.front_camera_input = Some(input),
            CameraPosition::Rear => state.rear_camera_input = Some(input),
        }
        state.current_camera_position = Some(position);
        Ok(())
    }

    fn configure_photo_output(&self) -> Result<(), CameraControllerError> {
        let session = self.session()?;
        if session.is_running() {
            return Err(CameraControllerError::CaptureSessionAlreadyRunning);
        }
        let capture = &self.config.capture;

        let photo_output = Arc::new(PhotoOutput::with_capture_timeout(capture.photo_timeout()));
        photo_output.set_prepared_photo_settings(vec![
            PhotoSettings::new(capture.photo_codec).with_quality(capture.jpeg_quality)
        ]);

        if session.can_add_output(&photo_output) {
            session.add_output(photo_output.clone()).map_err(|e| {
                log::warn!("Session rejected photo output: {}", e);
                CameraControllerError::InvalidOperation
            })?;
        } else {
            log::warn!("Session cannot accept the photo output, continuing without it");
        }
        lock(&self.state).photo_output = Some(photo_output);

        session.start_running().map_err(|e| {
            log::error!("Failed to start capture session: {}", e);
            CameraControllerError::Unknown
        })?;
        log::debug!("Step 4: session {} running", session.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SyntheticBackend;
    use crate::types::Rect;
    use std::time::Duration;

    fn prepare_blocking(controller: &CameraController) -> Result<(), CameraControllerError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        controller.prepare(move |result| tx.send(result).unwrap());
        assert!(controller.main_context().run_next(Duration::from_secs(5)));
        rx.try_recv().unwrap()
    }

    #[test]
    fn prepare_then_preview() {
        let controller =
            CameraController::new(Arc::new(SyntheticBackend::front_and_rear())).unwrap();
        assert_eq!(prepare_blocking(&controller), Ok(()));
        assert_eq!(controller.current_camera_position(), Some(CameraPosition::Rear));

        let mut view = View::new(Rect::new(0.0, 0.0, 120.0, 200.0));
        let layer = controller.display_preview(&mut view).unwrap();
        assert_eq!(view.sublayers()[0].id(), layer.id());
        assert_eq!(layer.frame(), view.frame());
    }

    #[test]
    fn preview_requires_prepared_session() {
        let controller =
            CameraController::new(Arc::new(SyntheticBackend::front_and_rear())).unwrap();
        let mut view = View::default();
        assert_eq!(
            controller.display_preview(&mut view).unwrap_err(),
            CameraControllerError::CaptureSessionIsMissing
        );
        assert!(view.sublayers().is_empty());
    }

    #[test]
    fn refused_photo_output_is_skipped_and_session_starts() {
        let setup = Setup {
            backend: Arc::new(SyntheticBackend::front_and_rear()),
            config: ControllerConfig::default(),
            state: Arc::new(Mutex::new(ControllerState::default())),
        };
        setup.create_capture_session().unwrap();
        let session = setup.session().unwrap();
        let existing = Arc::new(PhotoOutput::new());
        session.add_output(existing.clone()).unwrap();

        assert_eq!(setup.configure_photo_output(), Ok(()));
        assert!(session.is_running());

        let outputs = session.outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].id(), existing.id());
        let skipped = lock(&setup.state).photo_output.clone().unwrap();
        assert_ne!(skipped.id(), existing.id());
        assert!(!skipped.is_attached());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ControllerConfig::default();
        config.capture.jpeg_quality = 0;
        let result = CameraController::with_config(
            Arc::new(SyntheticBackend::new()),
            config,
            MainContext::new(),
        );
        assert!(matches!(result, Err(CameraError::ConfigError(_))));
    }
}
