//! Live preview rendering against a running synthetic session.

use camera_controller::testing::{SyntheticBackend, SyntheticDevice};
use camera_controller::{
    CameraController, DevicePosition, Layer, Rect, VideoGravity, VideoOrientation, View,
};
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn prepared_controller(device: SyntheticDevice) -> CameraController {
    let controller =
        CameraController::new(Arc::new(SyntheticBackend::new().with_device(device))).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);
    controller.prepare(move |result| tx.send(result).unwrap());
    assert!(controller.main_context().run_next(Duration::from_secs(5)));
    rx.try_recv().unwrap().expect("prepare");
    controller
}

fn render_eventually(render: impl Fn() -> Option<RgbImage>) -> RgbImage {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(image) = render() {
            return image;
        }
        assert!(Instant::now() < deadline, "no frame rendered");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod preview_render_tests {
    use super::*;

    #[test]
    fn test_preview_renders_at_view_size() {
        let controller = prepared_controller(SyntheticDevice::new("rear", DevicePosition::Back));
        let mut view = View::new(Rect::new(0.0, 0.0, 90.0, 160.0));
        let layer = controller.display_preview(&mut view).unwrap();

        let image = render_eventually(|| layer.render());
        assert_eq!(image.dimensions(), (90, 160));
    }

    #[test]
    fn test_preview_follows_frame_changes() {
        let controller = prepared_controller(SyntheticDevice::new("rear", DevicePosition::Back));
        let mut view = View::new(Rect::new(0.0, 0.0, 90.0, 160.0));
        let layer = controller.display_preview(&mut view).unwrap();

        layer.set_frame(Rect::new(0.0, 0.0, 40.0, 40.0));
        let image = render_eventually(|| layer.render());
        assert_eq!(image.dimensions(), (40, 40));
    }

    #[test]
    fn test_aspect_fit_in_portrait_letterboxes_top_and_bottom() {
        // 64x48 landscape frames become 48x64 once rotated to portrait.
        let controller = prepared_controller(SyntheticDevice::new("rear", DevicePosition::Back));
        let mut view = View::new(Rect::new(0.0, 0.0, 48.0, 128.0));
        let layer = controller.display_preview(&mut view).unwrap();
        layer.set_video_gravity(VideoGravity::ResizeAspect);
        assert_eq!(layer.connection().video_orientation(), VideoOrientation::Portrait);

        let image = render_eventually(|| layer.render());
        assert_eq!(image.dimensions(), (48, 128));
        assert_eq!(image.get_pixel(24, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(24, 127).0, [0, 0, 0]);
    }

    #[test]
    fn test_empty_view_renders_nothing() {
        let controller = prepared_controller(SyntheticDevice::new("rear", DevicePosition::Back));
        let mut view = View::default();
        let layer = controller.display_preview(&mut view).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(layer.render().is_none());
    }

    #[test]
    fn test_oversized_view_renders_nothing() {
        let controller = prepared_controller(SyntheticDevice::new("rear", DevicePosition::Back));
        let session = controller.capture_session().unwrap();
        let generation = session.frames().generation();
        assert!(session
            .frames()
            .wait_newer(generation, Duration::from_secs(2))
            .is_some());

        let mut view = View::new(Rect::new(0.0, 0.0, 1e7, 1e7));
        let layer = controller.display_preview(&mut view).unwrap();
        assert!(layer.render().is_none());

        layer.set_frame(Rect::new(0.0, 0.0, 32.0, 32.0));
        assert_eq!(render_eventually(|| layer.render()).dimensions(), (32, 32));
    }

    #[test]
    fn test_preview_layer_shares_controller_session() {
        let controller = prepared_controller(SyntheticDevice::new("front", DevicePosition::Front));
        let mut view = View::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        let layer = controller.display_preview(&mut view).unwrap();
        assert_eq!(
            layer.session().id(),
            controller.capture_session().unwrap().id()
        );
        assert_eq!(layer.name(), "camera-preview");
    }
}
