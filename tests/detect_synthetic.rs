use approx::assert_relative_eq;
use image::{imageops, Rgb, RgbImage};
use marker_pose::core::marker::{encode_id, generate_encoded_image};
use marker_pose::cv::scalar::ScalarCV;
use marker_pose::{Camera, DetectorParams, ImageBuffer, MarkerDetector, MarkerError, Point2f};

fn camera() -> Camera {
    Camera::new(400.0, 400.0, 160.0, 120.0)
}

/// White frame with the tag for `id` turned `quarter_turns` times clockwise at `(x, y)`.
fn compose(frame: &mut RgbImage, id: u16, cell: u32, quarter_turns: u32, x: i64, y: i64) {
    let mut tag = generate_encoded_image(cell, &encode_id(id).unwrap());
    for _ in 0..quarter_turns {
        tag = imageops::rotate90(&tag);
    }
    imageops::overlay(frame, &tag, x, y);
}

fn white(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
}

fn detect(detector: &mut MarkerDetector, frame: &RgbImage) {
    let image = ImageBuffer::new(frame.as_raw(), frame.width(), frame.height(), 3).unwrap();
    detector.process_frame(&image).unwrap();
}

#[test]
fn recovers_id_and_orientation() {
    let axis_aligned = [
        Point2f::new(100.0, 60.0),
        Point2f::new(169.0, 60.0),
        Point2f::new(169.0, 129.0),
        Point2f::new(100.0, 129.0),
    ];

    for k in 0..4u32 {
        let mut frame = white(320, 240);
        compose(&mut frame, 300, 10, k, 100, 60);

        let mut detector = MarkerDetector::new(camera(), 7.0).unwrap();
        detect(&mut detector, &frame);

        assert_eq!(detector.markers().len(), 1, "turns {k}");
        let marker = &detector.markers()[0];
        assert_eq!(marker.id, 300);
        assert_eq!(u32::from(marker.rotations), (4 - k) % 4);

        // Corner 0 follows the tag's own top-left as it turns.
        assert_eq!(marker.corners[0], axis_aligned[k as usize]);
        assert_eq!(detector.transformations().len(), 1);
    }
}

#[test]
fn frontal_tag_pose() {
    let mut frame = white(320, 240);
    compose(&mut frame, 5, 10, 0, 100, 60);

    let mut detector = MarkerDetector::new(camera(), 7.0).unwrap();
    detect(&mut detector, &frame);

    let t = detector.transformations()[0];
    let r = t.fixed_view::<3, 3>(0, 0).into_owned();
    assert_relative_eq!(r, nalgebra::Matrix3::identity(), epsilon = 1e-3);
    // 7 units imaged over 69 px at f = 400.
    assert_relative_eq!(t[(2, 3)], 400.0 * 7.0 / 69.0, max_relative = 1e-3);
}

#[test]
fn tiny_tags_are_ignored() {
    // 21 px tag: perimeter 80 < 0.2 * 640.
    let mut frame = white(640, 480);
    compose(&mut frame, 300, 3, 0, 300, 200);

    let mut detector = MarkerDetector::new(camera(), 7.0).unwrap();
    detect(&mut detector, &frame);
    assert!(detector.markers().is_empty());
    assert!(detector.transformations().is_empty());
}

#[test]
fn multiple_tags_are_ordered_by_id() {
    let mut frame = white(640, 480);
    compose(&mut frame, 900, 12, 0, 40, 40);
    compose(&mut frame, 17, 12, 1, 360, 60);
    compose(&mut frame, 512, 12, 3, 200, 300);

    let params = DetectorParams {
        min_perimeter_fraction: 0.1,
        ..DetectorParams::default()
    };
    let camera = Camera::new(600.0, 600.0, 320.0, 240.0);
    let mut detector = MarkerDetector::with_params(camera, 5.0, params, ScalarCV).unwrap();
    detect(&mut detector, &frame);

    let ids: Vec<u16> = detector.markers().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![17, 512, 900]);
    assert_eq!(detector.transformations().len(), 3);
    for (marker, t) in detector.markers().iter().zip(detector.transformations()) {
        assert_eq!(&marker.transformation, t);
    }
}

#[test]
fn repeated_frames_give_identical_results() {
    let mut frame = white(320, 240);
    compose(&mut frame, 771, 10, 2, 120, 80);

    let mut detector = MarkerDetector::new(camera(), 7.0).unwrap();
    detect(&mut detector, &frame);
    let first = detector.markers().to_vec();
    detect(&mut detector, &frame);

    assert_eq!(first.len(), 1);
    assert_eq!(detector.markers(), first.as_slice());
}

#[test]
fn invalid_frames_are_rejected() {
    let mut detector = MarkerDetector::new(camera(), 7.0).unwrap();

    let rgba = vec![0u8; 8 * 8 * 4];
    let image = ImageBuffer::new(&rgba, 8, 8, 4).unwrap();
    assert!(matches!(
        detector.process_frame(&image),
        Err(MarkerError::InvalidFrame { channels: 4, .. })
    ));

    assert!(matches!(
        ImageBuffer::new(&rgba, 8, 8, 3),
        Err(MarkerError::InvalidFrame { len: 256, .. })
    ));
}
