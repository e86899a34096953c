use emometer_vision::detect::{face_chip, nms, FaceBox, Letterbox, CHIP_SIZE};
use image::{DynamicImage, Rgb, RgbImage};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_square_frame_needs_no_padding() {
    init_logs();
    let lb = Letterbox::compute(480, 480, 160);
    assert_eq!(lb.offset_x, 0);
    assert_eq!(lb.offset_y, 0);
    assert!((lb.scale - 160.0 / 480.0).abs() < 1e-6);

    // full-canvas box maps back to the full frame
    let frame = lb.bbox_to_frame([0.0, 0.0, 1.0, 1.0]);
    assert!((frame[2] - 480.0).abs() < 1e-3);
    assert!((frame[3] - 480.0).abs() < 1e-3);
}

#[test]
fn test_nms_prefers_higher_score_of_overlapping_pair() {
    let faces = vec![
        FaceBox {
            bbox: [0.0, 0.0, 50.0, 50.0],
            score: 0.6,
        },
        FaceBox {
            bbox: [5.0, 5.0, 50.0, 50.0],
            score: 0.95,
        },
    ];
    let kept = nms(&faces, 0.3);
    assert_eq!(kept.len(), 1);
    assert!((kept[0].score - 0.95).abs() < 1e-6);
}

#[test]
fn test_face_chip_reflects_source_brightness() {
    init_logs();
    // white face region on a black frame: the chip should be bright
    let mut img = RgbImage::new(200, 200);
    for y in 50..150 {
        for x in 50..150 {
            img.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    let img = DynamicImage::ImageRgb8(img);

    let chip = face_chip(&img, &[60.0, 60.0, 80.0, 80.0]).unwrap();
    assert_eq!(chip.len(), (CHIP_SIZE * CHIP_SIZE) as usize);
    let mean: f32 = chip.iter().sum::<f32>() / chip.len() as f32;
    assert!(mean > 0.9, "expected bright chip, mean {mean}");
}

#[test]
fn test_chip_crop_clamps_to_frame_edge() {
    let img = DynamicImage::new_rgb8(100, 100);
    // box touching the frame corner still produces a full-size chip
    let chip = face_chip(&img, &[0.0, 0.0, 30.0, 30.0]).unwrap();
    assert_eq!(chip.len(), (CHIP_SIZE * CHIP_SIZE) as usize);
}
