//! Face localization against a single frame: letterbox preprocessing,
//! detector inference, decode, rescale and NMS, plus face-chip extraction
//! for the expression stage.

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::yunet;

/// Side length of the grayscale chip fed to the expression net.
pub const CHIP_SIZE: u32 = 64;

/// Relative margin added around a detected box before cropping the chip.
const CHIP_MARGIN: f32 = 0.1;

/// A detected face box in source-frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

/// Aspect-preserving resize onto a square canvas, centered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub target: u32,
}

impl Letterbox {
    pub fn compute(orig_w: u32, orig_h: u32, target: u32) -> Self {
        let max_dim = orig_w.max(orig_h).max(1);
        let scale = target as f32 / max_dim as f32;
        let new_w = (orig_w as f32 * scale) as u32;
        let new_h = (orig_h as f32 * scale) as u32;
        Self {
            scale,
            offset_x: (target - new_w) / 2,
            offset_y: (target - new_h) / 2,
            target,
        }
    }

    /// Map a bbox normalized to the canvas back into source-frame pixels.
    pub fn bbox_to_frame(&self, bbox: [f32; 4]) -> [f32; 4] {
        let t = self.target as f32;
        [
            (bbox[0] * t - self.offset_x as f32) / self.scale,
            (bbox[1] * t - self.offset_y as f32) / self.scale,
            bbox[2] * t / self.scale,
            bbox[3] * t / self.scale,
        ]
    }
}

/// Run one detection pass. Returns zero or more face boxes in source-frame
/// coordinates; no state is carried between calls.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    input_size: u32,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<FaceBox>> {
    let (orig_w, orig_h) = img.dimensions();
    let letterbox = Letterbox::compute(orig_w, orig_h, input_size);

    let new_w = (orig_w as f32 * letterbox.scale) as u32;
    let new_h = (orig_h as f32 * letterbox.scale) as u32;
    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(input_size, input_size);
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );

    let input_tensor = Value::from_array(pack_bgr_planar(&canvas.to_rgb8(), input_size)?)?;
    let outputs = session
        .run(ort::inputs![input_tensor])
        .context("run face detector")?;

    let mut raw: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let refs: Vec<(&[i64], &[f32])> = raw
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let decoded = yunet::decode_outputs(&refs, input_size as usize, score_threshold)
        .context("decode detector outputs")?;

    let faces: Vec<FaceBox> = decoded
        .into_iter()
        .map(|f| FaceBox {
            bbox: letterbox.bbox_to_frame(f.bbox),
            score: f.score,
        })
        .collect();

    Ok(nms(&faces, nms_threshold))
}

/// Pack an RGB image into the detector's [1, 3, H, W] BGR planar layout.
fn pack_bgr_planar(img: &image::RgbImage, size: u32) -> Result<Array4<f32>> {
    let pixels = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * pixels];
    let (b_plane, rest) = data.split_at_mut(pixels);
    let (g_plane, r_plane) = rest.split_at_mut(pixels);
    for (i, px) in img.as_raw().chunks_exact(3).take(pixels).enumerate() {
        r_plane[i] = px[0] as f32;
        g_plane[i] = px[1] as f32;
        b_plane[i] = px[2] as f32;
    }
    Ok(Array4::from_shape_vec(
        (1, 3, size as usize, size as usize),
        data,
    )?)
}

/// Greedy IoU suppression, highest score first.
pub fn nms(faces: &[FaceBox], iou_threshold: f32) -> Vec<FaceBox> {
    let mut sorted = faces.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<FaceBox> = Vec::new();
    for face in sorted {
        if keep
            .iter()
            .all(|kept| iou(&kept.bbox, &face.bbox) <= iou_threshold)
        {
            keep.push(face);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Crop a face box (grown by a small margin, clamped to the frame) and
/// produce the expression net's grayscale chip in [0, 1], row-major.
pub fn face_chip(img: &DynamicImage, bbox: &[f32; 4]) -> Result<Vec<f32>> {
    let (img_w, img_h) = img.dimensions();
    let margin_x = bbox[2] * CHIP_MARGIN;
    let margin_y = bbox[3] * CHIP_MARGIN;

    let x0 = (bbox[0] - margin_x).max(0.0) as u32;
    let y0 = (bbox[1] - margin_y).max(0.0) as u32;
    let x1 = ((bbox[0] + bbox[2] + margin_x).min(img_w as f32)) as u32;
    let y1 = ((bbox[1] + bbox[3] + margin_y).min(img_h as f32)) as u32;
    if x1 <= x0 || y1 <= y0 {
        anyhow::bail!("face box {bbox:?} lies outside the {img_w}x{img_h} frame");
    }

    let chip = img
        .crop_imm(x0, y0, x1 - x0, y1 - y0)
        .resize_exact(CHIP_SIZE, CHIP_SIZE, FilterType::Triangle)
        .to_luma8();

    Ok(chip.as_raw().iter().map(|&p| p as f32 / 255.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let overlap = iou(&a, &b);
        assert!(overlap > 0.0 && overlap < 1.0);

        let far = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(iou(&a, &far), 0.0);
    }

    #[test]
    fn test_nms_keeps_distinct_faces() {
        let faces = vec![
            FaceBox {
                bbox: [10.0, 10.0, 20.0, 20.0],
                score: 0.9,
            },
            FaceBox {
                bbox: [12.0, 12.0, 20.0, 20.0],
                score: 0.8,
            },
            FaceBox {
                bbox: [100.0, 100.0, 20.0, 20.0],
                score: 0.85,
            },
        ];
        let kept = nms(&faces, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_roundtrip() {
        // 320x240 source onto a 160 canvas: scale 0.5, vertical padding
        let lb = Letterbox::compute(320, 240, 160);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.offset_x, 0);
        assert_eq!(lb.offset_y, 20);

        // a canvas-normalized box maps back into source pixels
        let frame = lb.bbox_to_frame([0.25, 0.25, 0.5, 0.5]);
        assert!((frame[0] - 80.0).abs() < 1e-4);
        assert!((frame[1] - 40.0).abs() < 1e-4);
        assert!((frame[2] - 160.0).abs() < 1e-4);
        assert!((frame[3] - 160.0).abs() < 1e-4);
    }

    #[test]
    fn test_pack_bgr_planar_layout() {
        let mut img = image::RgbImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        let arr = pack_bgr_planar(&img, 2).unwrap();
        assert_eq!(arr.shape(), &[1, 3, 2, 2]);
        // channel plane order is B, G, R
        assert_eq!(arr[[0, 0, 0, 0]], 30.0);
        assert_eq!(arr[[0, 1, 0, 0]], 20.0);
        assert_eq!(arr[[0, 2, 0, 0]], 10.0);
    }

    #[test]
    fn test_face_chip_shape_and_range() {
        let img = DynamicImage::new_rgb8(100, 100);
        let chip = face_chip(&img, &[20.0, 20.0, 40.0, 40.0]).unwrap();
        assert_eq!(chip.len(), (CHIP_SIZE * CHIP_SIZE) as usize);
        assert!(chip.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_face_chip_outside_frame_fails() {
        let img = DynamicImage::new_rgb8(100, 100);
        assert!(face_chip(&img, &[200.0, 200.0, 40.0, 40.0]).is_err());
    }
}
