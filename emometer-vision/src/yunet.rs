//! YuNet output decoding.
//!
//! YuNet is an anchor-free face detector. For each stride (8, 16, 32) it
//! emits four tensors over an HxW grid: cls [1, H*W, 1], obj [1, H*W, 1],
//! bbox deltas [1, H*W, 4] and landmark deltas [1, H*W, 10], in output order
//! cls_8..cls_32, obj_8..obj_32, bbox_8..bbox_32, kps_8..kps_32.
//! Boxes decode directly from grid cells:
//!   cx = (grid_x + dx) * stride, w = dw * stride, all divided by input_size.

use anyhow::Result;
use ndarray::Array2;

const STRIDES: [usize; 3] = [8, 16, 32];

/// A scored face box in coordinates normalized to [0, 1] of the detector
/// input canvas.
#[derive(Debug, Clone)]
pub struct RawFace {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
}

/// The four tensors YuNet emits for one stride.
struct ScaleOutputs {
    scores: Array2<f32>, // cls * obj, sigmoid applied
    boxes: Array2<f32>,
    stride: usize,
}

/// Decode the detector's 12 raw output tensors into scored boxes, keeping
/// only those at or above `score_threshold`.
pub fn decode_outputs(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<RawFace>> {
    let scales = group_scales(outputs, input_size)?;
    let mut faces = Vec::new();
    for scale in &scales {
        decode_scale(scale, input_size, score_threshold, &mut faces);
    }
    Ok(faces)
}

fn group_scales(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<ScaleOutputs>> {
    if outputs.len() < 12 {
        anyhow::bail!("expected 12 detector outputs, got {}", outputs.len());
    }
    let mut scales = Vec::with_capacity(STRIDES.len());
    for (i, &stride) in STRIDES.iter().enumerate() {
        let grid = input_size / stride;
        let cells = grid * grid;

        let cls = tensor_2d(outputs[i], cells, 1, "cls")?;
        let obj = tensor_2d(outputs[i + 3], cells, 1, "obj")?;
        let boxes = tensor_2d(outputs[i + 6], cells, 4, "bbox")?;
        // outputs[i + 9] are landmark deltas; the expression stage works on
        // a bbox crop, so they are not decoded.

        let mut scores = &cls * &obj;
        scores.mapv_inplace(sigmoid);

        scales.push(ScaleOutputs {
            scores,
            boxes,
            stride,
        });
    }
    Ok(scales)
}

fn tensor_2d(
    (shape, data): (&[i64], &[f32]),
    rows: usize,
    cols: usize,
    name: &str,
) -> Result<Array2<f32>> {
    if shape.len() != 3 || shape[0] != 1 || shape[1] as usize != rows || shape[2] as usize != cols {
        anyhow::bail!("unexpected {name} shape {shape:?}, expected [1, {rows}, {cols}]");
    }
    Ok(Array2::from_shape_vec((rows, cols), data.to_vec())?)
}

fn decode_scale(
    scale: &ScaleOutputs,
    input_size: usize,
    score_threshold: f32,
    out: &mut Vec<RawFace>,
) {
    let grid = input_size / scale.stride;
    let stride = scale.stride as f32;
    let size = input_size as f32;

    for row in 0..grid {
        for col in 0..grid {
            let idx = row * grid + col;
            let score = scale.scores[[idx, 0]];
            if score < score_threshold {
                continue;
            }

            let dx = scale.boxes[[idx, 0]];
            let dy = scale.boxes[[idx, 1]];
            let dw = scale.boxes[[idx, 2]];
            let dh = scale.boxes[[idx, 3]];

            let cx = (col as f32 + dx) * stride / size;
            let cy = (row as f32 + dy) * stride / size;
            let w = dw * stride / size;
            let h = dh * stride / size;

            out.push(RawFace {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
            });
        }
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
