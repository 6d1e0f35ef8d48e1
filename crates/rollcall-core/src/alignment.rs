//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace crop using the
//! five InsightFace reference landmarks.

use crate::types::ImageView;

/// ArcFace reference landmarks for a 112×112 output.
pub(crate) const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Least-squares similarity transform (scale, rotation, translation) taking
/// `src` points onto `dst` points.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    let n = src.len() as f32;
    let mean = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (msx, msy) = mean(src);
    let (mdx, mdy) = mean(dst);

    let mut num_a = 0.0f32;
    let mut num_b = 0.0f32;
    let mut denom = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - msx, sy - msy);
        let (dx, dy) = (dx - mdx, dy - mdy);
        num_a += sx * dx + sy * dy;
        num_b += sx * dy - sy * dx;
        denom += sx * sx + sy * sy;
    }

    if denom < 1e-12 {
        // Degenerate landmarks (all coincident): translate only.
        return [1.0, 0.0, mdx - msx, 0.0, 1.0, mdy - msy];
    }

    let a = num_a / denom;
    let b = num_b / denom;
    let tx = mdx - (a * msx - b * msy);
    let ty = mdy - (b * msx + a * msy);

    [a, -b, tx, b, a, ty]
}

/// Apply a 2×3 similarity warp to an RGB image, producing a square RGB crop.
///
/// Uses bilinear interpolation. Out-of-bounds samples are black.
fn warp_affine(image: &ImageView<'_>, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = vec![0u8; out_size * out_size * 3];

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;

    let w = image.width as i64;
    let h = image.height as i64;
    let sample = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < w && y >= 0 && y < h {
            image.pixel(x as usize, y as usize).map(f32::from)
        } else {
            [0.0; 3]
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            // src = M^-1 * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            let base = (oy * out_size + ox) * 3;
            for c in 0..3 {
                let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                    + tr[c] * fx * (1.0 - fy)
                    + bl[c] * (1.0 - fx) * fy
                    + br[c] * fx * fy;
                output[base + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop.
pub fn align_face(image: &ImageView<'_>, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}
