//! Face alignment via 4-DOF similarity transform.
//!
//! Maps a detected face onto the canonical 112×112 ArcFace position using the
//! five reference landmarks and a least-squares fit.

use crate::frame::Frame;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Least-squares similarity transform (scale, rotation, translation) taking
/// `src` landmarks onto `dst`.
///
/// Returned row-major as `[a, -b, tx, b, a, ty]`.
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for the unknowns [a, b, tx, ty]; each landmark pair
    // contributes two rows:
    //   [sx, -sy, 1, 0] -> dx
    //   [sy,  sx, 0, 1] -> dy
    let mut ata = [0.0f32; 16];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
        for (row, rhs) in rows {
            for j in 0..4 {
                for k in 0..4 {
                    ata[j * 4 + k] += row[j] * row[k];
                }
                atb[j] += row[j] * rhs;
            }
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb);
    [a, -b, tx, b, a, ty]
}

/// Gaussian elimination with partial pivoting on a 4×4 system.
///
/// A singular system falls back to the identity scale (`a = 1`).
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[..4].copy_from_slice(&ata[i * 4..i * 4 + 4]);
        row[4] = atb[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| {
                m[r1][col]
                    .abs()
                    .partial_cmp(&m[r2][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][4] - tail) / m[i][i];
    }
    x
}

/// Warp an RGB frame through a 2×3 similarity transform into a square crop.
///
/// Bilinear sampling per channel. Samples outside the frame read as black.
fn warp_affine(frame: &Frame, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);
    let src_width = frame.width as i32;
    let src_height = frame.height as i32;

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return vec![0u8; out_size * out_size * 3];
    }
    let inv_det = 1.0 / det;
    let ia = a * inv_det;
    let ib = b * inv_det;

    let mut output = vec![0u8; out_size * out_size * 3];

    for oy in 0..out_size {
        for ox in 0..out_size {
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let sample = |x: i32, y: i32, c: usize| -> f32 {
                if x >= 0 && x < src_width && y >= 0 && y < src_height {
                    frame.data[(y as usize * frame.width as usize + x as usize) * 3 + c] as f32
                } else {
                    0.0
                }
            };

            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                output[(oy * out_size + ox) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop.
///
/// Computes the similarity transform from the five detected landmarks to the
/// reference positions and warps the face into packed RGB (112 * 112 * 3 bytes).
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(frame, &matrix, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        // When src == dst, transform should be identity-like (a≈1, b≈0)
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        // a ≈ 1.0
        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        // -b ≈ 0.0
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        // tx ≈ 0.0
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        // b ≈ 0.0
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        // a ≈ 1.0
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        // ty ≈ 0.0
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → transform should have a ≈ 0.5
        let src: [(f32, f32); 5] = [
            (76.5892, 103.3926),
            (147.0636, 103.0028),
            (112.0504, 143.4732),
            (83.0986, 184.7310),
            (141.4598, 184.4082),
        ];
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);

        // Scale factor should be ~0.5
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}, expected ~0.5", m[0]);
    }

    fn gray_frame(w: u32, h: u32, v: u8) -> Frame {
        Frame::from_rgb(vec![v; (w * h * 3) as usize], w, h).unwrap()
    }

    #[test]
    fn test_warp_output_size() {
        let frame = gray_frame(64, 48, 128);
        let m = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let out = warp_affine(&frame, &m, 112);
        assert_eq!(out.len(), 112 * 112 * 3);
    }

    #[test]
    fn test_warp_degenerate_matrix_is_black() {
        let frame = gray_frame(16, 16, 200);
        let out = warp_affine(&frame, &[0.0; 6], 8);
        assert!(out.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = gray_frame(640, 480, 128);
        let aligned = align_face(&frame, &REFERENCE_LANDMARKS_112);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE * 3);
    }

    #[test]
    fn test_align_face_keeps_colour() {
        let w = 200usize;
        let h = 200usize;
        let mut data = vec![0u8; w * h * 3];
        for px in data.chunks_exact_mut(3) {
            px.copy_from_slice(&[200, 40, 10]);
        }
        let frame = Frame::from_rgb(data, w as u32, h as u32).unwrap();
        let landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        let aligned = align_face(&frame, &landmarks);
        let centre = (56 * ALIGNED_SIZE + 56) * 3;
        assert_eq!(&aligned[centre..centre + 3], &[200, 40, 10]);
    }

    #[test]
    fn test_landmark_roundtrip() {
        // A bright patch at the left eye should land near the reference left eye.
        let w = 200usize;
        let h = 200usize;
        let mut data = vec![0u8; w * h * 3];

        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let lx = src_landmarks[0].0 as usize;
        let ly = src_landmarks[0].1 as usize;
        for dy in 0..5 {
            for dx in 0..5 {
                let px = lx - 2 + dx;
                let py = ly - 2 + dy;
                let i = (py * w + px) * 3;
                data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let frame = Frame::from_rgb(data, w as u32, h as u32).unwrap();

        let aligned = align_face(&frame, &src_landmarks);

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as usize;

        let mut max_val = 0u8;
        for dy in 0..3 {
            for dx in 0..3 {
                let x = ref_x - 1 + dx;
                let y = ref_y - 1 + dy;
                max_val = max_val.max(aligned[(y * ALIGNED_SIZE + x) * 3]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }
}
