use std::collections::HashMap;

use ndarray::Array2;

use crate::shared::frame::Frame;
use crate::shared::frame_record::FrameRecord;

#[derive(Clone, Debug, PartialEq)]
pub struct MotionSettings {
    /// Integer downsample factor applied before differencing.
    pub downsample: u32,
    /// Minimum absolute gray-level difference counted as changed.
    pub diff_threshold: f32,
    /// A changed region must cover more than this many downsampled pixels.
    pub min_region_area: usize,
    /// Frames keep passing for this long after the last real motion.
    pub hangover_ms: i64,
    /// Background update weight, applied after each decision.
    pub background_alpha: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            downsample: 5,
            diff_threshold: 20.0,
            min_region_area: 250,
            hangover_ms: 5000,
            background_alpha: 0.1,
        }
    }
}

struct CameraState {
    background: Array2<f32>,
    last_motion_ms: Option<i64>,
}

/// Drops frames in which nothing moved.
///
/// Keeps a running-average grayscale background per camera. A frame passes
/// when a connected region of changed pixels is large enough, or when the
/// camera saw real motion within the hangover window.
pub struct MotionGate {
    settings: MotionSettings,
    cameras: HashMap<String, CameraState>,
}

impl MotionGate {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            cameras: HashMap::new(),
        }
    }

    pub fn tracked_cameras(&self) -> usize {
        self.cameras.len()
    }

    /// Decides whether `record` continues downstream.
    ///
    /// The first frame of a camera seeds its background and passes without
    /// counting as motion.
    pub fn admit(&mut self, record: &FrameRecord) -> bool {
        let gray = downsampled_gray(&record.frame, self.settings.downsample);
        let camera = &record.meta.camera;
        let timestamp = record.meta.timestamp_ms;

        let state = match self.cameras.get_mut(camera) {
            Some(state) if state.background.dim() == gray.dim() => state,
            Some(state) => {
                log::info!("{camera}: resolution changed, reseeding background");
                state.background = gray;
                return true;
            }
            None => {
                log::debug!("{camera}: seeding motion background");
                self.cameras.insert(
                    camera.clone(),
                    CameraState {
                        background: gray,
                        last_motion_ms: None,
                    },
                );
                return true;
            }
        };

        let mask = state
            .background
            .iter()
            .zip(gray.iter())
            .map(|(bg, px)| (px - bg).abs() >= self.settings.diff_threshold)
            .collect::<Vec<bool>>();
        let (rows, cols) = gray.dim();

        let moved = has_region_larger_than(&mask, cols, rows, self.settings.min_region_area);
        if moved {
            state.last_motion_ms = Some(timestamp);
        }
        let admitted = moved
            || state
                .last_motion_ms
                .is_some_and(|last| timestamp - last < self.settings.hangover_ms);

        let alpha = self.settings.background_alpha;
        state
            .background
            .zip_mut_with(&gray, |bg, px| *bg = (1.0 - alpha) * *bg + alpha * px);

        admitted
    }
}

/// Nearest-neighbour downsample to an `(h, w)` luma plane.
fn downsampled_gray(frame: &Frame, factor: u32) -> Array2<f32> {
    let factor = factor.max(1) as f64;
    let out_w = ((frame.width() as f64 / factor).round() as usize).max(1);
    let out_h = ((frame.height() as f64 / factor).round() as usize).max(1);
    if frame.is_empty() {
        return Array2::zeros((out_h, out_w));
    }

    let pixels = frame.as_ndarray();
    let max_x = frame.width() as usize - 1;
    let max_y = frame.height() as usize - 1;
    let channels = frame.channels() as usize;

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let sy = ((y as f64 * factor) as usize).min(max_y);
        let sx = ((x as f64 * factor) as usize).min(max_x);
        if channels >= 3 {
            0.299 * pixels[[sy, sx, 0]] as f32
                + 0.587 * pixels[[sy, sx, 1]] as f32
                + 0.114 * pixels[[sy, sx, 2]] as f32
        } else {
            pixels[[sy, sx, 0]] as f32
        }
    })
}

/// Flood-fills 8-connected regions of `mask`, stopping at the first region
/// with more than `min_area` pixels.
fn has_region_larger_than(mask: &[bool], width: usize, height: usize, min_area: usize) -> bool {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;

        while let Some(idx) = stack.pop() {
            area += 1;
            if area > min_area {
                return true;
            }
            let (x, y) = ((idx % width) as isize, (idx / width) as isize);
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                        continue;
                    }
                    let n = ny as usize * width + nx as usize;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame_record::FrameMeta;
    use rstest::rstest;

    const SIZE: u32 = 200;

    fn frame_with_block(base: u8, block: Option<(u32, u8)>) -> Frame {
        let mut data = vec![base; (SIZE * SIZE * 3) as usize];
        if let Some((side, value)) = block {
            for y in 0..side {
                for x in 0..side {
                    let i = ((y * SIZE + x) * 3) as usize;
                    data[i..i + 3].fill(value);
                }
            }
        }
        Frame::new(data, SIZE, SIZE, 3)
    }

    fn record(camera: &str, t: i64, frame: Frame) -> FrameRecord {
        FrameRecord::new(FrameMeta::new(camera, t, true), frame)
    }

    #[test]
    fn test_constant_feed_only_admits_seed() {
        let mut gate = MotionGate::new(MotionSettings::default());
        let results: Vec<bool> = (0..6)
            .map(|i| gate.admit(&record("Main", 1_000_000 + i * 100, frame_with_block(50, None))))
            .collect();
        assert_eq!(results, vec![true, false, false, false, false, false]);
    }

    #[test]
    fn test_large_change_is_motion() {
        let mut gate = MotionGate::new(MotionSettings::default());
        assert!(gate.admit(&record("Main", 0, frame_with_block(50, None))));
        // 100x100 block -> 20x20 = 400 downsampled pixels
        assert!(gate.admit(&record("Main", 100, frame_with_block(50, Some((100, 150))))));
    }

    #[test]
    fn test_small_change_is_not_motion() {
        let mut gate = MotionGate::new(MotionSettings::default());
        gate.admit(&record("Main", 0, frame_with_block(50, None)));
        // 50x50 block -> 10x10 = 100 downsampled pixels
        assert!(!gate.admit(&record("Main", 100, frame_with_block(50, Some((50, 150))))));
    }

    /// Single-channel frame, so gray levels are exact.
    fn gray_frame_with_block(base: u8, value: u8) -> Frame {
        let mut data = vec![base; (SIZE * SIZE) as usize];
        for y in 0..100 {
            let row = (y * SIZE) as usize;
            data[row..row + 100].fill(value);
        }
        Frame::new(data, SIZE, SIZE, 1)
    }

    #[rstest]
    #[case(70, true)]
    #[case(69, false)]
    fn test_diff_threshold_is_inclusive_against_previous_background(
        #[case] value: u8,
        #[case] expect_motion: bool,
    ) {
        let mut gate = MotionGate::new(MotionSettings::default());
        assert!(gate.admit(&record("Main", 0, gray_frame_with_block(50, 50))));
        // Blending the new frame in first would leave a difference of 18.
        assert_eq!(
            gate.admit(&record("Main", 100, gray_frame_with_block(50, value))),
            expect_motion
        );
    }

    #[test]
    fn test_hangover_keeps_gate_open_then_expires() {
        let mut gate = MotionGate::new(MotionSettings::default());
        gate.admit(&record("Main", 0, frame_with_block(50, None)));
        assert!(gate.admit(&record("Main", 1000, frame_with_block(50, Some((100, 150))))));
        // Back to the static scene: no qualifying region, but within 5 s.
        assert!(gate.admit(&record("Main", 3000, frame_with_block(50, None))));
        assert!(gate.admit(&record("Main", 5999, frame_with_block(50, None))));
        assert!(!gate.admit(&record("Main", 6000, frame_with_block(50, None))));
    }

    #[test]
    fn test_cameras_have_independent_backgrounds() {
        let mut gate = MotionGate::new(MotionSettings::default());
        assert!(gate.admit(&record("Main", 0, frame_with_block(50, None))));
        assert!(gate.admit(&record("Back", 0, frame_with_block(200, None))));
        assert!(!gate.admit(&record("Main", 100, frame_with_block(50, None))));
        assert!(!gate.admit(&record("Back", 100, frame_with_block(200, None))));
        assert_eq!(gate.tracked_cameras(), 2);
    }

    #[test]
    fn test_resolution_change_reseeds() {
        let mut gate = MotionGate::new(MotionSettings::default());
        gate.admit(&record("Main", 0, frame_with_block(50, None)));
        let small = Frame::new(vec![50; 100 * 100 * 3], 100, 100, 3);
        assert!(gate.admit(&record("Main", 100, small.clone())));
        assert!(!gate.admit(&record("Main", 200, small)));
    }

    #[test]
    fn test_region_search_uses_diagonal_neighbours() {
        // 3x3 diagonal line: three pixels only connected through corners.
        let mask = vec![true, false, false, false, true, false, false, false, true];
        assert!(has_region_larger_than(&mask, 3, 3, 2));
        assert!(!has_region_larger_than(&mask, 3, 3, 3));
    }

    #[test]
    fn test_downsampled_gray_uses_luma_weights() {
        let frame = Frame::new([255, 0, 0].repeat(25), 5, 5, 3);
        let gray = downsampled_gray(&frame, 5);
        assert_eq!(gray.dim(), (1, 1));
        approx::assert_relative_eq!(gray[[0, 0]], 0.299 * 255.0, epsilon = 1e-3);
    }
}
