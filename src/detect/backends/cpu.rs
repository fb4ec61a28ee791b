use anyhow::Result;

use crate::detect::backend::RegionClassifier;
use crate::detect::result::{BoundingBox, Region};
use crate::frame::Frame;

const GRID_COLS: u32 = 8;
const GRID_ROWS: u32 = 6;
/// Luma difference that maps to full confidence.
const CONTRAST_SPAN: f32 = 128.0;
const SAMPLE_STEP: u32 = 2;

/// CPU backend: flags grid cells that stand out from the scene background.
///
/// Splits the frame into a coarse grid, takes the mean luma per cell and scores
/// every cell by its distance from the median cell. A cheap stand-in for a real
/// person classifier, good enough for high-contrast test scenes.
#[derive(Clone, Debug, Default)]
pub struct ContrastClassifier;

impl ContrastClassifier {
    pub fn new() -> Self {
        Self
    }

    fn cell_means(frame: &Frame) -> Vec<f32> {
        let (width, height) = (frame.width(), frame.height());
        let mut means = Vec::with_capacity((GRID_COLS * GRID_ROWS) as usize);
        for row in 0..GRID_ROWS {
            let (y0, y1) = (row * height / GRID_ROWS, (row + 1) * height / GRID_ROWS);
            for col in 0..GRID_COLS {
                let (x0, x1) = (col * width / GRID_COLS, (col + 1) * width / GRID_COLS);
                let mut sum = 0u64;
                let mut count = 0u64;
                for y in (y0..y1).step_by(SAMPLE_STEP as usize) {
                    for x in (x0..x1).step_by(SAMPLE_STEP as usize) {
                        if let Some(luma) = frame.luma_at(x, y) {
                            sum += luma as u64;
                            count += 1;
                        }
                    }
                }
                means.push(if count == 0 { 0.0 } else { sum as f32 / count as f32 });
            }
        }
        means
    }
}

impl RegionClassifier for ContrastClassifier {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Vec<Region>> {
        frame.validate()?;
        if frame.width() < GRID_COLS || frame.height() < GRID_ROWS {
            return Ok(Vec::new());
        }

        let means = Self::cell_means(frame);
        let mut sorted = means.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let background = sorted[sorted.len() / 2];

        let cell_w = 1.0 / GRID_COLS as f32;
        let cell_h = 1.0 / GRID_ROWS as f32;
        let regions = means
            .iter()
            .enumerate()
            .filter_map(|(i, &mean)| {
                let confidence = ((mean - background).abs() / CONTRAST_SPAN).min(1.0);
                if confidence <= 0.0 {
                    return None;
                }
                let (col, row) = (i as u32 % GRID_COLS, i as u32 / GRID_COLS);
                Some(Region::new(confidence).with_bounds(BoundingBox {
                    x: col as f32 * cell_w,
                    y: row as f32 * cell_h,
                    w: cell_w,
                    h: cell_h,
                }))
            })
            .collect();
        Ok(regions)
    }
}
