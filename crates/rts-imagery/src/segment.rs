//! Interface to promptable segmentation models.
//!
//! Models themselves live outside this crate; a labeling front end implements
//! [`Segmenter`] and hands tiles to it through [`run_segmenter`].

use crate::raster::PixelArray;
use crate::{ImageryError, Result};
use tracing::debug;

/// A user hint in pixel coordinates of the tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prompt {
    /// A click; `positive` marks the slump, otherwise background.
    Point { x: f64, y: f64, positive: bool },
    /// A bounding box from `(x0, y0)` to `(x1, y1)`.
    Box { x0: f64, y0: f64, x1: f64, y1: f64 },
}

/// Binary mask, row-major, 1 for the segmented object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl Mask {
    /// Number of set pixels.
    pub fn area(&self) -> usize {
        self.data.iter().filter(|v| **v != 0).count()
    }
}

/// A model that turns a tile and prompts into a mask.
pub trait Segmenter {
    fn segment(&mut self, tile: &PixelArray, prompts: &[Prompt]) -> Result<Mask>;
}

/// Run `segmenter` and check the mask covers the tile exactly.
pub fn run_segmenter<S: Segmenter + ?Sized>(segmenter: &mut S, tile: &PixelArray, prompts: &[Prompt]) -> Result<Mask> {
    let mask = segmenter.segment(tile, prompts)?;
    if mask.height != tile.height() || mask.width != tile.width() || mask.data.len() != mask.height * mask.width {
        return Err(ImageryError::ShapeMismatch {
            expected_height: tile.height(),
            expected_width: tile.width(),
            height: mask.height,
            width: mask.width,
        });
    }
    debug!("Segmenter returned mask with {} pixel(s) set", mask.area());
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Samples;

    /// Marks a square around each positive point.
    struct SquareSegmenter {
        radius: usize,
    }

    impl Segmenter for SquareSegmenter {
        fn segment(&mut self, tile: &PixelArray, prompts: &[Prompt]) -> Result<Mask> {
            let (h, w) = (tile.height(), tile.width());
            let mut data = vec![0u8; h * w];
            for prompt in prompts {
                if let Prompt::Point { x, y, positive: true } = *prompt {
                    let (cx, cy) = (x as usize, y as usize);
                    for row in cy.saturating_sub(self.radius)..(cy + self.radius + 1).min(h) {
                        for col in cx.saturating_sub(self.radius)..(cx + self.radius + 1).min(w) {
                            data[row * w + col] = 1;
                        }
                    }
                }
            }
            Ok(Mask { height: h, width: w, data })
        }
    }

    struct WrongShape;

    impl Segmenter for WrongShape {
        fn segment(&mut self, _tile: &PixelArray, _prompts: &[Prompt]) -> Result<Mask> {
            Ok(Mask {
                height: 1,
                width: 1,
                data: vec![1],
            })
        }
    }

    fn tile() -> PixelArray {
        PixelArray::new(3, 8, 10, Samples::U8(vec![7; 240])).unwrap()
    }

    #[test]
    fn test_point_prompt_mask() {
        let prompts = [
            Prompt::Point {
                x: 5.0,
                y: 4.0,
                positive: true,
            },
            Prompt::Point {
                x: 0.0,
                y: 0.0,
                positive: false,
            },
        ];
        let mask = run_segmenter(&mut SquareSegmenter { radius: 1 }, &tile(), &prompts).unwrap();
        assert_eq!((mask.height, mask.width), (8, 10));
        assert_eq!(mask.area(), 9);
        assert_eq!(mask.data[4 * 10 + 5], 1);
        assert_eq!(mask.data[0], 0);
    }

    #[test]
    fn test_shape_mismatch() {
        let boxed = [Prompt::Box {
            x0: 0.0,
            y0: 0.0,
            x1: 5.0,
            y1: 5.0,
        }];
        match run_segmenter(&mut WrongShape, &tile(), &boxed) {
            Err(ImageryError::ShapeMismatch {
                expected_height,
                expected_width,
                height,
                width,
            }) => assert_eq!((expected_height, expected_width, height, width), (8, 10, 1, 1)),
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }
}
