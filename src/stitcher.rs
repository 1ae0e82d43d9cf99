use image::{GrayImage, ImageBuffer};
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    enums::Orientation,
    volume::Shape,
    window_planner::{WindowPosition, row_spans},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StitchError {
    #[error("Window labels hold {actual} values, crop {crop} needs {expected}")]
    LengthMismatch {
        crop: Shape,
        expected: usize,
        actual: usize,
    },
}

/// Full-volume map of one class label per voxel.
///
/// Windows are written in the order they arrive and a later window
/// overwrites whatever an earlier one left in the overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelVolume {
    data: Array3<u8>,
}

impl LabelVolume {
    /// Every voxel starts as label 0.
    pub fn new(shape: Shape) -> Self {
        Self {
            data: Array3::zeros(shape.dim()),
        }
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn shape(&self) -> Shape {
        self.dim().into()
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn into_array(self) -> Array3<u8> {
        self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data
            .as_slice()
            .expect("label volume is stored in standard layout")
    }

    /// Write one window's decoded labels at `position`.
    ///
    /// Uses the same clipping as extraction: per row only
    /// `min(crop.width, width - position.x)` labels are copied and rows past
    /// the far z/y edges are skipped.
    pub fn stitch(
        &mut self,
        position: WindowPosition,
        labels: &[u8],
        crop: Shape,
    ) -> Result<(), StitchError> {
        if labels.len() != crop.len() {
            return Err(StitchError::LengthMismatch {
                crop,
                expected: crop.len(),
                actual: labels.len(),
            });
        }
        let shape = self.shape();
        let dst = self
            .data
            .as_slice_mut()
            .expect("label volume is stored in standard layout");
        for span in row_spans(shape, position, crop) {
            dst[span.volume_offset..span.volume_offset + span.len]
                .copy_from_slice(&labels[span.window_offset..span.window_offset + span.len]);
        }
        Ok(())
    }

    pub fn slice(&self, index: usize, orientation: Orientation) -> Option<ArrayView2<'_, u8>> {
        let (depth, height, width) = self.dim();
        let view = match orientation {
            Orientation::Axial if index < depth => self.data.slice(s![index, .., ..]),
            Orientation::Coronal if index < height => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal if index < width => self.data.slice(s![.., .., index]),
            _ => return None,
        };
        Some(view)
    }

    /// Render one plane as grayscale, spreading the labels present in the
    /// volume over the full 8-bit range.
    pub fn slice_image(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.slice(index, orientation)?;
        let (height, width) = slice.dim();
        let max_label = self.data.iter().copied().max().unwrap_or(0).max(1);
        let scale = u8::MAX / max_label;
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&label| label.saturating_mul(scale))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    /// Voxel count per label, indexed by label up to the largest one present.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        for &label in &self.data {
            let label = usize::from(label);
            if counts.len() <= label {
                counts.resize(label + 1, 0);
            }
            counts[label] += 1;
        }
        counts
    }
}

impl From<LabelVolume> for Vec<u8> {
    fn from(labels: LabelVolume) -> Self {
        let (raw, _offset) = labels.data.into_raw_vec_and_offset();
        raw
    }
}
