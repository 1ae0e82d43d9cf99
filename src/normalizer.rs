use ndarray::Array3;
use rayon::prelude::*;

use crate::volume::{Shape, Volume, VolumeError};

/// Assumed intensity range of incoming voxels (8-bit dynamic range).
pub const SOURCE_MIN: f32 = 0.0;
pub const SOURCE_MAX: f32 = 255.0;

/// Input range expected by the segmentation model.
pub const TARGET_MIN: f32 = 0.0;
pub const TARGET_MAX: f32 = 1.0;

/// Affine map from the source range onto `[0, 1]`, clamped at both ends.
/// Values outside the source range are clamped rather than rejected. NaN
/// maps to the lower bound.
#[inline]
pub fn normalize_value(value: f32) -> f32 {
    if value.is_nan() {
        return TARGET_MIN;
    }
    let scaled = ((value - SOURCE_MIN) / (SOURCE_MAX - SOURCE_MIN)) * (TARGET_MAX - TARGET_MIN)
        + TARGET_MIN;
    scaled.clamp(TARGET_MIN, TARGET_MAX)
}

pub fn normalize(voxels: &[f32]) -> Result<Vec<f32>, VolumeError> {
    if voxels.is_empty() {
        return Err(VolumeError::MissingInput);
    }
    Ok(voxels.par_iter().map(|&v| normalize_value(v)).collect())
}

/// A [`Volume`] whose intensities have been mapped into `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedVolume {
    data: Array3<f32>,
}

impl NormalizedVolume {
    pub fn from_volume(volume: &Volume) -> Result<Self, VolumeError> {
        if volume.is_empty() {
            return Err(VolumeError::MissingInput);
        }
        let mut data = volume.data().clone();
        data.par_mapv_inplace(normalize_value);
        Ok(Self { data })
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn shape(&self) -> Shape {
        self.dim().into()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("normalized volume is stored in standard layout")
    }
}

impl TryFrom<&Volume> for NormalizedVolume {
    type Error = VolumeError;

    fn try_from(volume: &Volume) -> Result<Self, Self::Error> {
        Self::from_volume(volume)
    }
}
