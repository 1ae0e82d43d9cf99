use ndarray::Array5;

use crate::{
    normalizer::NormalizedVolume,
    volume::Shape,
    window_planner::{WindowPosition, row_spans},
};

/// Model input for one window, shaped `(1, 1, depth, height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTensor {
    data: Array5<f32>,
}

impl WindowTensor {
    pub fn zeros(crop: Shape) -> Self {
        Self {
            data: Array5::zeros((1, 1, crop.depth, crop.height, crop.width)),
        }
    }

    pub fn crop_dims(&self) -> Shape {
        let shape = self.data.shape();
        Shape::new(shape[2], shape[3], shape[4])
    }

    /// `[batch, channel, depth, height, width]`
    pub fn shape(&self) -> [usize; 5] {
        let (b, c, d, h, w) = self.data.dim();
        [b, c, d, h, w]
    }

    pub fn data(&self) -> &Array5<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array5<f32> {
        self.data
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("window tensor is stored in standard layout")
    }

    fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("window tensor is stored in standard layout")
    }
}

/// Copy the window at `position` out of `volume`.
///
/// Rows are copied to the same offset they occupy in the window. Cells that
/// fall outside the volume keep their zero fill; nothing is padded by wrap or
/// edge replication.
pub fn extract_window(
    volume: &NormalizedVolume,
    position: WindowPosition,
    crop: Shape,
) -> WindowTensor {
    let mut tensor = WindowTensor::zeros(crop);
    copy_window(
        volume.as_slice(),
        volume.shape(),
        position,
        crop,
        tensor.as_slice_mut(),
    );
    tensor
}

/// Flat-buffer form of [`extract_window`]; `dst` must hold `crop.len()` values.
pub fn copy_window(
    src: &[f32],
    shape: Shape,
    position: WindowPosition,
    crop: Shape,
    dst: &mut [f32],
) {
    for span in row_spans(shape, position, crop) {
        dst[span.window_offset..span.window_offset + span.len]
            .copy_from_slice(&src[span.volume_offset..span.volume_offset + span.len]);
    }
}
