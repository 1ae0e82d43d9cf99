use std::fmt;

use ndarray::Array3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VolumeError {
    #[error("Missing input data")]
    MissingInput,

    #[error("Invalid image dimensions: need at least 3 spatial dimensions, got {0}")]
    InvalidDimensions(usize),

    #[error("Voxel count {actual} does not match shape {shape} ({expected} voxels)")]
    LengthMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },
}

/// Spatial extent of a volume or window, `(depth, height, width)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub const fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    pub const fn cube(size: usize) -> Self {
        Self::new(size, size, size)
    }

    /// Build a shape from a descriptor whose last three entries are
    /// `(depth, height, width)`. Leading entries (time, channels) are
    /// ignored and a zero extent is read as 1.
    pub fn from_dims(dims: &[usize]) -> Result<Self, VolumeError> {
        let [depth, height, width] = match dims {
            [.., d, h, w] => [*d, *h, *w],
            _ => return Err(VolumeError::InvalidDimensions(dims.len())),
        };
        Ok(Self::new(depth.max(1), height.max(1), width.max(1)))
    }

    pub const fn len(&self) -> usize {
        self.depth * self.height * self.width
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn dim(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }

    /// Row-major flat offset of voxel `(z, y, x)`.
    #[inline]
    pub const fn index(&self, z: usize, y: usize, x: usize) -> usize {
        z * self.height * self.width + y * self.width + x
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((depth, height, width): (usize, usize, usize)) -> Self {
        Self::new(depth, height, width)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.depth, self.height, self.width)
    }
}

/// Anything that can hand over decoded voxels plus a shape descriptor.
pub trait VolumeSource {
    fn voxels(&self) -> Option<&[f32]>;

    /// Shape descriptor; the last three entries are `(depth, height, width)`.
    fn dims(&self) -> &[usize];
}

/// Plain in-memory [`VolumeSource`].
#[derive(Debug, Clone, Default)]
pub struct RawVolume {
    pub voxels: Option<Vec<f32>>,
    pub dims: Vec<usize>,
}

impl VolumeSource for RawVolume {
    fn voxels(&self) -> Option<&[f32]> {
        self.voxels.as_deref()
    }

    fn dims(&self) -> &[usize] {
        &self.dims
    }
}

/// Raw intensities laid out z-major, then y, then x.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl Volume {
    pub fn new(data: Array3<f32>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self { data }
    }

    pub fn from_shape_vec(shape: Shape, voxels: Vec<f32>) -> Result<Self, VolumeError> {
        if voxels.is_empty() {
            return Err(VolumeError::MissingInput);
        }
        let mismatch = VolumeError::LengthMismatch {
            shape,
            expected: shape.len(),
            actual: voxels.len(),
        };
        if voxels.len() != shape.len() {
            return Err(mismatch);
        }
        Array3::from_shape_vec(shape.dim(), voxels)
            .map(Self::new)
            .map_err(|_| mismatch)
    }

    pub fn from_source(source: &impl VolumeSource) -> Result<Self, VolumeError> {
        let voxels = source
            .voxels()
            .filter(|voxels| !voxels.is_empty())
            .ok_or(VolumeError::MissingInput)?;
        let shape = Shape::from_dims(source.dims())?;
        Self::from_shape_vec(shape, voxels.to_vec())
    }

    pub fn from_u8(shape: Shape, voxels: &[u8]) -> Result<Self, VolumeError> {
        Self::from_shape_vec(shape, voxels.iter().map(|&v| f32::from(v)).collect())
    }

    pub fn from_u16(shape: Shape, voxels: &[u16]) -> Result<Self, VolumeError> {
        Self::from_shape_vec(shape, voxels.iter().map(|&v| f32::from(v)).collect())
    }

    /// Get the dimensions of the volume (depth, height, width)
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
            .expect("volume is stored in standard layout")
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
