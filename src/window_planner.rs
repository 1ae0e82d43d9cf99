use crate::{config::ConfigError, enums::EdgeCoverage, volume::Shape};

/// Minimum corner of a window in voxel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowPosition {
    pub z: usize,
    pub y: usize,
    pub x: usize,
}

impl WindowPosition {
    pub const fn new(z: usize, y: usize, x: usize) -> Self {
        Self { z, y, x }
    }
}

impl From<(usize, usize, usize)> for WindowPosition {
    fn from((z, y, x): (usize, usize, usize)) -> Self {
        Self::new(z, y, x)
    }
}

/// One contiguous x-run shared by a volume and a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    /// Flat offset of the run's first voxel in the volume.
    pub volume_offset: usize,
    /// Flat offset of the run's first voxel in the window buffer.
    pub window_offset: usize,
    pub len: usize,
}

/// Rows of the window at `position` that lie inside `shape`.
///
/// Each row is clipped to `min(crop.width, shape.width - position.x)`
/// voxels; slices and rows past the far z/y edges are skipped. Extraction
/// and stitching both walk these spans, so window cells outside the volume
/// are never read or written.
pub fn row_spans(
    shape: Shape,
    position: WindowPosition,
    crop: Shape,
) -> impl Iterator<Item = RowSpan> {
    let row_len = crop.width.min(shape.width.saturating_sub(position.x));
    (0..crop.depth)
        .filter(move |dz| position.z + dz < shape.depth)
        .flat_map(move |dz| {
            (0..crop.height)
                .filter(move |dy| position.y + dy < shape.height)
                .map(move |dy| RowSpan {
                    volume_offset: shape.index(position.z + dz, position.y + dy, position.x),
                    window_offset: crop.index(dz, dy, 0),
                    len: row_len,
                })
        })
        .filter(|span| span.len > 0)
}

fn axis_origins(axis_len: usize, crop: usize, step: usize, coverage: EdgeCoverage) -> Vec<usize> {
    if axis_len < crop {
        return Vec::new();
    }
    let last = axis_len - crop;
    let mut origins: Vec<usize> = (0..=last).step_by(step).collect();
    if coverage == EdgeCoverage::AlignFinalWindow && origins.last() != Some(&last) {
        origins.push(last);
    }
    origins
}

/// Plans window origins over a volume: z outermost, then y, then x.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    crop_size: usize,
    step_size: usize,
    coverage: EdgeCoverage,
}

impl WindowPlanner {
    pub fn new(
        crop_size: usize,
        step_size: usize,
        coverage: EdgeCoverage,
    ) -> Result<Self, ConfigError> {
        if crop_size == 0 {
            return Err(ConfigError::ZeroCropSize);
        }
        if step_size == 0 {
            return Err(ConfigError::ZeroStepSize);
        }
        Ok(Self {
            crop_size,
            step_size,
            coverage,
        })
    }

    pub fn crop_dims(&self) -> Shape {
        Shape::cube(self.crop_size)
    }

    /// An axis shorter than the crop contributes no origins, which leaves the
    /// whole plan empty.
    pub fn plan(&self, shape: Shape) -> Vec<WindowPosition> {
        let origins =
            |len| axis_origins(len, self.crop_size, self.step_size, self.coverage);
        let (zs, ys, xs) = (
            origins(shape.depth),
            origins(shape.height),
            origins(shape.width),
        );

        let mut positions = Vec::with_capacity(zs.len() * ys.len() * xs.len());
        for &z in &zs {
            for &y in &ys {
                for &x in &xs {
                    positions.push(WindowPosition::new(z, y, x));
                }
            }
        }
        positions
    }
}

pub fn plan_windows(
    shape: Shape,
    crop_size: usize,
    step_size: usize,
) -> Result<Vec<WindowPosition>, ConfigError> {
    Ok(WindowPlanner::new(crop_size, step_size, EdgeCoverage::Truncate)?.plan(shape))
}
