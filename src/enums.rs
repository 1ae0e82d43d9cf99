use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// How the planner treats the far edge of an axis whose length is not
/// reached exactly by stepping from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeCoverage {
    /// Stop at the last stepped origin that still fits. A trailing strip of
    /// up to `step - 1` voxels may be left without any window.
    #[default]
    Truncate,
    /// Append one extra origin at `axis_len - crop` when stepping misses it,
    /// so every voxel falls inside at least one window.
    AlignFinalWindow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}
