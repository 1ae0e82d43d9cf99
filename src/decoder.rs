use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Score block needs batch and class axes, got {0} dimension(s)")]
    MissingClassAxis(usize),

    #[error("Score block has no classes")]
    NoClasses,

    #[error("{0} classes do not fit in an 8-bit label")]
    TooManyClasses(usize),

    #[error("Score block holds {actual} values, dims {dims:?} need {expected}")]
    LengthMismatch {
        dims: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

/// Reduce `(batch, classes, ...spatial)` scores to one class per voxel.
///
/// For voxel `i` the label is the `c` maximizing `scores[c * n + i]`, with
/// `n` the spatial size. Comparison is strict, so ties resolve to the lowest
/// class index. Only the first batch item is decoded.
pub fn decode_argmax(scores: &[f32], dims: &[usize]) -> Result<Vec<u8>, DecodeError> {
    let [_batch, num_classes, spatial @ ..] = dims else {
        return Err(DecodeError::MissingClassAxis(dims.len()));
    };
    let num_classes = *num_classes;
    if num_classes == 0 {
        return Err(DecodeError::NoClasses);
    }
    if num_classes > usize::from(u8::MAX) + 1 {
        return Err(DecodeError::TooManyClasses(num_classes));
    }
    let expected: usize = dims.iter().product();
    if scores.len() != expected {
        return Err(DecodeError::LengthMismatch {
            dims: dims.to_vec(),
            expected,
            actual: scores.len(),
        });
    }

    let spatial_size: usize = spatial.iter().product();
    let labels = (0..spatial_size)
        .into_par_iter()
        .map(|idx| {
            let mut max_score = scores[idx];
            let mut max_class = 0;
            for class in 1..num_classes {
                let score = scores[class * spatial_size + idx];
                if score > max_score {
                    max_score = score;
                    max_class = class;
                }
            }
            max_class as u8
        })
        .collect();
    Ok(labels)
}
