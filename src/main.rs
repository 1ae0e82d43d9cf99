use std::{env, error::Error, fs};

use tracing::info;
use tracing_subscriber::EnvFilter;
use volume_segmenter::{
    ClassScoreBlock, InferenceError, InferenceSession, ModelRuntime, Orientation, PipelineConfig,
    ProgressEvent, Shape, Volume, WindowTensor, segment_volume,
};

/// Two-class stand-in model: background scores `1 - v`, foreground `v`.
struct IntensityRuntime;

struct IntensitySession;

impl ModelRuntime for IntensityRuntime {
    type Session = IntensitySession;

    async fn load(&self, model: &str) -> Result<IntensitySession, InferenceError> {
        info!(model, "Using built-in intensity model");
        Ok(IntensitySession)
    }
}

impl InferenceSession for IntensitySession {
    async fn run(&mut self, tensor: &WindowTensor) -> Result<ClassScoreBlock, InferenceError> {
        let voxels = tensor.as_slice();
        let crop = tensor.crop_dims();
        let scores = voxels
            .iter()
            .map(|v| 1.0 - v)
            .chain(voxels.iter().copied())
            .collect();
        Ok(ClassScoreBlock::new(
            scores,
            vec![1, 2, crop.depth, crop.height, crop.width],
        ))
    }
}

fn phantom(size: usize) -> Result<Volume, Box<dyn Error>> {
    let shape = Shape::cube(size);
    let center = size as f32 / 2.0;
    let radius = size as f32 / 3.0;
    let voxels: Vec<u8> = (0..shape.len())
        .map(|i| {
            let (z, y, x) = (i / (size * size), (i / size) % size, i % size);
            let d2 = [z, y, x]
                .iter()
                .map(|&c| (c as f32 - center).powi(2))
                .sum::<f32>();
            if d2 <= radius * radius { 200 } else { 20 }
        })
        .collect();
    Ok(Volume::from_u8(shape, &voxels)?)
}

async fn run<R: ModelRuntime>(
    runtime: &R,
    volume: &Volume,
    config: &PipelineConfig,
) -> Result<(), Box<dyn Error>> {
    let labels = segment_volume(runtime, volume, config, |event| match event {
        ProgressEvent::Window(progress) => info!(
            window = progress.index,
            total = progress.total,
            percent = f64::from(progress.percent()),
            "Window done"
        ),
        ProgressEvent::Finished(labels) => {
            info!(counts = ?labels.class_counts(), "Segmentation finished")
        }
    })
    .await?;

    let center = labels.dim().0 / 2;
    let image = labels
        .slice_image(center, Orientation::Axial)
        .ok_or("volume has no axial slice to render")?;
    image.save("labels.png")?;
    info!(slice = center, "Saved labels.png");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => serde_json::from_str::<PipelineConfig>(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    let volume = phantom(128)?;

    #[cfg(feature = "onnx")]
    if let Some(model) = args.next() {
        let config = config.with_model(model);
        return run(&volume_segmenter::onnx::OnnxRuntime::default(), &volume, &config).await;
    }

    run(&IntensityRuntime, &volume, &config).await
}
