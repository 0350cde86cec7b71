//! Run the full pipeline on a synthetic scripted scene: one object crossing
//! the frame with a constant-depth wall behind it.

use ndarray::Array2;
use perception::{
    BoundingBox2D, CameraIntrinsics, ImageData, ImageFormat, PerceptionPipeline, PipelineConfig,
    PipelineMode, ScriptedDetector,
};

fn main() -> perception::Result<()> {
    env_logger::init();

    let frames = (0..20)
        .map(|i| vec![vec![BoundingBox2D::new(100.0 + 12.0 * i as f32, 240.0, 80.0, 120.0, 0.9, 0)]])
        .collect();
    let detector = ScriptedDetector::new(1, frames);

    let mut config = PipelineConfig {
        mode: PipelineMode::InImage,
        ..Default::default()
    };
    config.detection.image_rows = 640;
    config.detection.image_cols = 640;
    config.rejection.min_bbox_width = 10.0;
    config.rejection.min_bbox_height = 10.0;

    let mut pipeline = PerceptionPipeline::new(config, Box::new(detector))?;
    pipeline.update_camera_parameters(CameraIntrinsics {
        fx: 500.0,
        fy: 500.0,
        cx: 320.0,
        cy: 240.0,
        distortion: vec![0.0; 5],
    });

    let image = ImageData::new(vec![0; 640 * 640 * 3], 640, 640, ImageFormat::Rgb);
    let depth = Array2::from_elem((640, 640), 3.0f32);

    for i in 0..20 {
        let output = pipeline.process_frame(&image, Some(depth.view()), i as f64 / 30.0)?;
        for (id, state) in &output.tracks[0] {
            let position = output.track_positions[0].get(id);
            println!(
                "frame {i:2}: track {id} at ({:6.1}, {:6.1}) vx={:6.1} position={position:?}",
                state[0], state[1], state[2]
            );
        }
    }
    Ok(())
}
