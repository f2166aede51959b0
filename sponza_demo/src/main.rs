//! Sponza-style walkthrough on the headless device
//!
//! Flies a scripted camera through a hall of columns lit by scattered point
//! lights, running the full deferred frame every step and logging frame
//! statistics as it goes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::{ArgAction, Parser};
use deferred_engine::config::ConfigError;
use deferred_engine::foundation::logging;
use deferred_engine::prelude::*;
use deferred_engine::render::api::{MeshHandle, UniformValue};
use deferred_engine::render::primitives::Mesh;
use thiserror::Error;

const FIXED_DT: f32 = 1.0 / 60.0;
const LIGHT_SEED: u64 = 0x5e0a;
const STATS_INTERVAL: u32 = 60;

/// Camera walk: each step holds one movement for a number of frames
const WALK: &[(MoveType, u32)] = &[
    (MoveType::Forward, 120),
    (MoveType::YawLeft, 60),
    (MoveType::Forward, 90),
    (MoveType::Up, 30),
    (MoveType::PitchDown, 20),
    (MoveType::YawRight, 120),
    (MoveType::Backward, 60),
    (MoveType::Right, 40),
];

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

fn parse_quality(value: &str) -> Result<QualityPreset, String> {
    QualityPreset::from_str(value).map_err(|e| e.to_string())
}

/// Clustered deferred walkthrough rendered on the headless device
#[derive(Debug, Parser)]
#[command(name = "sponza_demo", version)]
struct Args {
    /// Quality preset: low or high
    #[arg(long, default_value = "low", value_parser = parse_quality, conflicts_with = "config")]
    quality: QualityPreset,

    /// Application config file (.toml or .ron)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frames to render; defaults to one pass of the camera walk
    #[arg(long, value_name = "N")]
    frames: Option<u32>,

    /// Draw a marker at every visible light
    #[arg(long, action = ArgAction::SetTrue)]
    markers: bool,
}

/// Floor slab plus two rows of columns along the hall
fn hall_transforms() -> Vec<Mat4> {
    let mut transforms = vec![
        Mat4::new_translation(&Vec3::new(0.0, -0.5, 0.0)) * Mat4::new_nonuniform_scaling(&Vec3::new(250.0, 1.0, 250.0)),
    ];
    for row in [-20.0_f32, 20.0] {
        for step in 0..8 {
            let z = -87.5 + 25.0 * step as f32;
            transforms.push(
                Mat4::new_translation(&Vec3::new(row, 15.0, z))
                    * Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 30.0, 2.0)),
            );
        }
    }
    transforms
}

fn walk_step(frame: u32) -> MoveType {
    let total: u32 = WALK.iter().map(|(_, frames)| frames).sum();
    let mut at = frame % total;
    for &(movement, frames) in WALK {
        if at < frames {
            return movement;
        }
        at -= frames;
    }
    MoveType::Forward
}

struct Demo {
    device: HeadlessDevice,
    pipeline: DeferredPipeline,
    overlay: Option<DebugOverlay>,
    camera: Camera,
    lights: LightSet,
    cube: MeshHandle,
    hall: Vec<Mat4>,
}

impl Demo {
    fn new(config: &ApplicationConfig, markers: bool) -> Result<Self, DemoError> {
        let surface = Extent2D::from(config.surface_size);
        let mut device = HeadlessDevice::new(surface);

        log::info!("Creating deferred pipeline at {}x{}...", surface.width, surface.height);
        let mut pipeline = DeferredPipeline::new(config.render.clone())?;
        pipeline.init(&mut device)?;

        let overlay = if markers {
            log::info!("Light markers enabled");
            Some(DebugOverlay::new(&mut device, &config.render.shaders)?)
        } else {
            None
        };

        let lights = LightSet::scatter(config.light_count, LIGHT_SEED);
        log::info!("Scattered {} point lights", lights.len());

        let cube = device.create_mesh(&Mesh::cube())?;
        let mut camera = Camera::new(Vec3::new(0.0, 8.0, 90.0));
        camera.look_at(Vec3::new(0.0, 8.0, 0.0));

        Ok(Self { device, pipeline, overlay, camera, lights, cube, hall: hall_transforms() })
    }

    fn render_frame(&mut self) -> RenderResult<()> {
        let device = &mut self.device;
        let pipeline = &mut self.pipeline;
        let camera = &self.camera;

        pipeline.cull_lights(device, camera, &self.lights)?;
        pipeline.pre_render_checks(device)?;

        let geometry = pipeline.begin_gbuffer_render(device)?;
        device.set_uniform(geometry, "view", UniformValue::Mat4(*camera.view()))?;
        device.set_uniform(geometry, "projection", UniformValue::Mat4(*camera.projection()))?;
        for model in &self.hall {
            device.set_uniform(geometry, "model", UniformValue::Mat4(*model))?;
            device.draw_mesh(self.cube)?;
        }
        pipeline.end_gbuffer_render(device)?;

        pipeline.ssao_pass(device, camera.projection())?;

        let lighting = pipeline.begin_lighting_pass(device)?;
        device.set_uniform(lighting, "zNear", UniformValue::Float(camera.near))?;
        device.set_uniform(lighting, "zFar", UniformValue::Float(camera.far))?;
        device.set_uniform(lighting, "view", UniformValue::Mat4(*camera.view()))?;
        pipeline.end_lighting_pass(device)?;

        pipeline.hdr_pass(device)?;

        if let Some(overlay) = &self.overlay {
            overlay.show_light_positions(device, pipeline, camera)?;
        }
        Ok(())
    }

    fn shutdown(self) {
        let Self { mut device, pipeline, overlay, cube, .. } = self;
        drop(overlay);
        drop(pipeline);
        let released = device.collect_released();
        device.destroy_mesh(cube);
        log::info!("Released {released} GPU resources, {} still live", device.live_resource_count());
    }
}

fn run(args: Args) -> Result<(), DemoError> {
    let config = match &args.config {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => ApplicationConfig::default().with_preset(args.quality),
    };
    config.validate()?;
    logging::init_with_default(&config.log_level);

    log::info!("Starting {}", config.application_name);
    let frames = args.frames.unwrap_or_else(|| WALK.iter().map(|(_, frames)| frames).sum());
    let mut demo = Demo::new(&config, args.markers)?;
    let mut timer = Timer::new();
    let resize_at = frames / 2;

    for frame in 0..frames {
        timer.update();

        if frame == resize_at && frame > 0 {
            let (width, height) = config.surface_size;
            let resized = Extent2D::new(width * 3 / 4, height * 3 / 4);
            log::info!("Resizing surface to {}x{}", resized.width, resized.height);
            demo.device.resize(resized);
        }

        demo.camera.process_keyboard(walk_step(frame), FIXED_DT);
        demo.camera.update_matrices(demo.device.surface_extent());
        demo.render_frame()?;

        if (frame + 1) % STATS_INTERVAL == 0 {
            let dropped = demo.pipeline.read_cluster_overflow(&mut demo.device)?;
            if dropped > 0 {
                log::warn!("{dropped} lights did not fit their clusters");
            }
            log::info!(
                "frame {} ({:.2} ms): {}",
                frame + 1,
                timer.delta_time() * 1000.0,
                demo.pipeline.stats()
            );
        }
    }

    log::info!(
        "Rendered {} frames at {:.1} fps average",
        demo.pipeline.frames_rendered(),
        timer.average_fps()
    );
    let hazards = demo.device.hazards();
    if hazards.is_empty() {
        log::info!("No storage hazards recorded");
    } else {
        for hazard in hazards {
            log::warn!("Storage hazard: {hazard:?}");
        }
    }

    demo.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_defaults_to_low_quality() {
        let args = Args::try_parse_from(["sponza_demo"]).unwrap();
        assert_eq!(args.quality, QualityPreset::Low);
        assert!(args.config.is_none());
        assert!(args.frames.is_none());
        assert!(!args.markers);
    }

    #[test]
    fn test_flags_are_parsed() {
        let args =
            Args::try_parse_from(["sponza_demo", "--quality", "high", "--frames", "30", "--markers"]).unwrap();
        assert_eq!(args.quality, QualityPreset::High);
        assert_eq!(args.frames, Some(30));
        assert!(args.markers);
    }

    #[test]
    fn test_unknown_quality_is_rejected() {
        let err = Args::try_parse_from(["sponza_demo", "--quality", "ultra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_quality_conflicts_with_config_file() {
        let err = Args::try_parse_from(["sponza_demo", "--config", "demo.toml", "--quality", "high"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);

        let args = Args::try_parse_from(["sponza_demo", "--config", "demo.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("demo.toml")));
    }

    #[test]
    fn test_walk_cycles_through_every_step() {
        let total: u32 = WALK.iter().map(|(_, frames)| frames).sum();
        assert_eq!(walk_step(0), WALK[0].0);
        assert_eq!(walk_step(WALK[0].1), WALK[1].0);
        assert_eq!(walk_step(total), WALK[0].0);
    }
}
