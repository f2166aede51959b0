//! Frame scenarios for the deferred pipeline, run on the headless device

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::core::config::{ClusterSettings, QualityPreset, RenderConfig, Resolution, ShaderConfig};
    use crate::foundation::math::Vec3;
    use crate::render::api::{
        ClearFlags, Extent2D, FramebufferTarget, GpuDevice, MeshHandle, PolygonMode, UniformValue,
    };
    use crate::render::backends::headless::{Command, HeadlessDevice};
    use crate::render::lighting::LightSet;
    use crate::render::primitives::{Camera, Mesh};
    use crate::render::targets::TargetKind;
    use crate::render::{RenderError, RenderResult};

    const SURFACE: Extent2D = Extent2D { width: 1280, height: 720 };

    struct Scene {
        device: HeadlessDevice,
        pipeline: DeferredPipeline,
        camera: Camera,
        lights: LightSet,
        cube: MeshHandle,
    }

    fn scene(preset: QualityPreset) -> Scene {
        let config = RenderConfig::from_preset(preset)
            .with_clusters(ClusterSettings { grid: [6, 4, 8], ..ClusterSettings::default() })
            .with_shaders(ShaderConfig::new("resources/shaders"));

        let mut device = HeadlessDevice::new(SURFACE);
        let mut pipeline = DeferredPipeline::new(config).unwrap();
        pipeline.init(&mut device).unwrap();

        let mut camera = Camera::new(Vec3::new(0.0, 20.0, 60.0));
        camera.update_matrices(SURFACE);
        let cube = device.create_mesh(&Mesh::cube()).unwrap();

        Scene {
            device,
            pipeline,
            camera,
            lights: LightSet::scatter(96, 11),
            cube,
        }
    }

    impl Scene {
        fn render_frame(&mut self) -> RenderResult<()> {
            let device = &mut self.device;
            let pipeline = &mut self.pipeline;
            let camera = &self.camera;

            pipeline.cull_lights(device, camera, &self.lights)?;
            pipeline.pre_render_checks(device)?;

            let geometry = pipeline.begin_gbuffer_render(device)?;
            device.set_uniform(geometry, "view", UniformValue::Mat4(*camera.view()))?;
            device.set_uniform(geometry, "projection", UniformValue::Mat4(*camera.projection()))?;
            device.draw_mesh(self.cube)?;
            pipeline.end_gbuffer_render(device)?;

            pipeline.ssao_pass(device, camera.projection())?;

            let lighting = pipeline.begin_lighting_pass(device)?;
            device.set_uniform(lighting, "zNear", UniformValue::Float(camera.near))?;
            device.set_uniform(lighting, "zFar", UniformValue::Float(camera.far))?;
            device.set_uniform(lighting, "view", UniformValue::Mat4(*camera.view()))?;
            pipeline.end_lighting_pass(device)?;

            pipeline.hdr_pass(device)
        }
    }

    #[test]
    fn test_full_frame_is_hazard_free() {
        let mut scene = scene(QualityPreset::High);
        for _ in 0..3 {
            scene.render_frame().unwrap();
        }

        assert!(scene.device.hazards().is_empty());
        assert_eq!(scene.pipeline.frames_rendered(), 3);
        assert_eq!(scene.pipeline.stage(), FrameStage::Idle);
        assert_eq!(scene.device.bound_framebuffer(), FramebufferTarget::Default);

        let stats = *scene.pipeline.stats();
        assert_eq!(stats.total_lights, 96);
        assert!(stats.visible_lights > 0 && stats.visible_lights < 96);
        assert!(!stats.bounds_rebuilt);
        assert_eq!(stats.targets_recreated, 0);
        assert_eq!(stats.incomplete_framebuffers, 0);
    }

    #[test]
    fn test_uninitialized_pipeline_refuses_work() {
        let mut device = HeadlessDevice::new(SURFACE);
        let mut pipeline = DeferredPipeline::new(RenderConfig::default()).unwrap();

        assert_eq!(pipeline.pre_render_checks(&mut device).unwrap_err(), RenderError::NotInitialized);
        assert_eq!(pipeline.begin_gbuffer_render(&mut device).unwrap_err(), RenderError::NotInitialized);
        assert!(device.commands().is_empty());
        assert_eq!(device.live_resource_count(), 0);
    }

    #[test]
    fn test_double_init_is_rejected() {
        let mut scene = scene(QualityPreset::Low);
        let live = scene.device.live_resource_count();
        assert!(matches!(
            scene.pipeline.init(&mut scene.device),
            Err(RenderError::InitializationFailed(_))
        ));
        assert_eq!(scene.device.live_resource_count(), live);
    }

    #[test]
    fn test_out_of_order_calls_leave_device_untouched() {
        let mut scene = scene(QualityPreset::High);
        scene.device.take_commands();

        let err = scene.pipeline.begin_lighting_pass(&mut scene.device).unwrap_err();
        assert_eq!(
            err,
            RenderError::PassOrder {
                expected: "ssao done".to_string(),
                found: "idle".to_string(),
            }
        );
        assert!(scene.pipeline.begin_gbuffer_render(&mut scene.device).is_err());
        assert!(scene.pipeline.end_gbuffer_render(&mut scene.device).is_err());
        assert!(scene.pipeline.hdr_pass(&mut scene.device).is_err());
        let projection = *scene.camera.projection();
        assert!(scene.pipeline.ssao_pass(&mut scene.device, &projection).is_err());
        assert!(scene.device.commands().is_empty());
        assert_eq!(scene.pipeline.stage(), FrameStage::Idle);

        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        scene.pipeline.begin_gbuffer_render(&mut scene.device).unwrap();
        scene.device.take_commands();

        let camera = scene.camera.clone();
        let err = scene
            .pipeline
            .cull_lights(&mut scene.device, &camera, &scene.lights)
            .unwrap_err();
        assert!(matches!(err, RenderError::PassOrder { .. }));
        assert!(scene.pipeline.pre_render_checks(&mut scene.device).is_err());
        assert!(scene.device.commands().is_empty());
        assert_eq!(scene.pipeline.stage(), FrameStage::GeometryPass);
    }

    #[test]
    fn test_pre_render_checks_is_idempotent() {
        let mut scene = scene(QualityPreset::High);
        let first = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert!(first.is_noop());

        let events = scene.device.lifecycle().len();
        let second = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert!(second.is_noop());
        assert_eq!(scene.device.lifecycle().len(), events);
        assert_eq!(scene.pipeline.stats().targets_recreated, 0);
    }

    #[test]
    fn test_disabled_ssao_pass_is_a_noop() {
        let mut scene = scene(QualityPreset::Low);
        assert!(!scene.pipeline.config().ssao.enabled);

        let resources = scene.pipeline.resources().unwrap();
        let ssao_color = resources.ssao().unwrap().color(0).unwrap();
        let blur_color = resources.ssao_blur().unwrap().color(0).unwrap();
        let ssao_fb = resources.ssao().unwrap().framebuffer();

        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        scene.pipeline.begin_gbuffer_render(&mut scene.device).unwrap();
        scene.pipeline.end_gbuffer_render(&mut scene.device).unwrap();

        scene.device.take_commands();
        let projection = *scene.camera.projection();
        scene.pipeline.ssao_pass(&mut scene.device, &projection).unwrap();

        assert!(scene.device.commands().is_empty());
        assert_eq!(scene.device.texture_version(ssao_color), Some(0));
        assert_eq!(scene.device.texture_version(blur_color), Some(0));
        assert_eq!(scene.pipeline.stage(), FrameStage::SsaoDone);

        scene.pipeline.begin_lighting_pass(&mut scene.device).unwrap();
        scene.pipeline.end_lighting_pass(&mut scene.device).unwrap();
        scene.pipeline.hdr_pass(&mut scene.device).unwrap();
        assert!(!scene
            .device
            .commands()
            .contains(&Command::BindFramebuffer(FramebufferTarget::Offscreen(ssao_fb))));
    }

    #[test]
    fn test_enabled_ssao_writes_both_targets() {
        let mut scene = scene(QualityPreset::High);
        scene.render_frame().unwrap();

        let resources = scene.pipeline.resources().unwrap();
        let ssao = resources.ssao().unwrap();
        let blur = resources.ssao_blur().unwrap();
        assert_eq!(scene.device.texture_version(ssao.color(0).unwrap()), Some(2));
        assert_eq!(scene.device.texture_version(blur.color(0).unwrap()), Some(2));

        let program = scene.pipeline.program(ProgramKind::Ssao).unwrap();
        let settings = scene.pipeline.config().ssao;
        assert_eq!(scene.device.uniform(program, "kernelSize"), Some(UniformValue::Int(settings.samples)));
        assert_eq!(scene.device.uniform(program, "radius"), Some(UniformValue::Float(settings.radius)));
        assert_eq!(
            scene.device.uniform(program, "samples[63]"),
            Some(UniformValue::Vec3(scene.pipeline.ssao_kernel().samples()[63]))
        );
        assert_eq!(scene.device.uniform(program, "texNoise"), Some(UniformValue::Int(2)));
        assert_eq!(scene.device.viewport(), SURFACE);
    }

    #[test]
    fn test_lighting_pass_binds_gbuffer_and_blurred_ssao() {
        let mut scene = scene(QualityPreset::High);
        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        scene.pipeline.begin_gbuffer_render(&mut scene.device).unwrap();
        scene.pipeline.end_gbuffer_render(&mut scene.device).unwrap();
        let projection = *scene.camera.projection();
        scene.pipeline.ssao_pass(&mut scene.device, &projection).unwrap();

        scene.device.take_commands();
        let program = scene.pipeline.begin_lighting_pass(&mut scene.device).unwrap();

        let resources = scene.pipeline.resources().unwrap();
        let gbuffer = resources.gbuffer().unwrap();
        let hdr = resources.hdr().unwrap();
        let blur = resources.ssao_blur().unwrap().color(0).unwrap();
        let commands = scene.device.commands();

        assert!(commands.contains(&Command::BindFramebuffer(FramebufferTarget::Offscreen(hdr.framebuffer()))));
        assert!(commands.contains(&Command::Clear {
            target: FramebufferTarget::Offscreen(hdr.framebuffer()),
            flags: ClearFlags::COLOR | ClearFlags::DEPTH,
        }));
        for (unit, &texture) in gbuffer.color_attachments().iter().enumerate() {
            assert!(commands.contains(&Command::BindTexture { unit: unit as u32, texture }));
        }
        assert!(commands.contains(&Command::BindTexture { unit: 3, texture: blur }));
        assert_eq!(scene.device.uniform(program, "enableSSAO"), Some(UniformValue::Bool(true)));
        assert_eq!(scene.device.uniform(program, "gridSize"), Some(UniformValue::UVec3([6, 4, 8])));
        assert_eq!(
            scene.device.uniform(program, "screenDimensions"),
            Some(UniformValue::UVec2([1280, 720]))
        );
    }

    #[test]
    fn test_surface_resize_recreates_only_hdr() {
        let mut scene = scene(QualityPreset::High);
        scene.render_frame().unwrap();
        let live = scene.device.live_resource_count();

        scene.device.resize(Extent2D::new(800, 600));
        let report = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert_eq!(report.recreated, vec![TargetKind::Hdr]);
        assert_eq!(scene.pipeline.resources().unwrap().hdr().unwrap().extent(), Extent2D::new(800, 600));
        assert_eq!(scene.device.live_resource_count(), live);
    }

    #[test]
    fn test_resolution_setters_dirty_only_on_change() {
        let mut scene = scene(QualityPreset::High);

        assert!(!scene.pipeline.set_gbuffer_resolution(Resolution::FullHd));
        assert!(scene.pipeline.pre_render_checks(&mut scene.device).unwrap().is_noop());

        assert!(scene.pipeline.set_gbuffer_resolution(Resolution::Hd));
        let report = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert_eq!(report.recreated, vec![TargetKind::GBuffer]);
        assert_eq!(scene.pipeline.stats().targets_recreated, 1);

        assert!(scene.pipeline.set_ssao_resolution(Resolution::HalfFullHd));
        let report = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert_eq!(report.recreated, vec![TargetKind::Ssao, TargetKind::SsaoBlur]);
        assert_eq!(
            scene.pipeline.resources().unwrap().ssao().unwrap().extent(),
            Resolution::HalfFullHd.extent()
        );
    }

    #[test]
    fn test_zero_surface_is_counted_not_fatal() {
        let mut scene = scene(QualityPreset::Low);
        scene.device.resize(Extent2D::new(0, 0));

        let report = scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert_eq!(report.incomplete, vec![TargetKind::Hdr]);
        assert_eq!(scene.pipeline.stats().incomplete_framebuffers, 1);

        scene.device.resize(SURFACE);
        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert_eq!(scene.pipeline.stats().incomplete_framebuffers, 0);
    }

    #[test]
    fn test_wireframe_is_scoped_to_geometry_pass() {
        let mut scene = scene(QualityPreset::Low);
        scene.pipeline.set_wireframe(true);
        scene.pipeline.set_backface_culling(false);

        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        scene.pipeline.begin_gbuffer_render(&mut scene.device).unwrap();
        assert_eq!(scene.device.polygon_mode(), PolygonMode::Line);
        assert!(!scene.device.face_culling());
        assert_eq!(scene.device.viewport(), Resolution::FullHd.extent());

        scene.pipeline.end_gbuffer_render(&mut scene.device).unwrap();
        assert_eq!(scene.device.polygon_mode(), PolygonMode::Fill);
        assert_eq!(scene.device.viewport(), SURFACE);
    }

    #[test]
    fn test_tonemap_settings_reach_the_shader() {
        let mut scene = scene(QualityPreset::Low);
        scene.pipeline.tonemap_mut().exposure = 2.5;
        scene.pipeline.tonemap_mut().gamma = 1.8;
        scene.render_frame().unwrap();

        let program = scene.pipeline.program(ProgramKind::ToneMap).unwrap();
        assert_eq!(scene.device.uniform(program, "exposure"), Some(UniformValue::Float(2.5)));
        assert_eq!(scene.device.uniform(program, "gamma"), Some(UniformValue::Float(1.8)));
    }

    #[test]
    fn test_cluster_overflow_is_reported() {
        let mut scene = scene(QualityPreset::Low);
        scene.lights = LightSet::new();
        let target = scene.camera.position + scene.camera.direction() * 30.0;
        for _ in 0..150 {
            scene
                .lights
                .push(crate::render::lighting::PointLight::new(target, Vec3::new(1.0, 1.0, 1.0), 1.0, 1.0))
                .unwrap();
        }
        scene.render_frame().unwrap();

        let dropped = scene.pipeline.read_cluster_overflow(&mut scene.device).unwrap();
        assert!(dropped >= 50);
        assert_eq!(scene.pipeline.stats().cluster_overflows, dropped);
        assert!(scene.device.hazards().is_empty());
    }

    #[test]
    fn test_debug_markers_follow_visible_lights() {
        let mut scene = scene(QualityPreset::Low);
        let overlay = DebugOverlay::new(&mut scene.device, &ShaderConfig::new("resources/shaders")).unwrap();

        scene.pipeline.pre_render_checks(&mut scene.device).unwrap();
        assert!(matches!(
            overlay.show_light_positions(&mut scene.device, &scene.pipeline, &scene.camera),
            Err(RenderError::PassOrder { .. })
        ));
        scene.pipeline.begin_gbuffer_render(&mut scene.device).unwrap();
        scene.pipeline.end_gbuffer_render(&mut scene.device).unwrap();
        let projection = *scene.camera.projection();
        scene.pipeline.ssao_pass(&mut scene.device, &projection).unwrap();
        scene.pipeline.begin_lighting_pass(&mut scene.device).unwrap();
        scene.pipeline.end_lighting_pass(&mut scene.device).unwrap();
        scene.pipeline.hdr_pass(&mut scene.device).unwrap();

        // nothing culled yet
        assert_eq!(overlay.show_light_positions(&mut scene.device, &scene.pipeline, &scene.camera).unwrap(), 0);

        scene.render_frame().unwrap();
        scene.device.take_commands();
        let drawn = overlay
            .show_light_positions(&mut scene.device, &scene.pipeline, &scene.camera)
            .unwrap();
        assert_eq!(drawn as usize, scene.pipeline.stats().visible_lights);

        let gbuffer = scene.pipeline.resources().unwrap().gbuffer().unwrap().framebuffer();
        let commands = scene.device.commands();
        assert_eq!(
            commands.first(),
            Some(&Command::BlitDepth { src: gbuffer, dst: FramebufferTarget::Default })
        );
        assert!(matches!(commands.last(), Some(Command::DrawMesh { instances, .. }) if *instances == drawn));
        assert!(scene.device.hazards().is_empty());
    }

    #[test]
    fn test_dropping_pipeline_releases_everything() {
        let mut scene = scene(QualityPreset::High);
        scene.render_frame().unwrap();
        scene.device.destroy_mesh(scene.cube);

        drop(scene.pipeline);
        scene.device.collect_released();
        assert_eq!(scene.device.live_resource_count(), 0);
    }
}
