//! The engine: owns every GPU component and drives the physics and draw ticks.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use ash::vk;
use glam::Vec2;
use nbody_core::perf::{
    relative_sizes, stage_samples, PerformanceSample, COMPUTE_QUERY_COUNT, GRAPHICS_QUERY_COUNT,
};
use nbody_core::status::significant;
use nbody_core::{
    Camera, ComputeTimings, GraphicsTimings, IntervalWindow, Particle, SimulationParameters,
    StatusLine, Xorshift64Star,
};
use nbody_gpu::command::submit_command_buffers;
use nbody_gpu::swapchain::Swapchain;
use nbody_gpu::{
    CommandPool, DescriptorPool, GpuContext, GpuContextBuilder, GpuError, SurfaceContext,
    Texture, TextureKind, TimestampPool,
};
use nbody_render::descriptor_sets::create_pool;
use nbody_render::sync::{COMPUTE_STEP_1, DRAW, TRANSFER};
use nbody_render::{
    DepthBuffer, DescriptorInputs, DescriptorLayouts, DescriptorSets, Geometry, GraphCommands,
    GraphInputs, ParticleBuffers, PhysicsCommands, PhysicsInputs, Pipelines, PresentCommands,
    RenderPasses, RenderTargets, SyncObjects, UniformBuffers,
};
use raw_window_handle::HasDisplayHandle;
use tracing::{debug, info, warn};
use winit::event::WindowEvent;
use winit::keyboard::PhysicalKey;
use winit::window::Window;

use crate::assets;
use crate::config::EngineConfig;
use crate::controller::CameraController;
use crate::resize::{plan_resize, RebuildStep, ResizePlan, REBUILD_ORDER};
use crate::timers::Timers;

/// Everything the frame graph and the integrator run on.
///
/// Resources are released by [`Engine::destroy`], which `Drop` also calls.
pub struct Engine {
    window: Arc<Window>,
    config: EngineConfig,
    params: SimulationParameters,
    camera: Camera,
    controller: CameraController,
    rng: Xorshift64Star,

    sync: SyncObjects,
    graph: GraphCommands,
    present: PresentCommands,
    physics: PhysicsCommands,
    sets: DescriptorSets,
    descriptor_pool: DescriptorPool,
    pipelines: Pipelines,
    layouts: DescriptorLayouts,
    particles: ParticleBuffers,
    uniforms: UniformBuffers,
    geometry: Geometry,
    particle_texture: Texture,
    noise_texture: Texture,
    targets: RenderTargets,
    depth: DepthBuffer,
    passes: RenderPasses,
    graphics_queries: Option<TimestampPool>,
    compute_queries: Option<TimestampPool>,
    graphics_pool: CommandPool,
    compute_pool: CommandPool,
    swapchain: Option<Swapchain>,
    surface: SurfaceContext,
    gpu: GpuContext,

    timers: Timers,
    frames: IntervalWindow,
    computations: IntervalWindow,
    graphics_timings: GraphicsTimings,
    compute_timings: ComputeTimings,
    started: Instant,
    last_draw: Instant,
    /// Set by `pause_compute`; a full resume leaves the integrator stopped
    compute_paused: bool,
    /// The surface has a zero extent; rebuilding waits for a real one
    minimized: bool,
    destroyed: bool,
}

fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

impl Engine {
    /// Create the device, every GPU resource and the first particle set, then start the
    /// tick timers.
    pub fn initialize(window: Arc<Window>, config: EngineConfig) -> anyhow::Result<Self> {
        let mut params = SimulationParameters::default();
        params.set_particle_count(config.particle_count)?;
        params.set_initial_condition(config.initial_condition)?;
        let mut rng = config
            .seed
            .map_or_else(Xorshift64Star::from_time, Xorshift64Star::new);

        let display = window.display_handle()?.as_raw();
        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .display(display)
            .build()?;

        // SAFETY: the window outlives the surface, which is destroyed in `destroy`
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };
        let device = gpu.device();

        let extent = window_extent(&window);
        // SAFETY: the device is valid and nothing has been submitted yet
        let swapchain = unsafe { surface.create_swapchain(&gpu, extent, config.vsync, None)? };
        let extent = swapchain.extent;

        // SAFETY: every handle below is created from the live device and destroyed in `destroy`
        unsafe {
            let graphics_pool = CommandPool::new(
                device,
                gpu.queue_family(),
                vk::CommandPoolCreateFlags::empty(),
            )?;
            let compute_pool = CommandPool::new(
                device,
                gpu.queue_family(),
                vk::CommandPoolCreateFlags::empty(),
            )?;

            let (graphics_queries, compute_queries) = if gpu.supports_timestamps() {
                (
                    Some(TimestampPool::new(device, GRAPHICS_QUERY_COUNT)?),
                    Some(TimestampPool::new(device, COMPUTE_QUERY_COUNT)?),
                )
            } else {
                (None, None)
            };

            let passes =
                RenderPasses::new(device, surface.surface_format.format, surface.depth_format)?;
            let depth = DepthBuffer::new(
                &gpu,
                &graphics_pool,
                surface.depth_format,
                extent,
                vk::ImageUsageFlags::empty(),
                "depth",
            )?;
            let targets = RenderTargets::new(
                &gpu,
                &graphics_pool,
                &passes,
                &swapchain.image_views,
                &depth,
                extent,
            )?;

            let particle_texture = Texture::upload(
                &gpu,
                &graphics_pool,
                gpu.graphics_queue(),
                &assets::particle_texture(&config.assets),
                TextureKind::Flat,
                vk::SamplerAddressMode::CLAMP_TO_BORDER,
                "particle_texture",
            )?;
            let noise_texture = Texture::upload(
                &gpu,
                &graphics_pool,
                gpu.graphics_queue(),
                &assets::noise_texture(&config.assets),
                TextureKind::Flat,
                vk::SamplerAddressMode::REPEAT,
                "noise_texture",
            )?;
            let geometry = Geometry::upload(&gpu, &graphics_pool)?;

            let particles =
                generate_particles(&mut params, &mut rng).context("failed to generate particles")?;
            let particles = ParticleBuffers::create_and_upload(&gpu, &graphics_pool, &particles)?;

            let mut camera = Camera::default();
            camera.set_viewport(extent.width, extent.height);
            params.graphics.fbo_size = [extent.width as f32, extent.height as f32];
            params.graphics.set_matrices(camera.projection(), camera.view(), camera.model);
            let uniforms = UniformBuffers::new(&mut gpu.allocator().lock(), &params)?;

            let layouts = DescriptorLayouts::new(device)?;
            let pipelines = Pipelines::new(device, &config.assets, &layouts, &passes)?;
            let descriptor_pool = create_pool(device)?;
            let sets = DescriptorSets::allocate(device, &descriptor_pool, &layouts)?;
            let sync = SyncObjects::new(device)?;

            let timers = Timers::new(
                config.physics_interval,
                config.draw_interval,
                config.status_interval,
            );
            let now = Instant::now();

            let mut engine = Self {
                window,
                config,
                params,
                camera,
                controller: CameraController::new(),
                rng,
                sync,
                graph: GraphCommands::default(),
                present: PresentCommands::default(),
                physics: PhysicsCommands::default(),
                sets,
                descriptor_pool,
                pipelines,
                layouts,
                particles,
                uniforms,
                geometry,
                particle_texture,
                noise_texture,
                targets,
                depth,
                passes,
                graphics_queries,
                compute_queries,
                graphics_pool,
                compute_pool,
                swapchain: Some(swapchain),
                surface,
                gpu,
                timers,
                frames: IntervalWindow::default(),
                computations: IntervalWindow::default(),
                graphics_timings: GraphicsTimings::default(),
                compute_timings: ComputeTimings::default(),
                started: now,
                last_draw: now,
                compute_paused: false,
                minimized: false,
                destroyed: false,
            };

            engine.write_descriptor_sets();
            engine.record_physics()?;
            engine.record_graph()?;
            engine.record_present()?;

            engine.timers.physics.start(now);
            engine.timers.draw.start(now);
            engine.timers.status.start(now);

            info!(
                particles = engine.particles.count(),
                condition = engine.params.pending_initial_condition.name(),
                "Engine initialized"
            );
            Ok(engine)
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub const fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    pub const fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Earliest moment any running timer fires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn swapchain(&self) -> anyhow::Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("swapchain missing".to_string()).into())
    }

    /// Run whichever ticks are due at `now`. Returns a fresh status line when the status
    /// timer fired.
    pub fn update(&mut self, now: Instant) -> anyhow::Result<Option<StatusLine>> {
        if self.timers.physics.poll(now) {
            self.physics_tick(now)?;
        }
        if self.timers.draw.poll(now) {
            self.draw_tick(now)?;
        }
        if !self.timers.status.poll(now) {
            return Ok(None);
        }
        for sample in self.stage_samples() {
            debug!(
                stage = sample.stage.name(),
                ms = %significant(sample.duration_ms, 3),
                share = sample.share,
                "GPU stage timing"
            );
        }
        Ok(Some(self.status()))
    }

    /// Forward a window event to the camera controller.
    pub fn handle_input(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.controller.key(code, event.state);
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                self.controller.mouse_button(*button, *state);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                self.controller
                    .cursor_moved(&mut self.camera, position, self.params.mouse_sensitivity);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.controller.wheel(&mut self.camera, *delta);
            }
            WindowEvent::Focused(false) => self.controller.release_all(),
            _ => {}
        }
    }

    /// Current rates and timings.
    pub fn status(&self) -> StatusLine {
        StatusLine {
            frames_per_second: self.frames.rate(),
            graphics_ms: self.graphics_timings.total / 1.0e6,
            computations_per_second: self.computations.rate(),
            compute_ms: self.compute_timings.total() / 1.0e6,
        }
    }

    /// Per-stage GPU timings of the last frame and physics tick.
    pub fn stage_samples(&self) -> Vec<PerformanceSample> {
        stage_samples(&self.graphics_timings, &self.compute_timings)
    }

    // ---- lifecycle -------------------------------------------------------------------

    /// Rebuild every extent-dependent resource for `extent`, in [`REBUILD_ORDER`].
    ///
    /// A zero extent (minimized window) only marks the engine as minimized; the draw tick
    /// is skipped until a non-zero extent arrives.
    pub fn resize(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
        let ResizePlan::Rebuild(requested) = plan_resize(extent) else {
            debug!("Zero-sized surface, deferring resize");
            self.minimized = true;
            return Ok(());
        };
        self.minimized = false;

        self.gpu.wait_idle()?;
        self.sync.observe_idle();

        let mut extent = requested;
        for step in REBUILD_ORDER {
            // SAFETY: the device is idle, so nothing references the resources being replaced
            unsafe { self.rebuild(step, &mut extent)? };
        }

        info!(width = extent.width, height = extent.height, "Resized");
        Ok(())
    }

    /// Run one rebuild step. The swapchain step replaces `extent` with the one it got.
    ///
    /// # Safety
    /// The device must be idle.
    unsafe fn rebuild(
        &mut self,
        step: RebuildStep,
        extent: &mut vk::Extent2D,
    ) -> anyhow::Result<()> {
        match step {
            RebuildStep::Swapchain => {
                let previous = self.swapchain.take();
                let swapchain =
                    self.surface
                        .create_swapchain(&self.gpu, *extent, self.config.vsync, previous)?;
                *extent = swapchain.extent;
                self.swapchain = Some(swapchain);
            }
            RebuildStep::Depth => {
                self.depth.destroy(&self.gpu)?;
                self.depth = DepthBuffer::new(
                    &self.gpu,
                    &self.graphics_pool,
                    self.surface.depth_format,
                    *extent,
                    vk::ImageUsageFlags::empty(),
                    "depth",
                )?;
            }
            RebuildStep::RenderTargets => {
                self.targets.destroy(&self.gpu)?;
                let swapchain = self.swapchain()?;
                self.targets = RenderTargets::new(
                    &self.gpu,
                    &self.graphics_pool,
                    &self.passes,
                    &swapchain.image_views,
                    &self.depth,
                    *extent,
                )?;
            }
            RebuildStep::DescriptorSets => self.reallocate_descriptor_sets()?,
            RebuildStep::CommandBuffers => {
                self.record_physics()?;
                self.record_graph()?;
                self.record_present()?;
            }
            RebuildStep::Camera => {
                self.camera.set_viewport(extent.width, extent.height);
                self.params.graphics.fbo_size = [extent.width as f32, extent.height as f32];
                self.uniforms.write_graphics(&self.params)?;
            }
        }
        debug!(?step, "Rebuilt");
        Ok(())
    }

    /// Regenerate the particles from the staged count and initial condition.
    pub fn launch(&mut self) -> anyhow::Result<()> {
        let compute_was_running = self.timers.physics.is_running();
        self.timers.physics.stop();
        self.timers.draw.stop();

        self.gpu.wait_graphics_idle()?;
        self.gpu.wait_compute_idle()?;
        self.sync.observe_idle();

        // SAFETY: both queues are idle
        unsafe {
            self.descriptor_pool.reset(self.gpu.device())?;
            self.particles.destroy(&self.gpu)?;

            let particles = generate_particles(&mut self.params, &mut self.rng)?;
            self.particles =
                ParticleBuffers::create_and_upload(&self.gpu, &self.graphics_pool, &particles)?;
            self.uniforms.write_parameters(&self.params)?;

            self.sets =
                DescriptorSets::allocate(self.gpu.device(), &self.descriptor_pool, &self.layouts)?;
            self.write_descriptor_sets();

            self.record_physics()?;
            self.record_graph()?;
        }

        self.frames.restart();
        self.computations.restart();
        let now = Instant::now();
        self.timers.draw.start(now);
        if compute_was_running {
            self.timers.physics.start(now);
        }

        info!(
            particles = self.particles.count(),
            condition = self.params.pending_initial_condition.name(),
            "Launched simulation"
        );
        Ok(())
    }

    /// Stop or resume the integrator.
    pub fn pause_compute(&mut self, pause: bool) {
        self.compute_paused = pause;
        if pause {
            self.timers.physics.stop();
        } else {
            self.computations.restart();
            self.timers.physics.start(Instant::now());
        }
        debug!(pause, "Compute pause toggled");
    }

    /// Stop or resume both ticks. Pausing waits for the device to go idle.
    pub fn pause_all(&mut self, pause: bool) -> anyhow::Result<()> {
        if pause {
            self.timers.physics.stop();
            self.timers.draw.stop();
            self.gpu.wait_idle()?;
            self.sync.observe_idle();
        } else {
            let now = Instant::now();
            self.frames.restart();
            self.computations.restart();
            self.last_draw = now;
            self.timers.draw.start(now);
            if !self.compute_paused {
                self.timers.physics.start(now);
            }
        }
        debug!(pause, "Full pause toggled");
        Ok(())
    }

    // ---- setters ---------------------------------------------------------------------

    fn apply(&mut self, update: impl FnOnce(&mut SimulationParameters)) -> anyhow::Result<()> {
        update(&mut self.params);
        self.uniforms.write_parameters(&self.params)?;
        Ok(())
    }

    pub fn set_gravitational_constant(&mut self, value: f64) -> anyhow::Result<()> {
        self.apply(|p| p.set_gravitational_constant(value))
    }

    pub fn set_softening(&mut self, value: f64) -> anyhow::Result<()> {
        self.apply(|p| p.set_softening(value))
    }

    pub fn set_time_step(&mut self, value: f64) -> anyhow::Result<()> {
        self.apply(|p| p.set_time_step(value))
    }

    pub fn set_bloom_strength(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_bloom_strength(value))
    }

    pub fn set_bloom_extent(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_bloom_extent(value))
    }

    pub fn set_particle_size(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_particle_size(value))
    }

    pub fn set_power(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_power(value))
    }

    pub fn set_exposure(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_exposure(value))
    }

    pub fn set_gamma(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_gamma(value))
    }

    pub fn set_tone_mapping_mode(&mut self, value: i32) -> anyhow::Result<()> {
        self.apply(|p| p.set_tone_mapping_mode(value))
    }

    /// Host-only; read by the controller on every drag.
    pub fn set_mouse_sensitivity(&mut self, value: i32) {
        self.params.set_mouse_sensitivity(value);
    }

    /// Staged until the next [`Engine::launch`].
    pub fn set_particle_count(&mut self, value: u32) -> anyhow::Result<()> {
        Ok(self.params.set_particle_count(value)?)
    }

    /// Staged until the next [`Engine::launch`].
    pub fn set_initial_condition(&mut self, value: u32) -> anyhow::Result<()> {
        Ok(self.params.set_initial_condition(value)?)
    }

    // ---- ticks -----------------------------------------------------------------------

    /// Submit both integrator steps.
    ///
    /// Step two overwrites the draw buffer, so it waits for the last frame (`draw`) and the
    /// previous copy (`transfer`).
    fn physics_tick(&mut self, now: Instant) -> anyhow::Result<()> {
        let (Some(step_one), Some(step_two)) = (self.physics.step_one(), self.physics.step_two())
        else {
            return Ok(());
        };
        let period = self.gpu.timestamp_period();
        let device = self.gpu.device();
        let queue = self.gpu.compute_queue();

        // SAFETY: every submitted handle is alive and each fence is waited on before reuse
        unsafe {
            self.sync.wait(device, COMPUTE_STEP_1)?;
            if let Some(queries) = &self.compute_queries {
                let mut ticks = [0u64; 2];
                if queries.read(device, 0, &mut ticks)? {
                    if let Some(step) = ComputeTimings::step_one_from(&ticks, period) {
                        self.compute_timings.step_one = step;
                    }
                }
            }
            let fence = self.sync.reset(device, COMPUTE_STEP_1)?;
            submit_command_buffers(
                device,
                queue,
                &[step_one],
                &[],
                &[],
                &[self.sync.compute_step_1_done],
                fence,
            )?;

            self.sync.wait(device, DRAW)?;
            if let Some(queries) = &self.compute_queries {
                let mut ticks = [0u64; 2];
                if queries.read(device, 2, &mut ticks)? {
                    if let Some(step) = ComputeTimings::step_two_from(&ticks, period) {
                        self.compute_timings.step_two = step;
                    }
                }
            }
            self.computations.tick(now);

            self.sync.wait(device, TRANSFER)?;
            let fence = self.sync.reset(device, TRANSFER)?;
            submit_command_buffers(
                device,
                queue,
                &[step_two],
                &[self.sync.compute_step_1_done],
                &[vk::PipelineStageFlags::COMPUTE_SHADER],
                &[],
                fence,
            )?;
        }
        Ok(())
    }

    /// Render and present one frame.
    fn draw_tick(&mut self, now: Instant) -> anyhow::Result<()> {
        let dt = now.saturating_duration_since(self.last_draw).as_secs_f32();
        self.last_draw = now;
        self.camera.passive_move(self.controller.input(), dt);
        self.params
            .graphics
            .set_matrices(self.camera.projection(), self.camera.view(), self.camera.model);
        self.uniforms.write_graphics(&self.params)?;

        if self.minimized {
            return Ok(());
        }

        let swapchain = self.swapchain()?;
        // SAFETY: the swapchain and semaphore are alive
        let acquired = unsafe {
            swapchain.acquire_next_image(
                &self.surface.swapchain_loader,
                self.sync.present_acquired,
            )
        };
        let image_index = match acquired {
            Ok((index, _)) => index,
            Err(GpuError::OutOfDate) => {
                debug!("Swapchain out of date on acquire");
                return self.resize(window_extent(&self.window));
            }
            Err(e) => return Err(e.into()),
        };

        let (Some(post_present), Some(graph), Some(pre_present)) = (
            self.present.post_present(image_index),
            self.graph.get(image_index),
            self.present.pre_present(image_index),
        ) else {
            return Err(GpuError::InvalidState(format!(
                "no command buffers for swapchain image {image_index}"
            ))
            .into());
        };

        let device = self.gpu.device();
        let queue = self.gpu.graphics_queue();
        let bottom = [vk::PipelineStageFlags::BOTTOM_OF_PIPE];

        // SAFETY: every submitted handle is alive and each fence is waited on before reuse
        let recreate = unsafe {
            submit_command_buffers(
                device,
                queue,
                &[post_present],
                &[self.sync.present_acquired],
                &bottom,
                &[self.sync.post_present_done],
                vk::Fence::null(),
            )?;

            self.sync.wait(device, TRANSFER)?;
            let fence = self.sync.reset(device, DRAW)?;
            submit_command_buffers(
                device,
                queue,
                &[graph],
                &[self.sync.post_present_done],
                &[vk::PipelineStageFlags::ALL_COMMANDS],
                &[self.sync.draw_done],
                fence,
            )?;

            submit_command_buffers(
                device,
                queue,
                &[pre_present],
                &[self.sync.draw_done],
                &bottom,
                &[self.sync.pre_present_done],
                vk::Fence::null(),
            )?;

            self.swapchain()?.present(
                &self.surface.swapchain_loader,
                queue,
                image_index,
                &[self.sync.pre_present_done],
            )?
        };
        self.frames.tick(now);

        self.gpu.wait_graphics_idle()?;
        // SAFETY: the graphics queue is idle, so the draw fence has signaled
        unsafe {
            self.sync.wait(device, DRAW)?;
        }
        self.poll_graphics_timestamps()?;
        self.params.graphics.timestamp = self.started.elapsed().as_secs_f32();

        if recreate {
            debug!("Swapchain suboptimal or out of date on present");
            self.resize(window_extent(&self.window))?;
        }
        Ok(())
    }

    /// Read the graph timestamps and refresh both meter bars.
    fn poll_graphics_timestamps(&mut self) -> anyhow::Result<()> {
        if let Some(queries) = &self.graphics_queries {
            let mut ticks = [0u64; GRAPHICS_QUERY_COUNT as usize];
            // SAFETY: the graphics queue is idle
            let ready = unsafe { queries.read(self.gpu.device(), 0, &mut ticks)? };
            if ready {
                if let Some(timings) =
                    GraphicsTimings::from_timestamps(&ticks, self.gpu.timestamp_period())
                {
                    self.graphics_timings = timings;
                }
            }
        }

        let (compute_size, graphics_size) =
            relative_sizes(self.compute_timings.total(), self.graphics_timings.total);
        let mut graphics = self.graphics_timings.meter();
        graphics.relative_size = graphics_size;
        let mut compute = self.compute_timings.meter();
        compute.relative_size = compute_size;
        self.uniforms.write_meters(&graphics, &compute)?;
        Ok(())
    }

    // ---- recording -------------------------------------------------------------------

    /// # Safety
    /// The pool must have been reset and no command buffer may use the old sets.
    unsafe fn reallocate_descriptor_sets(&mut self) -> anyhow::Result<()> {
        let device = self.gpu.device();
        self.descriptor_pool.reset(device)?;
        self.sets = DescriptorSets::allocate(device, &self.descriptor_pool, &self.layouts)?;
        self.write_descriptor_sets();
        Ok(())
    }

    fn write_descriptor_sets(&self) {
        let inputs = DescriptorInputs {
            uniforms: &self.uniforms,
            particles: &self.particles.compute,
            particle_texture: &self.particle_texture,
            noise_texture: &self.noise_texture,
            targets: &self.targets,
        };
        // SAFETY: every resource in `inputs` is alive and the sets are not in use
        unsafe { self.sets.write(self.gpu.device(), &inputs) };
    }

    fn record_physics(&mut self) -> anyhow::Result<()> {
        let inputs = PhysicsInputs {
            pipelines: &self.pipelines,
            sets: &self.sets,
            particles: &self.particles,
            queries: self.compute_queries.as_ref(),
        };
        // SAFETY: callers only re-record once the compute queue is idle
        unsafe {
            self.physics
                .record(self.gpu.device(), &self.compute_pool, &inputs)?;
        }
        Ok(())
    }

    fn record_graph(&mut self) -> anyhow::Result<()> {
        let inputs = GraphInputs {
            passes: &self.passes,
            pipelines: &self.pipelines,
            sets: &self.sets,
            geometry: &self.geometry,
            draw_buffer: &self.particles.draw,
            particle_count: self.particles.count(),
            queries: self.graphics_queries.as_ref(),
        };
        // SAFETY: callers only re-record once the graphics queue is idle
        unsafe {
            self.graph.record(
                self.gpu.device(),
                &self.graphics_pool,
                &inputs,
                &mut self.targets,
            )?;
        }
        Ok(())
    }

    fn record_present(&mut self) -> anyhow::Result<()> {
        let images = self.swapchain()?.images.clone();
        // SAFETY: callers only re-record once the graphics queue is idle
        unsafe {
            self.present
                .record(self.gpu.device(), &self.graphics_pool, &images)?;
        }
        Ok(())
    }

    // ---- teardown --------------------------------------------------------------------

    /// Wait for the device and release every resource. Safe to call more than once.
    pub fn destroy(&mut self) -> anyhow::Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.timers.physics.stop();
        self.timers.draw.stop();
        self.timers.status.stop();

        self.gpu.wait_idle()?;
        let device = self.gpu.device();

        // SAFETY: the device is idle and every handle is destroyed exactly once
        unsafe {
            self.graph.free(device, &self.graphics_pool);
            self.present.free(device, &self.graphics_pool);
            self.physics.free(device, &self.compute_pool);
            self.sync.destroy(device);

            self.descriptor_pool.destroy(device);
            self.pipelines.destroy(device);
            self.layouts.destroy(device);

            self.particles.destroy(&self.gpu)?;
            self.uniforms.destroy(&mut self.gpu.allocator().lock())?;
            self.geometry.destroy(&self.gpu)?;
            self.particle_texture.destroy(&self.gpu)?;
            self.noise_texture.destroy(&self.gpu)?;
            self.targets.destroy(&self.gpu)?;
            self.depth.destroy(&self.gpu)?;
            self.passes.destroy(device);

            for queries in [&self.graphics_queries, &self.compute_queries]
                .into_iter()
                .flatten()
            {
                queries.destroy(device);
            }
            self.graphics_pool.destroy(device);
            self.compute_pool.destroy(device);

            if let Some(swapchain) = self.swapchain.take() {
                swapchain.destroy(device, &self.surface.swapchain_loader);
            }
            self.surface.destroy();
        }

        let stats = self.gpu.allocator().lock().stats();
        if stats.live_buffers() != 0 || stats.live_images() != 0 {
            warn!(?stats, "GPU resources outlived the engine");
        }
        info!("Engine destroyed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::error!("Engine teardown failed: {e:#}");
        }
    }
}

/// Generate the staged particle set and publish its count to the integrator block.
fn generate_particles(
    params: &mut SimulationParameters,
    rng: &mut Xorshift64Star,
) -> anyhow::Result<Vec<Particle>> {
    let count = params.pending_particle_count;
    let condition = params.pending_initial_condition;
    let particles = condition.generate(count, params.compute.gravity_constant, rng);
    anyhow::ensure!(
        particles.len() == count as usize,
        "generator produced {} of {count} particles",
        particles.len()
    );
    params.compute.particle_count = count;
    debug!(count, condition = condition.name(), "Generated particles");
    Ok(particles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbody_core::InitialCondition;

    #[test]
    fn generated_particles_update_the_integrator_block() {
        let mut params = SimulationParameters::default();
        params.set_particle_count(512).unwrap();
        params.set_initial_condition(3).unwrap();
        let mut rng = Xorshift64Star::new(42);

        let particles = generate_particles(&mut params, &mut rng).unwrap();
        assert_eq!(particles.len(), 512);
        assert_eq!(params.compute.particle_count, 512);
        assert_eq!(
            std::mem::size_of_val(particles.as_slice()),
            512 * std::mem::size_of::<Particle>()
        );
        assert_eq!(params.pending_initial_condition, InitialCondition::Lattice);
    }

    #[test]
    fn relaunch_uses_the_new_count() {
        let mut params = SimulationParameters::default();
        let mut rng = Xorshift64Star::new(7);
        params.set_particle_count(100).unwrap();
        generate_particles(&mut params, &mut rng).unwrap();
        params.set_particle_count(300).unwrap();
        let particles = generate_particles(&mut params, &mut rng).unwrap();
        assert_eq!(particles.len(), 300);
        assert_eq!(params.compute.particle_count, 300);
    }
}
