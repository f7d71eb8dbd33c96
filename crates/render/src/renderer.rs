//! Renderer construction and the frame loop.
//!
//! [`Renderer`] owns every Vulkan object the engine creates, from the
//! instance down to per-frame fences, and drives the acquire / record /
//! submit / present cycle.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3};
use tracing::{debug, error, info};

use ember_assets::{MeshData, TextureData};
use ember_core::{EngineConfig, Timer};
use ember_platform::{get_required_extensions, Surface, Window};
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::CommandPool;
use ember_rhi::descriptor::{
    buffer_info, update_descriptor_sets, DescriptorBindingBuilder, DescriptorPool,
    DescriptorSetLayout,
};
use ember_rhi::device::{Device, DEVICE_EXTENSIONS};
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::{clamp_sample_count, select_physical_device};
use ember_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use ember_rhi::shader::Shader;
use ember_rhi::swapchain::Swapchain;
use ember_rhi::texture::Texture;
use ember_rhi::upload::Uploader;
use ember_rhi::vertex::{index_vertices, Vertex};
use ember_rhi::RhiError;

use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameSlot, FrameSync};
use crate::strategy::{RenderingStrategy, StrategyKind};
use crate::targets::{find_depth_format, RenderTargets};
use crate::ubo::TransformUbo;
use crate::MAX_FRAMES_IN_FLIGHT;

/// Owns the full Vulkan object graph and renders the scene.
///
/// # Resource Destruction Order
///
/// Vulkan objects must be destroyed children-first:
/// 1. Wait for all GPU work to complete
/// 2. Per-frame and per-image resources (slots, semaphore pools)
/// 3. Scene resources (texture, vertex/index buffers, command pool)
/// 4. Pipeline and descriptor objects
/// 5. Strategy objects and render targets
/// 6. Swapchain, then the device
/// 7. Surface, then the instance
///
/// Every field is wrapped in `ManuallyDrop` so `Drop` can release them in
/// exactly that order. The device is an `Arc` because each RHI object
/// keeps its own reference; the renderer's clone is released between the
/// swapchain and the surface, at which point the count reaches zero.
pub struct Renderer {
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Window surface (destroyed after the device, before the instance).
    surface: ManuallyDrop<Surface>,
    /// Logical device.
    device: ManuallyDrop<Arc<Device>>,
    /// Swapchain and its image views.
    swapchain: ManuallyDrop<Swapchain>,
    /// Multisampled color and depth attachments.
    targets: ManuallyDrop<RenderTargets>,
    /// Dynamic rendering or legacy render pass path.
    strategy: ManuallyDrop<RenderingStrategy>,

    /// Layout for the per-frame descriptor sets.
    descriptor_layout: ManuallyDrop<DescriptorSetLayout>,
    /// Pool the per-frame descriptor sets come from.
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    /// Mesh pipeline layout.
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// Mesh graphics pipeline.
    pipeline: ManuallyDrop<Pipeline>,

    /// Pool for the per-frame command buffers.
    command_pool: ManuallyDrop<CommandPool>,
    /// Device-local vertex buffer.
    vertex_buffer: ManuallyDrop<Buffer>,
    /// Device-local index buffer.
    index_buffer: ManuallyDrop<Buffer>,
    /// Mip-mapped scene texture with its sampler.
    texture: ManuallyDrop<Texture>,

    /// Per-frame slots, cycled by `sync`.
    frames: ManuallyDrop<Vec<FrameSlot>>,
    /// Semaphore pools and frame counters.
    sync: ManuallyDrop<FrameSync>,

    /// Number of indices in `index_buffer`.
    index_count: u32,
    /// Wall clock driving the model spin.
    timer: Timer,
    /// Current framebuffer size; zero while minimized.
    width: u32,
    height: u32,
    /// Set by `resize`, consumed after the next present.
    resize_requested: bool,
}

impl Renderer {
    /// Creates a renderer for the given window.
    ///
    /// This brings up the whole Vulkan stack, loads the model and texture
    /// from the paths in `config`, and leaves everything ready for
    /// [`render_frame`](Self::render_frame).
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object creation fails or an asset
    /// cannot be loaded.
    pub fn new(window: &Window, config: &EngineConfig) -> RenderResult<Self> {
        let (width, height) = window.framebuffer_size();

        info!("Initializing renderer ({}x{})", width, height);

        let display_handle = window
            .display_handle()
            .map_err(|e| RenderError::WindowHandle(e.to_string()))?
            .as_raw();
        let surface_extensions = get_required_extensions(display_handle)?;

        let instance = Instance::new(
            &config.app_name,
            config.enable_validation,
            &surface_extensions,
        )?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let gpu = select_physical_device(instance.handle(), DEVICE_EXTENSIONS)?;
        let strategy_kind =
            StrategyKind::select(gpu.supports_dynamic_rendering, config.force_legacy_pass);
        info!(
            "Using {} ({}) with {}",
            gpu.device_name(),
            gpu.device_type_name(),
            strategy_kind
        );

        let device = Device::new(
            &instance,
            &gpu,
            surface.handle(),
            surface.loader(),
            strategy_kind.uses_dynamic_rendering(),
        )?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let samples = clamp_sample_count(gpu.max_usable_sample_count(), config.msaa_ceiling);
        let depth_format = find_depth_format(instance.handle(), gpu.device)?;
        info!("MSAA {:?}, depth format {:?}", samples, depth_format);

        let targets = RenderTargets::new(
            device.clone(),
            swapchain.format(),
            depth_format,
            samples,
            swapchain.width(),
            swapchain.height(),
        )?;

        let strategy = RenderingStrategy::new(device.clone(), strategy_kind, &swapchain, &targets)?;

        // One uniform buffer and one sampled texture per frame slot
        let bindings = [
            DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
            DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
        ];
        let descriptor_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(MAX_FRAMES_IN_FLIGHT as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(MAX_FRAMES_IN_FLIGHT as u32),
        ];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), MAX_FRAMES_IN_FLIGHT as u32, &pool_sizes)?;

        let (pipeline, pipeline_layout) = Self::create_pipeline(
            device.clone(),
            config,
            &descriptor_layout,
            &strategy,
            &swapchain,
            &targets,
        )?;

        let uploader = Uploader::new(&instance, device.clone())?;

        let (vertex_buffer, index_buffer, index_count) =
            Self::load_mesh(&uploader, config)?;

        let texture_data = TextureData::load(&config.texture_path)?;
        let texture = Texture::from_rgba8(
            &uploader,
            device.clone(),
            texture_data.pixels(),
            texture_data.width(),
            texture_data.height(),
            gpu.properties.limits.max_sampler_anisotropy,
        )?;

        let command_pool =
            CommandPool::new(device.clone(), device.queue_families().graphics_family)?;
        let frames = Self::create_frame_slots(
            &device,
            &command_pool,
            &descriptor_pool,
            &descriptor_layout,
            &texture,
        )?;
        let sync = FrameSync::new(&device, swapchain.image_count())?;

        info!(
            "Renderer ready: {} swapchain image(s), {} frame(s) in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            targets: ManuallyDrop::new(targets),
            strategy: ManuallyDrop::new(strategy),
            descriptor_layout: ManuallyDrop::new(descriptor_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            command_pool: ManuallyDrop::new(command_pool),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            index_buffer: ManuallyDrop::new(index_buffer),
            texture: ManuallyDrop::new(texture),
            frames: ManuallyDrop::new(frames),
            sync: ManuallyDrop::new(sync),
            index_count,
            timer: Timer::new(),
            width,
            height,
            resize_requested: false,
        })
    }

    /// Builds the mesh pipeline against the strategy's attachment target.
    fn create_pipeline(
        device: Arc<Device>,
        config: &EngineConfig,
        descriptor_layout: &DescriptorSetLayout,
        strategy: &RenderingStrategy,
        swapchain: &Swapchain,
        targets: &RenderTargets,
    ) -> RenderResult<(Pipeline, PipelineLayout)> {
        // One SPIR-V blob holds both entry points
        let shader = Shader::from_spirv_file(
            device.clone(),
            &config.shader_path,
            &config.vertex_entry,
            &config.fragment_entry,
        )?;

        let set_layouts = [descriptor_layout.handle()];
        let pipeline_layout = PipelineLayout::new(device.clone(), &set_layouts, &[])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .shader(&shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .samples(targets.samples())
            .depth_test_enable(true)
            .depth_write_enable(true)
            .target(strategy.pipeline_target(swapchain, targets))
            .build(device, &pipeline_layout)?;

        Ok((pipeline, pipeline_layout))
    }

    /// Loads the OBJ model, deduplicates its corners, and uploads the
    /// vertex and index buffers.
    fn load_mesh(uploader: &Uploader, config: &EngineConfig) -> RenderResult<(Buffer, Buffer, u32)> {
        let mesh = MeshData::load_obj(&config.model_path)?;

        let corners = mesh
            .positions
            .iter()
            .zip(mesh.tex_coords.iter())
            .map(|(&position, &tex_coord)| {
                Vertex::new(Vec3::from(position), Vec3::ONE, Vec2::from(tex_coord))
            });
        let (vertices, indices) = index_vertices(corners);

        info!(
            "Mesh loaded: {} corners collapsed to {} unique vertices, {} triangles",
            mesh.corner_count(),
            vertices.len(),
            mesh.triangle_count()
        );

        let vertex_buffer =
            uploader.upload_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&vertices))?;
        let index_buffer =
            uploader.upload_buffer(BufferUsage::Index, bytemuck::cast_slice(&indices))?;

        Ok((vertex_buffer, index_buffer, indices.len() as u32))
    }

    /// Creates the frame slots with their uniform buffers and descriptor
    /// sets.
    fn create_frame_slots(
        device: &Arc<Device>,
        command_pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        descriptor_layout: &DescriptorSetLayout,
        texture: &Texture,
    ) -> RenderResult<Vec<FrameSlot>> {
        let sets =
            descriptor_pool.allocate(descriptor_layout.handle(), MAX_FRAMES_IN_FLIGHT as u32)?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        for (i, set) in sets.into_iter().enumerate() {
            let uniform = Buffer::new(device.clone(), BufferUsage::Uniform, TransformUbo::SIZE)?;

            let uniform_info = buffer_info(uniform.handle(), 0, TransformUbo::SIZE);
            let image_info = texture.descriptor_info();

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&uniform_info)),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&image_info)),
            ];
            update_descriptor_sets(device, &writes);

            debug!("Created frame slot {}", i);

            frames.push(FrameSlot::new(device.clone(), command_pool, uniform, set)?);
        }

        Ok(frames)
    }

    /// Notes the new framebuffer size.
    ///
    /// A zero dimension means the window is minimized; rendering suspends
    /// until a non-zero size arrives. Otherwise this only marks a flag,
    /// and the swapchain is recreated after the next present.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Window minimized, suspending rendering");
            self.width = width;
            self.height = height;
            return;
        }

        if width != self.width || height != self.height {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.resize_requested = true;
        }
    }

    /// Renders one frame.
    ///
    /// The cycle is: wait for the slot's fence, acquire a swapchain image,
    /// re-record the slot's command buffer, submit, present, then advance
    /// the frame and semaphore counters. An out-of-date acquire abandons
    /// the frame entirely: the swapchain is recreated, the fence stays
    /// signaled, and no counter moves, so the next call retries with the
    /// same slot and semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error on any device loss or unexpected Vulkan failure.
    /// Out-of-date and suboptimal swapchains are handled internally.
    pub fn render_frame(&mut self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        let frame = self.sync.current_frame();
        self.frames[frame].in_flight.wait(u64::MAX)?;

        let acquire_semaphore = self.sync.acquire_semaphore();
        let image_index = match self.swapchain.acquire_next_image(acquire_semaphore) {
            // A suboptimal acquire still renders; present deals with it
            Ok((image_index, _suboptimal)) => image_index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on acquire, recreating");
                self.recreate_swapchain()?;
                return Ok(());
            }
            Err(e) => return Err(RhiError::from(e).into()),
        };

        // The acquire succeeded, so this frame will submit: only now is it
        // safe to reset the fence without risking a permanent deadlock
        self.frames[frame].in_flight.reset()?;

        let ubo = TransformUbo::spinning(
            self.timer.elapsed_secs(),
            self.swapchain.width(),
            self.swapchain.height(),
        );
        self.frames[frame].uniform.write_data(0, ubo.as_bytes())?;

        self.record_commands(frame, image_index)?;

        let wait_semaphores = [acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.frames[frame].command_buffer.handle()];
        let render_finished = self.sync.render_finished_semaphore(image_index);
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.device.submit_graphics(
            std::slice::from_ref(&submit_info),
            self.frames[frame].in_flight.handle(),
        )?;

        let needs_recreate = match self
            .swapchain
            .present(self.device.present_queue(), image_index, render_finished)
        {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(vk::Result::SUBOPTIMAL_KHR) => true,
            Err(e) => return Err(RhiError::from(e).into()),
        };

        // The one place per frame the resize flag is honored
        if needs_recreate || self.resize_requested {
            debug!("Recreating swapchain after present");
            self.recreate_swapchain()?;
        }

        self.sync.advance();

        Ok(())
    }

    /// Re-records the slot's command buffer for the acquired image.
    fn record_commands(&self, frame: usize, image_index: u32) -> RenderResult<()> {
        let cmd = &self.frames[frame].command_buffer;

        cmd.reset()?;
        cmd.begin()?;

        self.strategy
            .begin_frame(cmd, &self.swapchain, &self.targets, image_index);

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

        // The pipeline leaves viewport and scissor dynamic so resizes
        // don't force a rebuild
        let extent = self.swapchain.extent();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        cmd.set_viewport(&viewport);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        cmd.set_scissor(&scissor);

        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &[self.frames[frame].descriptor_set],
            &[],
        );

        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);

        self.strategy.end_frame(cmd, &self.swapchain, image_index);

        cmd.end()?;

        Ok(())
    }

    /// Rebuilds everything that depends on the swapchain.
    ///
    /// The swapchain recreation waits for the device to go idle, so the
    /// old targets, framebuffers, and semaphores are free to destroy.
    /// Semaphore pools are only rebuilt when the image count actually
    /// changed.
    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.width, self.height)?;

        self.targets
            .recreate(self.swapchain.width(), self.swapchain.height())?;
        self.strategy.rebuild(&self.swapchain, &self.targets)?;
        self.sync
            .match_image_count(&self.device, self.swapchain.image_count())?;

        self.resize_requested = false;

        info!(
            "Swapchain recreated at {}x{}",
            self.swapchain.width(),
            self.swapchain.height()
        );

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during teardown: {:?}", e);
        }

        // Children first, then the device's own Arc, then surface and
        // instance
        unsafe {
            ManuallyDrop::drop(&mut self.sync);
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.index_buffer);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_layout);
            ManuallyDrop::drop(&mut self.strategy);
            ManuallyDrop::drop(&mut self.targets);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
