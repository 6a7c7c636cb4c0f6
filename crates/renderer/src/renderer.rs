//! Main renderer orchestration.
//!
//! This module provides the main [`Renderer`] struct that coordinates
//! all Vulkan resources and the per-frame presentation loop.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use vk2d_platform::{Surface, Window};
use vk2d_rhi::buffer::{Buffer, BufferUsage};
use vk2d_rhi::command::{CommandBuffer, CommandPool};
use vk2d_rhi::device::Device;
use vk2d_rhi::instance::Instance;
use vk2d_rhi::physical_device::select_physical_device;
use vk2d_rhi::pipeline::{Pipeline, PipelineLayout};
use vk2d_rhi::shader::{Shader, ShaderStage};
use vk2d_rhi::swapchain::Swapchain;
use vk2d_rhi::transfer::upload_to_device;
use vk2d_rhi::vertex::Vertex;
use vk2d_rhi::{RhiError, RhiResult};

use crate::frame::{FrameCursor, FrameSlot};

/// Background color for every frame.
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// Main renderer that manages all Vulkan resources.
///
/// The renderer draws static 2D geometry uploaded once at creation. The
/// window is fixed-size, so the swapchain is never recreated; acquire and
/// present failures are reported as errors rather than recovered from.
///
/// # Resource Destruction Order
///
/// Vulkan resources must be destroyed in the correct order:
/// 1. Wait for all GPU work to complete
/// 2. Destroy per-frame resources (semaphores, fences, command buffers)
/// 3. Destroy the vertex buffer, pipeline, and command pool
/// 4. Destroy the swapchain, then the surface
/// 5. Destroy the device, then the instance
///
/// ManuallyDrop is used to enforce this order in [`Drop`].
pub struct Renderer {
    // Core Vulkan resources (in reverse destruction order)
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Logical device (destroyed after all device resources).
    device: ManuallyDrop<Arc<Device>>,
    /// Window surface (destroyed after the swapchain, before the instance).
    surface: ManuallyDrop<Surface>,
    /// Swapchain images and views.
    swapchain: ManuallyDrop<Swapchain>,

    // Pipeline resources
    /// Fixed 2D graphics pipeline.
    pipeline: ManuallyDrop<Pipeline>,
    /// Empty pipeline layout the pipeline was created with.
    pipeline_layout: ManuallyDrop<PipelineLayout>,

    // Command and geometry resources
    /// Pool serving the per-frame buffers and the startup transfer.
    command_pool: ManuallyDrop<CommandPool>,
    /// Device-local buffer holding the static geometry.
    vertex_buffer: ManuallyDrop<Buffer>,
    /// Number of vertices to draw each frame.
    vertex_count: u32,

    // Per-frame resources
    /// One entry per frame slot.
    frames: Vec<FrameSlot>,
    /// Which slot the next frame records into.
    cursor: FrameCursor,
}

impl Renderer {
    /// Creates a new renderer for the given window with `frames_in_flight`
    /// frame slots ([`DEFAULT_FRAMES_IN_FLIGHT`] is the usual choice; 1
    /// serializes the CPU behind the GPU).
    ///
    /// Initializes all Vulkan resources and uploads `vertices` into
    /// device-local memory. The upload completes before this returns.
    ///
    /// [`DEFAULT_FRAMES_IN_FLIGHT`]: vk2d_rhi::sync::DEFAULT_FRAMES_IN_FLIGHT
    ///
    /// # Errors
    ///
    /// Returns an error if `frames_in_flight` is zero, or if any Vulkan
    /// resource creation or the geometry upload fails.
    pub fn new(
        window: &Window,
        vertices: &[Vertex],
        frames_in_flight: usize,
    ) -> RhiResult<Self> {
        if frames_in_flight == 0 {
            return Err(RhiError::InvalidHandle(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let width = window.width();
        let height = window.height();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        // Create Vulkan instance with validation in debug builds
        let enable_validation = cfg!(debug_assertions);
        let surface_extensions = window
            .required_surface_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(enable_validation, &surface_extensions)?;

        // Create surface
        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        // Select physical device and create logical device
        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), Some(surface.loader()))?;
        let device = Device::new(&instance, &physical_device_info)?;

        // Create swapchain
        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        // Create the 2D pipeline
        let pipeline_layout = PipelineLayout::new(device.clone())?;
        let pipeline = Self::create_pipeline(
            device.clone(),
            swapchain.format(),
            &pipeline_layout,
        )?;

        // Create the command pool and per-frame resources
        let graphics_family = physical_device_info
            .queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let frames = FrameSlot::create_all(&device, &command_pool, frames_in_flight)?;

        // Upload the static geometry through a staging buffer
        let (vertex_buffer, vertex_count) =
            Self::upload_static_geometry(device.clone(), &command_pool, vertices)?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} vertices",
            swapchain.image_count(),
            frames_in_flight,
            vertex_count
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            swapchain: ManuallyDrop::new(swapchain),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            command_pool: ManuallyDrop::new(command_pool),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            vertex_count,
            frames,
            cursor: FrameCursor::new(frames_in_flight),
        })
    }

    /// Creates the 2D graphics pipeline from the on-disk SPIR-V shaders.
    fn create_pipeline(
        device: Arc<Device>,
        swapchain_format: vk::Format,
        layout: &PipelineLayout,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/triangle.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;

        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new("shaders/spirv/triangle.frag.spv"),
            ShaderStage::Fragment,
            "main",
        )?;

        // The shader modules are no longer needed once the pipeline exists.
        Pipeline::new_2d(
            device,
            &vertex_shader,
            &fragment_shader,
            swapchain_format,
            layout,
        )
    }

    /// Uploads the vertex data into a device-local buffer.
    fn upload_static_geometry(
        device: Arc<Device>,
        command_pool: &CommandPool,
        vertices: &[Vertex],
    ) -> RhiResult<(Buffer, u32)> {
        if vertices.is_empty() {
            return Err(RhiError::InvalidHandle(
                "Cannot upload empty vertex data".to_string(),
            ));
        }

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = upload_to_device(device, command_pool, BufferUsage::Vertex, bytes)?;

        info!(
            "Static geometry uploaded: {} vertices ({} bytes)",
            vertices.len(),
            bytes.len()
        );

        Ok((buffer, vertices.len() as u32))
    }

    /// Renders and presents one frame.
    ///
    /// Waits for the current slot's previous frame to retire, acquires a
    /// swapchain image, re-records the slot's command buffer, submits it,
    /// and presents. A suboptimal swapchain is logged and tolerated; any
    /// acquire or present failure is returned as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan operation fails.
    pub fn draw_frame(&mut self) -> RhiResult<()> {
        let frame = &self.frames[self.cursor.slot()];

        // Wait for this slot's previous work to complete, then re-arm the fence
        frame.sync().fence().wait(u64::MAX)?;
        frame.sync().fence().reset()?;

        // Acquire next swapchain image
        let (image_index, suboptimal) = self
            .swapchain
            .acquire_next_image(frame.sync().image_available())
            .map_err(RhiError::VulkanError)?;
        if suboptimal {
            debug!("Acquired image from suboptimal swapchain");
        }

        // Record commands for this frame
        frame.command_buffer().reset()?;
        self.record_commands(frame.command_buffer(), image_index)?;

        // Submit - wait for the acquired image, signal completion
        let wait_semaphores = [frame.sync().image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync().render_finished()];
        let command_buffers = [frame.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: The command buffer is fully recorded and the fence was
        // reset above after its wait completed.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.sync().fence().handle())?;
        }

        // Present - wait for rendering to finish
        let present_suboptimal = self
            .swapchain
            .present(
                self.device.present_queue(),
                image_index,
                frame.sync().render_finished(),
            )
            .map_err(RhiError::VulkanError)?;
        if present_suboptimal {
            debug!("Present returned suboptimal=true");
        }

        // Advance to the next frame slot
        self.cursor.advance();

        Ok(())
    }

    /// Records rendering commands for a frame.
    fn record_commands(&self, cmd: &CommandBuffer, image_index: u32) -> RhiResult<()> {
        cmd.begin()?;

        let color_image = self.swapchain.image(image_index as usize);

        // Transition the swapchain image for rendering
        self.cmd_transition_image_layout(
            cmd,
            color_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_view(image_index as usize))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            });

        let extent = self.swapchain.extent();
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.begin_rendering(&rendering_info);

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

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
        cmd.draw(self.vertex_count, 1, 0, 0);

        cmd.end_rendering();

        // Transition the swapchain image for presentation
        self.cmd_transition_image_layout(
            cmd,
            color_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        cmd.end()
    }

    /// Records an image layout transition on the swapchain image.
    fn cmd_transition_image_layout(
        &self,
        cmd: &CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::AccessFlags::empty(),
            ),
            _ => {
                warn!(
                    "Unhandled layout transition: {:?} -> {:?}",
                    old_layout, new_layout
                );
                (
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                )
            }
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
    }

    /// Waits for all submitted GPU work to complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // Per-frame fences and semaphores go first
        self.frames.clear();

        // Then everything that holds the device, then the device itself,
        // then the surface and instance.
        unsafe {
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
