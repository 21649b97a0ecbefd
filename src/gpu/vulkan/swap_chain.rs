use super::{GPUError, Result, VulkanContext};
use crate::{utils::PerFrame, AcquiredImage, Extent2D, SurfaceChain, SurfaceStatus};
use ash::{extensions::khr, vk, Device};
use std::rc::Rc;
use vk_mem::Alloc;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Clone, Copy, Default)]
struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

struct DepthTarget {
    image: vk::Image,
    allocation: vk_mem::Allocation,
    view: vk::ImageView,
}

pub(super) fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

pub(super) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub(super) fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    requested: Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub(super) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Fence of the last submission that rendered into each image. A slot is
/// free for recording once its fence has signaled.
#[derive(Default)]
struct ImageGuards(Vec<vk::Fence>);

impl ImageGuards {
    fn new(count: usize) -> Self {
        Self(vec![vk::Fence::null(); count])
    }

    fn pending(&self, idx: usize) -> Option<vk::Fence> {
        self.0
            .get(idx)
            .copied()
            .filter(|fence| *fence != vk::Fence::null())
    }

    fn claim(&mut self, idx: usize, fence: vk::Fence) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = fence;
        }
    }
}

fn pick_depth_format<F>(supports: F) -> Option<vk::Format>
where
    F: Fn(vk::Format) -> bool,
{
    DEPTH_CANDIDATES.into_iter().find(|f| supports(*f))
}

/// Presentable images of one window surface plus the depth targets,
/// framebuffers and render pass drawn into them.
///
/// Acquire and present are serialized by [`MAX_FRAMES_IN_FLIGHT`] sets of
/// semaphores and fences together with a per-image fence table, so a
/// submission for an image never overtakes the previous one still using it.
pub struct SwapChain {
    device: Device,
    allocator: Rc<vk_mem::Allocator>,
    loader: khr::Swapchain,
    raw: vk::SwapchainKHR,
    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    depth: Vec<DepthTarget>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    sync: PerFrame<FrameSync>,
    images_in_flight: ImageGuards,
    gfx_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl SwapChain {
    /// Builds a chain for `extent`. `previous`, if any, is handed to the
    /// driver as the retiring chain and released once the new chain exists.
    pub(super) fn new(
        ctx: &VulkanContext,
        extent: Extent2D,
        previous: Option<SwapChain>,
    ) -> Result<Self> {
        let surface = ctx
            .surface
            .as_ref()
            .ok_or(GPUError::HeadlessDisplayNotSupported)?;
        if extent.is_degenerate() {
            return Err(GPUError::SurfaceCreationError(format!(
                "cannot build a swap chain for a {}x{} surface",
                extent.width, extent.height
            )));
        }

        let surface_err = |what: &str, e: vk::Result| {
            GPUError::SurfaceCreationError(format!("{}: {}", what, e))
        };
        let caps = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(ctx.pdevice, surface.raw)
        }
        .map_err(|e| surface_err("surface capabilities", e))?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(ctx.pdevice, surface.raw)
        }
        .map_err(|e| surface_err("surface formats", e))?;
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(ctx.pdevice, surface.raw)
        }
        .map_err(|e| surface_err("present modes", e))?;

        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| GPUError::SurfaceCreationError("surface reports no formats".into()))?;
        let present_mode = choose_present_mode(&present_modes, ctx.display.vsync);
        let chosen_extent = choose_extent(&caps, extent);
        if Extent2D::from(chosen_extent).is_degenerate() {
            return Err(GPUError::SurfaceCreationError(format!(
                "surface extent is {}x{}",
                chosen_extent.width, chosen_extent.height
            )));
        }
        let min_images = choose_image_count(&caps, ctx.display.buffering.image_count());

        let depth_format = pick_depth_format(|format| {
            let props = unsafe {
                ctx.instance
                    .get_physical_device_format_properties(ctx.pdevice, format)
            };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| GPUError::SurfaceCreationError("no supported depth format".into()))?;

        let families = [ctx.gfx_queue.family, ctx.present_queue.family];
        let (sharing_mode, family_indices) = if families[0] != families[1] {
            (vk::SharingMode::CONCURRENT, &families[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &families[..0])
        };

        let old_swapchain = previous
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |p| p.raw);

        let loader = khr::Swapchain::new(&ctx.instance, &ctx.device);
        let raw = unsafe {
            loader.create_swapchain(
                &vk::SwapchainCreateInfoKHR::builder()
                    .surface(surface.raw)
                    .min_image_count(min_images)
                    .image_format(surface_format.format)
                    .image_color_space(surface_format.color_space)
                    .image_extent(chosen_extent)
                    .image_array_layers(1)
                    .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                    .image_sharing_mode(sharing_mode)
                    .queue_family_indices(family_indices)
                    .pre_transform(caps.current_transform)
                    .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                    .present_mode(present_mode)
                    .clipped(true)
                    .old_swapchain(old_swapchain)
                    .build(),
                None,
            )
        }
        .map_err(|e| surface_err("swap chain rejected", e))?;

        let mut chain = SwapChain {
            device: ctx.device.clone(),
            allocator: Rc::clone(&ctx.allocator),
            loader,
            raw,
            format: surface_format.format,
            depth_format,
            extent: chosen_extent,
            images: Vec::new(),
            views: Vec::new(),
            depth: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            sync: PerFrame::default(),
            images_in_flight: ImageGuards::default(),
            gfx_queue: ctx.gfx_queue.queue,
            present_queue: ctx.present_queue.queue,
        };

        chain.images = unsafe { chain.loader.get_swapchain_images(raw) }
            .map_err(|e| surface_err("swap chain images", e))?;
        chain.create_image_views()?;
        chain.create_render_pass()?;
        chain.create_depth_resources()?;
        chain.create_framebuffers()?;
        chain.create_sync_objects()?;
        chain.images_in_flight = ImageGuards::new(chain.images.len());

        ctx.set_name(chain.raw, "ege.swap_chain", vk::ObjectType::SWAPCHAIN_KHR);
        ctx.set_name(
            chain.render_pass,
            "ege.swap_chain.render_pass",
            vk::ObjectType::RENDER_PASS,
        );

        // Retire the predecessor only now that its replacement is complete.
        drop(previous);

        log::info!(
            "swap chain ready: {} images, {}x{}, {:?}, {:?}",
            chain.images.len(),
            chain.extent.width,
            chain.extent.height,
            chain.format,
            present_mode
        );
        Ok(chain)
    }

    fn create_image_views(&mut self) -> Result<()> {
        for &image in &self.images {
            let view = unsafe {
                self.device.create_image_view(
                    &vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(self.format)
                        .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
                        .build(),
                    None,
                )
            }?;
            self.views.push(view);
        }
        Ok(())
    }

    fn create_render_pass(&mut self) -> Result<()> {
        let attachments = [
            vk::AttachmentDescription {
                format: self.format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: self.depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: stages,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: stages,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        }];

        self.render_pass = unsafe {
            self.device.create_render_pass(
                &vk::RenderPassCreateInfo::builder()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .dependencies(&dependencies)
                    .build(),
                None,
            )
        }?;
        Ok(())
    }

    fn create_depth_resources(&mut self) -> Result<()> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            ..Default::default()
        };

        for _ in 0..self.images.len() {
            let (image, allocation) = unsafe {
                self.allocator.create_image(
                    &vk::ImageCreateInfo::builder()
                        .image_type(vk::ImageType::TYPE_2D)
                        .extent(vk::Extent3D {
                            width: self.extent.width,
                            height: self.extent.height,
                            depth: 1,
                        })
                        .mip_levels(1)
                        .array_layers(1)
                        .format(self.depth_format)
                        .tiling(vk::ImageTiling::OPTIMAL)
                        .initial_layout(vk::ImageLayout::UNDEFINED)
                        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .sharing_mode(vk::SharingMode::EXCLUSIVE)
                        .build(),
                    &alloc_info,
                )
            }?;
            self.depth.push(DepthTarget {
                image,
                allocation,
                view: vk::ImageView::null(),
            });

            let view = unsafe {
                self.device.create_image_view(
                    &vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(self.depth_format)
                        .subresource_range(subresource_range(vk::ImageAspectFlags::DEPTH))
                        .build(),
                    None,
                )
            }?;
            if let Some(target) = self.depth.last_mut() {
                target.view = view;
            }
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        for (view, depth) in self.views.iter().zip(&self.depth) {
            let attachments = [*view, depth.view];
            let fb = unsafe {
                self.device.create_framebuffer(
                    &vk::FramebufferCreateInfo::builder()
                        .render_pass(self.render_pass)
                        .attachments(&attachments)
                        .width(self.extent.width)
                        .height(self.extent.height)
                        .layers(1)
                        .build(),
                    None,
                )
            }?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    fn create_sync_objects(&mut self) -> Result<()> {
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let mut frame = FrameSync::default();
            let res = self.create_frame_sync(&mut frame);
            // Partially built sets are released by Drop.
            self.sync.push(frame);
            res?;
        }
        Ok(())
    }

    fn create_frame_sync(&self, frame: &mut FrameSync) -> Result<()> {
        let sem_info = vk::SemaphoreCreateInfo::builder().build();
        // Signaled so the first wait on each frame returns immediately.
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED)
            .build();
        unsafe {
            frame.image_available = self.device.create_semaphore(&sem_info, None)?;
            frame.render_finished = self.device.create_semaphore(&sem_info, None)?;
            frame.in_flight = self.device.create_fence(&fence_info, None)?;
        }
        Ok(())
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Render target for image `index`, if the chain has one.
    pub fn framebuffer(&self, index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index as usize).copied()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    fn check_index(&self, index: u32) -> Result<usize> {
        let idx = index as usize;
        if idx >= self.images.len() {
            return Err(GPUError::ImageIndexOutOfRange {
                index,
                count: self.images.len(),
            });
        }
        Ok(idx)
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::builder()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
        .build()
}

impl SurfaceChain for SwapChain {
    type CommandBuffer = vk::CommandBuffer;

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> Extent2D {
        self.extent.into()
    }

    fn acquire_next_image(&mut self) -> Result<AcquiredImage> {
        let sync = *self.sync.curr();
        unsafe {
            self.device
                .wait_for_fences(&[sync.in_flight], true, u64::MAX)
        }
        .map_err(GPUError::AcquireError)?;

        let res = unsafe {
            self.loader.acquire_next_image(
                self.raw,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        match res {
            Ok((index, suboptimal)) => {
                let idx = self.check_index(index)?;
                // The slot for this image may still be pending under the other
                // frame's fence; it must not be re-recorded before that signals.
                if let Some(guard) = self.images_in_flight.pending(idx) {
                    unsafe { self.device.wait_for_fences(&[guard], true, u64::MAX) }
                        .map_err(GPUError::AcquireError)?;
                }
                let status = if suboptimal {
                    SurfaceStatus::Suboptimal
                } else {
                    SurfaceStatus::Ready
                };
                Ok(AcquiredImage { index, status })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::stale()),
            Err(e) => Err(GPUError::AcquireError(e)),
        }
    }

    fn submit_and_present(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SurfaceStatus> {
        let idx = self.check_index(image_index)?;
        let sync = *self.sync.curr();

        self.images_in_flight.claim(idx, sync.in_flight);

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [sync.render_finished];
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .reset_fences(&[sync.in_flight])
                .map_err(GPUError::SubmitError)?;
            self.device
                .queue_submit(self.gfx_queue, &[submit], sync.in_flight)
                .map_err(GPUError::SubmitError)?;
        }

        let swapchains = [self.raw];
        let indices = [image_index];
        let present = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices)
            .build();
        let res = unsafe { self.loader.queue_present(self.present_queue, &present) };

        self.sync.advance_next_frame();

        match res {
            Ok(false) => Ok(SurfaceStatus::Ready),
            Ok(true) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
            Err(e) => Err(GPUError::SubmitError(e)),
        }
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        let device = &self.device;
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            for mut target in self.depth.drain(..) {
                device.destroy_image_view(target.view, None);
                self.allocator
                    .destroy_image(target.image, &mut target.allocation);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }
            self.sync.drain(|frame| {
                device.destroy_semaphore(frame.image_available, None);
                device.destroy_semaphore(frame.render_finished, None);
                device.destroy_fence(frame.in_flight, None);
            });
            if self.raw != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.raw, None);
            }
        }
        log::debug!("swap chain released");
    }
}
