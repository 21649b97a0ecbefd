mod error;
use crate::{
    Backend, ClearValues, Extent2D, PushConstantBlock, ShaderPaths, SurfaceChain, Vertex,
};
use ash::extensions::{ext::DebugUtils, khr};
use ash::*;
use raw_window_handle::HasRawWindowHandle;
pub use error::*;
use std::{
    ffi::{c_char, c_void, CStr, CString},
    mem::ManuallyDrop,
    rc::Rc,
};

pub mod device_selector;
pub use device_selector::*;
pub mod structs;
pub use structs::*;

mod command_pool;
pub use command_pool::CommandPool;

mod swap_chain;
pub use swap_chain::*;

mod pipelines;
pub use pipelines::*;

mod model;
pub use model::*;

/// Names of debugging layers that should be enabled when validation is requested.
pub const DEBUG_LAYER_NAMES: [*const c_char; 1] =
    [b"VK_LAYER_KHRONOS_validation\0".as_ptr() as *const c_char];

fn log_level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr((*p_callback_data).p_message) };
    log::log!(
        target: "ege::validation",
        log_level_for(message_severity),
        "[{:?}] {}",
        message_type,
        message.to_string_lossy()
    );
    vk::FALSE
}

fn validation_requested() -> bool {
    std::env::var("EGE_VALIDATION")
        .map(|v| v == "1")
        .unwrap_or(false)
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Queue {
    queue: vk::Queue,
    family: u32,
}

pub(super) struct Surface {
    loader: khr::Surface,
    raw: vk::SurfaceKHR,
}

/// Owns the Vulkan instance, the logical device, its graphics and present
/// queues, the command pool every frame slot is allocated from and the
/// memory allocator shared by buffers and depth targets.
///
/// Everything created through this context must be dropped before it.
pub struct VulkanContext {
    // Keeps the loader alive for the instance and device.
    #[allow(dead_code)]
    pub(super) entry: ash::Entry,
    pub(super) instance: ash::Instance,
    pub(super) pdevice: vk::PhysicalDevice,
    pub(super) device: ash::Device,
    pub(super) selected: SelectedDevice,
    pub(super) pool: CommandPool,
    pub(super) allocator: ManuallyDrop<Rc<vk_mem::Allocator>>,
    pub(super) gfx_queue: Queue,
    pub(super) present_queue: Queue,
    pub(super) surface: Option<Surface>,
    pub(super) display: DisplayInfo,
    pub(super) debug_utils: Option<DebugUtils>,
    pub(super) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl std::panic::UnwindSafe for VulkanContext {}

struct Core {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanContext {
    fn init_instance(surface_exts: &[*const c_char], enable_validation: bool) -> Result<Core> {
        let app_name = CString::new("Enchanted Engine").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&app_name)
            .api_version(vk::make_api_version(0, 1, 3, 0))
            .build();

        let entry = unsafe { Entry::load() }?;
        let mut inst_exts: Vec<*const c_char> = surface_exts.to_vec();

        let mut inst_layers = Vec::new();
        if enable_validation {
            let available_layers = entry.enumerate_instance_layer_properties()?;
            for &layer in &DEBUG_LAYER_NAMES {
                let name = unsafe { CStr::from_ptr(layer) };
                if available_layers
                    .iter()
                    .any(|prop| unsafe { CStr::from_ptr(prop.layer_name.as_ptr()) == name })
                {
                    inst_layers.push(layer);
                } else {
                    log::warn!("validation requested but {:?} is not installed", name);
                }
            }
            inst_exts.push(DebugUtils::name().as_ptr());
        }

        let instance = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::builder()
                    .application_info(&app_info)
                    .enabled_extension_names(&inst_exts)
                    .enabled_layer_names(&inst_layers)
                    .build(),
                None,
            )
        }?;

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vulkan_debug_callback));
            match unsafe { debug_utils.create_debug_utils_messenger(&messenger_ci, None) } {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err.into());
                }
            }
        } else {
            (None, None)
        };

        Ok(Core {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn init_device(
        core: Core,
        surface: Option<Surface>,
        info: &ContextInfo,
    ) -> Result<Self> {
        let target = surface.as_ref().map(|s| PresentTarget {
            loader: &s.loader,
            surface: s.raw,
        });
        let selected = match select_device(&core.instance, target.as_ref(), info.preferred_device) {
            Ok(selected) => selected,
            Err(err) => {
                Self::destroy_core(&core, surface.as_ref());
                return Err(err);
            }
        };
        log::info!("selected device {}", selected);

        let priorities = [1.0];
        let mut unique_families = vec![selected.graphics_family];
        if selected.present_family != selected.graphics_family {
            unique_families.push(selected.present_family);
        }
        let queue_infos: Vec<_> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = if surface.is_some() {
            vec![khr::Swapchain::name().as_ptr()]
        } else {
            Vec::new()
        };

        let features = vk::PhysicalDeviceFeatures::default();
        let device_ci = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .build();

        let created = unsafe { core.instance.create_device(selected.pdevice, &device_ci, None) };
        let device = match created {
            Ok(device) => device,
            Err(err) => {
                Self::destroy_core(&core, surface.as_ref());
                return Err(err.into());
            }
        };

        let gfx_queue = Queue {
            queue: unsafe { device.get_device_queue(selected.graphics_family, 0) },
            family: selected.graphics_family,
        };
        let present_queue = Queue {
            queue: unsafe { device.get_device_queue(selected.present_family, 0) },
            family: selected.present_family,
        };

        let teardown = |device: &ash::Device| unsafe {
            device.destroy_device(None);
            Self::destroy_core(&core, surface.as_ref());
        };

        let pool = match CommandPool::new(&device, gfx_queue.family) {
            Ok(pool) => pool,
            Err(err) => {
                teardown(&device);
                return Err(err);
            }
        };

        let allocator = match vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(
            &core.instance,
            &device,
            selected.pdevice,
        )) {
            Ok(allocator) => allocator,
            Err(err) => {
                let mut pool = pool;
                pool.destroy();
                teardown(&device);
                return Err(err.into());
            }
        };

        let ctx = VulkanContext {
            entry: core.entry,
            instance: core.instance,
            pdevice: selected.pdevice,
            device,
            selected,
            pool,
            allocator: ManuallyDrop::new(Rc::new(allocator)),
            gfx_queue,
            present_queue,
            surface,
            display: info.display,
            debug_utils: core.debug_utils,
            debug_messenger: core.debug_messenger,
        };
        ctx.set_name(ctx.pool.raw(), "ege.command_pool", vk::ObjectType::COMMAND_POOL);
        Ok(ctx)
    }

    fn destroy_core(core: &Core, surface: Option<&Surface>) {
        unsafe {
            if let Some(surface) = surface {
                surface.loader.destroy_surface(surface.raw, None);
            }
            if let (Some(utils), Some(messenger)) = (&core.debug_utils, core.debug_messenger) {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            core.instance.destroy_instance(None);
        }
    }

    /// Construct a context presenting to `window`.
    ///
    /// Validation layers and the debug messenger are enabled when the
    /// `EGE_VALIDATION` environment variable is `1`.
    pub fn new(info: &ContextInfo, window: &dyn HasRawWindowHandle) -> Result<Self> {
        let surface_exts = ash_window::enumerate_required_extensions(window)?;
        let mut exts = surface_exts.to_vec();
        if !exts
            .iter()
            .any(|&e| unsafe { CStr::from_ptr(e) } == khr::Surface::name())
        {
            exts.push(khr::Surface::name().as_ptr());
        }

        let core = Self::init_instance(&exts, validation_requested())?;
        let created =
            unsafe { ash_window::create_surface(&core.entry, &core.instance, window, None) };
        let raw = match created {
            Ok(raw) => raw,
            Err(err) => {
                Self::destroy_core(&core, None);
                return Err(GPUError::SurfaceCreationError(format!(
                    "window surface rejected: {}",
                    err
                )));
            }
        };
        let surface = Surface {
            loader: khr::Surface::new(&core.entry, &core.instance),
            raw,
        };

        let ctx = Self::init_device(core, Some(surface), info)?;
        log::info!("vulkan context ready (validation: {})", ctx.debug_utils.is_some());
        Ok(ctx)
    }

    /// Construct a context without any windowing support.
    ///
    /// Useful for tests and tooling. Asking it for a swap chain fails with
    /// [`GPUError::HeadlessDisplayNotSupported`].
    pub fn headless(info: &ContextInfo) -> Result<Self> {
        let core = Self::init_instance(&[], validation_requested())?;
        let ctx = Self::init_device(core, None, info)?;
        log::info!("headless vulkan context ready");
        Ok(ctx)
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.selected.info
    }

    pub fn display_info(&self) -> &DisplayInfo {
        &self.display
    }

    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }

    pub(super) fn set_name<T>(&self, obj: T, name: &str, t: vk::ObjectType)
    where
        T: ash::vk::Handle,
    {
        let Some(utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let res = unsafe {
            utils.set_debug_utils_object_name(
                self.device.handle(),
                &vk::DebugUtilsObjectNameInfoEXT::builder()
                    .object_name(&name)
                    .object_type(t)
                    .object_handle(ash::vk::Handle::as_raw(obj))
                    .build(),
            )
        };
        if let Err(err) = res {
            log::warn!("failed to name {:?}: {}", name, err);
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            log::error!("device wait failed during shutdown: {}", err);
        }

        self.pool.destroy();

        if Rc::strong_count(&self.allocator) > 1 {
            log::error!(
                "allocator still shared at shutdown; a model or swap chain outlived its context"
            );
        }
        // Destroy allocator before tearing down device and instance
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
        }

        unsafe {
            self.device.destroy_device(None);
            if let Some(surface) = self.surface.take() {
                surface.loader.destroy_surface(surface.raw, None);
            }
            if let (Some(utils), Some(messenger)) =
                (&self.debug_utils, self.debug_messenger.take())
            {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::info!("vulkan context destroyed");
    }
}

impl Backend for VulkanContext {
    type CommandBuffer = vk::CommandBuffer;
    type SwapChain = SwapChain;
    type PipelineLayout = PipelineLayout;
    type Pipeline = Pipeline;
    type Model = Model;

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn make_model(&mut self, vertices: &[Vertex]) -> Result<Model> {
        Model::new(self, vertices)
    }

    fn make_pipeline_layout(&mut self) -> Result<PipelineLayout> {
        PipelineLayout::new(&self.device)
    }

    fn make_swap_chain(
        &mut self,
        extent: Extent2D,
        previous: Option<SwapChain>,
    ) -> Result<SwapChain> {
        SwapChain::new(self, extent, previous)
    }

    fn make_pipeline(
        &mut self,
        layout: &PipelineLayout,
        chain: &SwapChain,
        shaders: &ShaderPaths,
    ) -> Result<Pipeline> {
        Pipeline::new(
            &self.device,
            layout,
            chain.render_pass(),
            shaders,
            &PipelineConfig::default(),
        )
    }

    fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        self.pool.allocate(count)
    }

    fn free_command_buffers(&mut self, buffers: Vec<vk::CommandBuffer>) {
        self.pool.free(buffers)
    }

    fn begin_recording(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder().build())
                .map_err(GPUError::RecordingError)
        }
    }

    fn begin_render_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        chain: &SwapChain,
        image_index: u32,
        clear: &ClearValues,
    ) {
        let Some(framebuffer) = chain.framebuffer(image_index) else {
            log::error!("no framebuffer for image {}", image_index);
            return;
        };

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: clear.stencil,
                },
            },
        ];

        unsafe {
            self.device.cmd_begin_render_pass(
                cmd,
                &vk::RenderPassBeginInfo::builder()
                    .render_pass(chain.render_pass())
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: chain.extent().into(),
                    })
                    .clear_values(&clear_values)
                    .build(),
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn set_viewport(&mut self, cmd: vk::CommandBuffer, extent: Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe { self.device.cmd_set_viewport(cmd, 0, &[viewport]) };
    }

    fn set_scissor(&mut self, cmd: vk::CommandBuffer, extent: Extent2D) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: extent.into(),
        };
        unsafe { self.device.cmd_set_scissor(cmd, 0, &[scissor]) };
    }

    fn bind_pipeline(&mut self, cmd: vk::CommandBuffer, pipeline: &Pipeline) {
        pipeline.bind(cmd);
    }

    fn bind_model(&mut self, cmd: vk::CommandBuffer, model: &Model) {
        model.bind(cmd);
    }

    fn push_constants(
        &mut self,
        cmd: vk::CommandBuffer,
        layout: &PipelineLayout,
        block: &PushConstantBlock,
    ) {
        unsafe {
            self.device.cmd_push_constants(
                cmd,
                layout.raw(),
                PUSH_CONSTANT_STAGES,
                0,
                block.as_bytes(),
            );
        }
    }

    fn draw_model(&mut self, cmd: vk::CommandBuffer, model: &Model) {
        model.draw(cmd);
    }

    fn end_render_pass(&mut self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    fn end_recording(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(cmd)
                .map_err(GPUError::RecordingError)
        }
    }
}
