pub mod structs;
pub use structs::*;

pub mod vulkan;
pub use vulkan::*;

/// Outcome reported by the presentation engine for an acquire or a present.
///
/// Fatal outcomes are carried as `Err(GPUError)` next to this type, so a
/// `Result<SurfaceStatus>` covers every case a caller has to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The chain matches the display surface.
    Ready,
    /// The chain is still usable this frame but should be rebuilt soon.
    Suboptimal,
    /// The chain no longer matches the display surface and must be rebuilt
    /// before anything else is submitted against it.
    Stale,
}

/// Result of asking a [`SurfaceChain`] for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the image to render into. Meaningless when `status` is
    /// [`SurfaceStatus::Stale`].
    pub index: u32,
    pub status: SurfaceStatus,
}

impl AcquiredImage {
    pub fn stale() -> Self {
        Self {
            index: 0,
            status: SurfaceStatus::Stale,
        }
    }
}

/// A chain of presentable images together with the render targets and the
/// render pass compatible with them.
///
/// The chain owns the synchronization primitives that keep a submission for
/// image `I` from running before the previous consumer of `I` has finished;
/// callers only see acquire and submit.
pub trait SurfaceChain {
    type CommandBuffer: Copy;

    /// Number of images in the chain. Fixed for the lifetime of the chain.
    fn image_count(&self) -> usize;

    /// Extent shared by every render target of the chain.
    fn extent(&self) -> Extent2D;

    /// Returns the index of the next image ready to be rendered into.
    ///
    /// When the status is not [`SurfaceStatus::Stale`], every earlier
    /// submission that rendered into `index` has finished, so the command
    /// buffer recorded for that image may be recorded again.
    fn acquire_next_image(&mut self) -> Result<AcquiredImage>;

    /// Submits `cmd` and requests presentation of `image_index`.
    ///
    /// # Prerequisites
    /// - `image_index` was returned by the latest [`Self::acquire_next_image`].
    /// - `cmd` is fully recorded.
    fn submit_and_present(
        &mut self,
        cmd: Self::CommandBuffer,
        image_index: u32,
    ) -> Result<SurfaceStatus>;
}

/// Defines the interface that rendering backends must implement.
///
/// A backend wraps the low-level graphics API and owns the logical device,
/// its queues and the pool command buffers are allocated from. Every
/// resource it hands out must be released before the backend itself.
///
/// # Examples
/// ```ignore
/// use ege::gpu::Backend;
/// fn slots<B: Backend>(ctx: &mut B, chain: &B::SwapChain) {
///     let cmds = ctx.allocate_command_buffers(chain.image_count()).unwrap();
///     ctx.free_command_buffers(cmds);
/// }
/// ```
pub trait Backend {
    type CommandBuffer: Copy;
    type SwapChain: SurfaceChain<CommandBuffer = Self::CommandBuffer>;
    type PipelineLayout;
    type Pipeline;
    type Model;

    /// Blocks until the device has finished all submitted work.
    fn wait_idle(&mut self) -> Result<()>;

    /// Uploads `vertices` into a GPU resident vertex buffer.
    fn make_model(&mut self, vertices: &[Vertex]) -> Result<Self::Model>;

    /// Builds the layout describing the push-constant block used by draws.
    fn make_pipeline_layout(&mut self) -> Result<Self::PipelineLayout>;

    /// Builds a chain for `extent`, retiring `previous` once the new chain is
    /// complete.
    fn make_swap_chain(
        &mut self,
        extent: Extent2D,
        previous: Option<Self::SwapChain>,
    ) -> Result<Self::SwapChain>;

    /// Builds a pipeline compatible with the render pass of `chain`.
    fn make_pipeline(
        &mut self,
        layout: &Self::PipelineLayout,
        chain: &Self::SwapChain,
        shaders: &ShaderPaths,
    ) -> Result<Self::Pipeline>;

    fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<Self::CommandBuffer>>;

    /// # Prerequisites
    /// - None of `buffers` may still be pending on the GPU.
    fn free_command_buffers(&mut self, buffers: Vec<Self::CommandBuffer>);

    fn begin_recording(&mut self, cmd: Self::CommandBuffer) -> Result<()>;

    fn begin_render_pass(
        &mut self,
        cmd: Self::CommandBuffer,
        chain: &Self::SwapChain,
        image_index: u32,
        clear: &ClearValues,
    );

    fn set_viewport(&mut self, cmd: Self::CommandBuffer, extent: Extent2D);

    fn set_scissor(&mut self, cmd: Self::CommandBuffer, extent: Extent2D);

    fn bind_pipeline(&mut self, cmd: Self::CommandBuffer, pipeline: &Self::Pipeline);

    fn bind_model(&mut self, cmd: Self::CommandBuffer, model: &Self::Model);

    fn push_constants(
        &mut self,
        cmd: Self::CommandBuffer,
        layout: &Self::PipelineLayout,
        block: &PushConstantBlock,
    );

    fn draw_model(&mut self, cmd: Self::CommandBuffer, model: &Self::Model);

    fn end_render_pass(&mut self, cmd: Self::CommandBuffer);

    fn end_recording(&mut self, cmd: Self::CommandBuffer) -> Result<()>;
}
