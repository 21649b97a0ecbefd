#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use ash::vk;
use ege::{
    AcquiredImage, Backend, ClearValues, ContextInfo, Extent2D, GPUError, PushConstantBlock,
    Result, ShaderPaths, SurfaceChain, SurfaceStatus, Vertex, VulkanContext, Window,
};

// ---------------------------------------------------------------------------
// Real context with validation forced on
// ---------------------------------------------------------------------------

pub struct ValidationContext {
    ctx: Option<VulkanContext>,
    original_validation: Option<String>,
}

impl ValidationContext {
    pub fn headless(info: &ContextInfo) -> Result<Self> {
        let original_validation = std::env::var("EGE_VALIDATION").ok();
        std::env::set_var("EGE_VALIDATION", "1");

        match VulkanContext::headless(info) {
            Ok(ctx) => Ok(Self {
                ctx: Some(ctx),
                original_validation,
            }),
            Err(err) => {
                restore_validation(&original_validation);
                Err(err)
            }
        }
    }
}

fn restore_validation(original: &Option<String>) {
    if let Some(value) = original {
        std::env::set_var("EGE_VALIDATION", value);
    } else {
        std::env::remove_var("EGE_VALIDATION");
    }
}

impl std::ops::Deref for ValidationContext {
    type Target = VulkanContext;

    fn deref(&self) -> &Self::Target {
        self.ctx.as_ref().expect("context should be present")
    }
}

impl std::ops::DerefMut for ValidationContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx.as_mut().expect("context should be present")
    }
}

impl Drop for ValidationContext {
    fn drop(&mut self) {
        drop(self.ctx.take());
        restore_validation(&self.original_validation);
    }
}

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Everything the engine asked the backend to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitIdle,
    MakeModel(usize),
    DropModel,
    MakeLayout,
    DropLayout,
    MakeSwapChain {
        id: usize,
        extent: Extent2D,
        previous: Option<usize>,
        image_count: usize,
    },
    DropSwapChain(usize),
    MakePipeline { chain: usize },
    DropPipeline { chain: usize },
    Allocate(usize),
    Free(usize),
    Acquire { chain: usize },
    Submit { chain: usize, cmd: u64, image: u32 },
    BeginRecording(u64),
    BeginRenderPass { cmd: u64, chain: usize, image: u32 },
    SetViewport(Extent2D),
    SetScissor(Extent2D),
    BindPipeline { chain: usize },
    BindModel,
    PushConstants(PushConstantBlock),
    Draw,
    EndRenderPass,
    EndRecording(u64),
}

/// Result the mock chain reports for the next acquire or present.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Status(SurfaceStatus),
    /// Ready, but with this image index regardless of the chain.
    Index(u32),
    Fail(vk::Result),
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<Call>,
    pub acquire_script: VecDeque<Scripted>,
    pub present_script: VecDeque<Scripted>,
    /// Image counts handed to successive chains; `default_image_count` once empty.
    pub image_counts: VecDeque<usize>,
    pub default_image_count: usize,
    pub fail_swap_chain: bool,
    pub fail_pipeline: bool,
    pub fail_recording: bool,
    pub live_chains: usize,
    pub live_pipelines: usize,
    pub live_models: usize,
    pub live_layouts: usize,
    pub live_command_buffers: usize,
    /// Images submitted on a chain and not yet handed out again by acquire.
    pub pending_images: HashSet<(usize, u32)>,
    /// Render passes begun for an image that was still pending.
    pub recorded_while_pending: usize,
    next_chain: usize,
    next_cmd: u64,
}

pub type Shared = Rc<RefCell<MockState>>;

impl MockState {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(|c| pred(c))
    }

    pub fn swap_chains_built(&self) -> usize {
        self.count(|c| matches!(c, Call::MakeSwapChain { .. }))
    }

    pub fn submits(&self) -> usize {
        self.count(|c| matches!(c, Call::Submit { .. }))
    }

    pub fn nothing_live(&self) -> bool {
        self.live_chains == 0
            && self.live_pipelines == 0
            && self.live_models == 0
            && self.live_layouts == 0
            && self.live_command_buffers == 0
    }
}

pub struct MockBackend {
    pub state: Shared,
}

impl MockBackend {
    pub fn new(image_count: usize) -> (Self, Shared) {
        let state = Rc::new(RefCell::new(MockState {
            default_image_count: image_count,
            ..Default::default()
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

pub struct MockChain {
    id: usize,
    image_count: usize,
    extent: Extent2D,
    next_image: u32,
    state: Shared,
}

impl MockChain {
    pub fn id(&self) -> usize {
        self.id
    }

    fn advance(&mut self) -> u32 {
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        index
    }
}

impl SurfaceChain for MockChain {
    type CommandBuffer = u64;

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn acquire_next_image(&mut self) -> Result<AcquiredImage> {
        let scripted = {
            let mut s = self.state.borrow_mut();
            s.calls.push(Call::Acquire { chain: self.id });
            s.acquire_script.pop_front()
        };
        let ready = |index| AcquiredImage {
            index,
            status: SurfaceStatus::Ready,
        };
        let acquired = match scripted {
            Some(Scripted::Fail(e)) => return Err(GPUError::AcquireError(e)),
            Some(Scripted::Index(i)) => ready(i),
            Some(Scripted::Status(SurfaceStatus::Stale)) => return Ok(AcquiredImage::stale()),
            Some(Scripted::Status(status)) => AcquiredImage {
                index: self.advance(),
                status,
            },
            None => ready(self.advance()),
        };
        // Handing out an image means its previous submission has completed.
        self.state
            .borrow_mut()
            .pending_images
            .remove(&(self.id, acquired.index));
        Ok(acquired)
    }

    fn submit_and_present(&mut self, cmd: u64, image_index: u32) -> Result<SurfaceStatus> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Submit {
            chain: self.id,
            cmd,
            image: image_index,
        });
        s.pending_images.insert((self.id, image_index));
        match s.present_script.pop_front() {
            Some(Scripted::Fail(e)) => Err(GPUError::SubmitError(e)),
            Some(Scripted::Status(status)) => Ok(status),
            Some(Scripted::Index(_)) | None => Ok(SurfaceStatus::Ready),
        }
    }
}

impl Drop for MockChain {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DropSwapChain(self.id));
        s.live_chains -= 1;
    }
}

pub struct MockPipeline {
    chain: usize,
    state: Shared,
}

impl Drop for MockPipeline {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DropPipeline { chain: self.chain });
        s.live_pipelines -= 1;
    }
}

pub struct MockModel {
    state: Shared,
}

impl Drop for MockModel {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DropModel);
        s.live_models -= 1;
    }
}

pub struct MockLayout {
    state: Shared,
}

impl Drop for MockLayout {
    fn drop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DropLayout);
        s.live_layouts -= 1;
    }
}

impl Backend for MockBackend {
    type CommandBuffer = u64;
    type SwapChain = MockChain;
    type PipelineLayout = MockLayout;
    type Pipeline = MockPipeline;
    type Model = MockModel;

    fn wait_idle(&mut self) -> Result<()> {
        self.log(Call::WaitIdle);
        Ok(())
    }

    fn make_model(&mut self, vertices: &[Vertex]) -> Result<MockModel> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::MakeModel(vertices.len()));
        s.live_models += 1;
        Ok(MockModel {
            state: Rc::clone(&self.state),
        })
    }

    fn make_pipeline_layout(&mut self) -> Result<MockLayout> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::MakeLayout);
        s.live_layouts += 1;
        Ok(MockLayout {
            state: Rc::clone(&self.state),
        })
    }

    fn make_swap_chain(
        &mut self,
        extent: Extent2D,
        previous: Option<MockChain>,
    ) -> Result<MockChain> {
        assert!(!extent.is_degenerate(), "swap chain requested for {:?}", extent);
        let chain = {
            let mut s = self.state.borrow_mut();
            if s.fail_swap_chain {
                None
            } else {
                s.next_chain += 1;
                let id = s.next_chain;
                let image_count = s.image_counts.pop_front().unwrap_or(s.default_image_count);
                s.calls.push(Call::MakeSwapChain {
                    id,
                    extent,
                    previous: previous.as_ref().map(|p| p.id),
                    image_count,
                });
                s.live_chains += 1;
                Some(MockChain {
                    id,
                    image_count,
                    extent,
                    next_image: 0,
                    state: Rc::clone(&self.state),
                })
            }
        };
        // The retiring chain goes away only after its successor exists.
        drop(previous);
        chain.ok_or_else(|| GPUError::SurfaceCreationError("scripted failure".into()))
    }

    fn make_pipeline(
        &mut self,
        _layout: &MockLayout,
        chain: &MockChain,
        _shaders: &ShaderPaths,
    ) -> Result<MockPipeline> {
        let mut s = self.state.borrow_mut();
        if s.fail_pipeline {
            return Err(GPUError::PipelineBuildError("scripted failure".into()));
        }
        s.calls.push(Call::MakePipeline { chain: chain.id });
        s.live_pipelines += 1;
        Ok(MockPipeline {
            chain: chain.id,
            state: Rc::clone(&self.state),
        })
    }

    fn allocate_command_buffers(&mut self, count: usize) -> Result<Vec<u64>> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Allocate(count));
        s.live_command_buffers += count;
        let first = s.next_cmd;
        s.next_cmd += count as u64;
        Ok((first..first + count as u64).collect())
    }

    fn free_command_buffers(&mut self, buffers: Vec<u64>) {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::Free(buffers.len()));
        s.live_command_buffers -= buffers.len();
    }

    fn begin_recording(&mut self, cmd: u64) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::BeginRecording(cmd));
        if s.fail_recording {
            return Err(GPUError::RecordingError(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        }
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        cmd: u64,
        chain: &MockChain,
        image_index: u32,
        _clear: &ClearValues,
    ) {
        let mut s = self.state.borrow_mut();
        if s.pending_images.contains(&(chain.id, image_index)) {
            s.recorded_while_pending += 1;
        }
        s.calls.push(Call::BeginRenderPass {
            cmd,
            chain: chain.id,
            image: image_index,
        });
    }

    fn set_viewport(&mut self, _cmd: u64, extent: Extent2D) {
        self.log(Call::SetViewport(extent));
    }

    fn set_scissor(&mut self, _cmd: u64, extent: Extent2D) {
        self.log(Call::SetScissor(extent));
    }

    fn bind_pipeline(&mut self, _cmd: u64, pipeline: &MockPipeline) {
        self.log(Call::BindPipeline {
            chain: pipeline.chain,
        });
    }

    fn bind_model(&mut self, _cmd: u64, _model: &MockModel) {
        self.log(Call::BindModel);
    }

    fn push_constants(&mut self, _cmd: u64, _layout: &MockLayout, block: &PushConstantBlock) {
        self.log(Call::PushConstants(*block));
    }

    fn draw_model(&mut self, _cmd: u64, _model: &MockModel) {
        self.log(Call::Draw);
    }

    fn end_render_pass(&mut self, _cmd: u64) {
        self.log(Call::EndRenderPass);
    }

    fn end_recording(&mut self, cmd: u64) -> Result<()> {
        self.log(Call::EndRecording(cmd));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted window
// ---------------------------------------------------------------------------

pub struct MockWindow {
    current: Extent2D,
    /// Extents observed after each successive `wait_events`.
    pub pending: VecDeque<Extent2D>,
    pub resized: bool,
    pub close_after_polls: Option<usize>,
    pub close_after_waits: Option<usize>,
    pub polls: usize,
    pub waits: usize,
    closed: bool,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            current: Extent2D::new(width, height),
            pending: VecDeque::new(),
            resized: false,
            close_after_polls: None,
            close_after_waits: None,
            polls: 0,
            waits: 0,
            closed: false,
        }
    }

    /// Simulates the user resizing the window.
    pub fn resize_to(&mut self, width: u32, height: u32) {
        self.current = Extent2D::new(width, height);
        self.resized = true;
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Window for MockWindow {
    fn should_close(&self) -> bool {
        self.closed
    }

    fn extent(&self) -> Extent2D {
        self.current
    }

    fn was_resized(&self) -> bool {
        self.resized
    }

    fn reset_resized_flag(&mut self) {
        self.resized = false;
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if self.close_after_polls.map_or(false, |n| self.polls >= n) {
            self.closed = true;
        }
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if let Some(next) = self.pending.pop_front() {
            self.current = next;
            self.resized = true;
        }
        if self.close_after_waits.map_or(false, |n| self.waits >= n) {
            self.closed = true;
        }
    }
}

pub fn triangle() -> Vec<Vertex> {
    ege::geometry::triangle()
}
