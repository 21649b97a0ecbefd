//! Frame orchestration: acquire, record, submit and present, plus the swap
//! chain recreation protocol.

mod frame;
mod info;
mod record;

pub use frame::FrameResources;
pub use info::{EngineInfo, ModelSource};
pub use record::{
    push_constant_for, record_frame, FrameCounter, Scene, DRAW_INSTANCES, FRAME_PERIOD,
};

use crate::{
    window::Window, Backend, ClearValues, Extent2D, GPUError, Result, ShaderPaths, SurfaceChain,
    SurfaceStatus, Vertex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Recreating,
    Stopped,
}

/// Drives a [`Backend`] against a [`Window`].
///
/// Owns the model, the pipeline layout and the group of swap chain dependent
/// resources. Everything is released, pipeline first, before the backend and
/// the window are dropped.
pub struct Engine<B: Backend, W: Window> {
    // Field order is drop order.
    frame: Option<FrameResources<B>>,
    model: Option<B::Model>,
    layout: Option<B::PipelineLayout>,
    shaders: ShaderPaths,
    clear: ClearValues,
    state: EngineState,
    frame_counter: FrameCounter,
    backend: B,
    window: W,
}

impl<B: Backend, W: Window> Engine<B, W> {
    /// Uploads `vertices`, builds the pipeline layout and the first swap
    /// chain with its command slots and pipeline.
    pub fn new(mut backend: B, window: W, vertices: &[Vertex], info: &EngineInfo) -> Result<Self> {
        let model = backend.make_model(vertices)?;
        let layout = backend.make_pipeline_layout()?;

        let mut engine = Self {
            frame: None,
            model: Some(model),
            layout: Some(layout),
            shaders: info.shaders.clone(),
            clear: info.clear,
            state: EngineState::Recreating,
            frame_counter: FrameCounter::new(),
            backend,
            window,
        };
        engine.recreate_swap_chain()?;
        log::info!(
            "engine ready: {} images at {}x{}",
            engine.image_count(),
            engine.extent().map_or(0, |e| e.width),
            engine.extent().map_or(0, |e| e.height)
        );
        Ok(engine)
    }

    /// Runs until the window asks to close, then waits for the GPU and
    /// releases every resource. The first fatal error ends the loop.
    pub fn run(&mut self) -> Result<()> {
        log::info!("engine running");
        let mut result = Ok(());
        while !self.window.should_close() {
            self.window.poll_events();
            if let Err(err) = self.draw_frame() {
                log::error!("frame failed: {}", err);
                result = Err(err);
                break;
            }
        }
        let stopped = self.stop();
        result.and(stopped)
    }

    /// Renders one frame. Stale or resized surfaces are rebuilt here and
    /// never reported as errors.
    pub fn draw_frame(&mut self) -> Result<()> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }

        let Some(frame) = self.frame.as_mut() else {
            return self.recreate_swap_chain();
        };
        let (Some(layout), Some(model)) = (self.layout.as_ref(), self.model.as_ref()) else {
            return Err(GPUError::PipelineBuildError(
                "model or pipeline layout already released".into(),
            ));
        };

        let acquired = frame.chain.acquire_next_image()?;
        match acquired.status {
            SurfaceStatus::Stale => {
                log::debug!("swap chain out of date on acquire, skipping frame");
                return self.recreate_swap_chain();
            }
            SurfaceStatus::Suboptimal => log::warn!("swap chain suboptimal on acquire"),
            SurfaceStatus::Ready => {}
        }

        let index = acquired.index;
        let slots = frame.command_buffers.len();
        if index as usize >= slots.min(frame.chain.image_count()) {
            return Err(GPUError::ImageIndexOutOfRange {
                index,
                count: slots,
            });
        }

        let scene = Scene::<B> {
            layout,
            model,
            clear: &self.clear,
        };
        let frame_value = self.frame_counter.advance();
        let cmd = record_frame(&mut self.backend, frame, index, &scene, frame_value)?;

        let status = frame.chain.submit_and_present(cmd, index)?;

        let resized = self.window.was_resized();
        if status != SurfaceStatus::Ready || resized {
            log::debug!("rebuilding swap chain (present: {:?}, resized: {})", status, resized);
            self.window.reset_resized_flag();
            self.recreate_swap_chain()?;
        }
        Ok(())
    }

    /// Rebuilds the swap chain, its command slots and the pipeline.
    ///
    /// Blocks while the window has zero area. Returns early without touching
    /// any resource if the window is closed during that wait.
    pub fn recreate_swap_chain(&mut self) -> Result<()> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }
        self.state = EngineState::Recreating;

        let mut extent = self.window.extent();
        if extent.is_degenerate() {
            log::debug!("surface is {}x{}, waiting", extent.width, extent.height);
        }
        while extent.is_degenerate() {
            if self.window.should_close() {
                return Ok(());
            }
            self.window.wait_events();
            extent = self.window.extent();
        }

        self.backend.wait_idle()?;

        let (slots, previous) = match self.frame.take() {
            Some(frame) => {
                let (slots, chain) = frame.retire();
                (slots, Some(chain))
            }
            None => (Vec::new(), None),
        };

        let chain = match self.backend.make_swap_chain(extent, previous) {
            Ok(chain) => chain,
            Err(err) => {
                self.release_slots(slots);
                return Err(err);
            }
        };

        let slots = if slots.len() != chain.image_count() {
            log::debug!(
                "image count {} -> {}, reallocating command buffers",
                slots.len(),
                chain.image_count()
            );
            self.release_slots(slots);
            self.backend.allocate_command_buffers(chain.image_count())?
        } else {
            slots
        };

        let layout = match self.layout.as_ref() {
            Some(layout) => layout,
            None => {
                self.release_slots(slots);
                return Err(GPUError::PipelineBuildError(
                    "pipeline layout already released".into(),
                ));
            }
        };
        let pipeline = match self.backend.make_pipeline(layout, &chain, &self.shaders) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.release_slots(slots);
                return Err(err);
            }
        };

        self.frame = Some(FrameResources {
            pipeline,
            command_buffers: slots,
            chain,
        });
        self.state = EngineState::Running;
        log::debug!("swap chain rebuilt at {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn release_slots(&mut self, slots: Vec<B::CommandBuffer>) {
        if !slots.is_empty() {
            self.backend.free_command_buffers(slots);
        }
    }

    /// Waits for the GPU, then releases the pipeline, the command slots, the
    /// swap chain, the model and the layout, in that order. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }
        let waited = self.backend.wait_idle();

        if let Some(frame) = self.frame.take() {
            frame.release(&mut self.backend);
        }
        self.model = None;
        self.layout = None;

        self.state = EngineState::Stopped;
        log::info!("engine stopped");
        waited
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Image count of the current swap chain, zero when there is none.
    pub fn image_count(&self) -> usize {
        self.frame.as_ref().map_or(0, |f| f.image_count())
    }

    pub fn command_buffer_count(&self) -> usize {
        self.frame.as_ref().map_or(0, |f| f.slot_count())
    }

    pub fn extent(&self) -> Option<Extent2D> {
        self.frame.as_ref().map(|f| f.chain.extent())
    }

    pub fn frame_counter(&self) -> u32 {
        self.frame_counter.value()
    }

    pub fn frame_resources(&self) -> Option<&FrameResources<B>> {
        self.frame.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }
}

impl<B: Backend, W: Window> Drop for Engine<B, W> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("engine shutdown failed: {}", err);
        }
    }
}
