use super::frame::FrameResources;
use crate::{Backend, ClearValues, PushConstantBlock, Result, SurfaceChain};
use glam::{Vec2, Vec3};

/// Draw calls issued per frame, one per instance of the model.
pub const DRAW_INSTANCES: u32 = 4;

/// The frame counter wraps back to zero at this value.
pub const FRAME_PERIOD: u32 = 10_000;

/// Animation clock advanced once per recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter(u32);

impl FrameCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Steps the counter and returns the new value.
    pub fn advance(&mut self) -> u32 {
        self.0 = (self.0 + 1) % FRAME_PERIOD;
        self.0
    }
}

/// Push constants for draw `instance` of frame `frame`: the offset drifts
/// right with the frame count and each instance sits a quarter unit lower
/// and a little bluer than the previous one.
pub fn push_constant_for(frame: u32, instance: u32) -> PushConstantBlock {
    let frame = (frame % FRAME_PERIOD) as f32;
    let i = instance as f32;
    PushConstantBlock::new(
        Vec2::new(-0.5 + frame * 0.0002, -0.4 + i * 0.25),
        Vec3::new(0.0, 0.0, 0.2 + 0.2 * i),
    )
}

/// What every frame draws, independent of the swap chain.
pub struct Scene<'a, B: Backend> {
    pub layout: &'a B::PipelineLayout,
    pub model: &'a B::Model,
    pub clear: &'a ClearValues,
}

/// Records the commands for `image_index` into its slot.
///
/// # Prerequisites
/// - `image_index` is below both the chain's image count and the slot count.
/// - The slot is not pending on the GPU.
pub fn record_frame<B: Backend>(
    backend: &mut B,
    frame: &FrameResources<B>,
    image_index: u32,
    scene: &Scene<'_, B>,
    frame_value: u32,
) -> Result<B::CommandBuffer> {
    let cmd = frame.command_buffers[image_index as usize];
    let extent = frame.chain.extent();

    backend.begin_recording(cmd)?;
    backend.begin_render_pass(cmd, &frame.chain, image_index, scene.clear);

    backend.set_viewport(cmd, extent);
    backend.set_scissor(cmd, extent);

    backend.bind_pipeline(cmd, &frame.pipeline);
    backend.bind_model(cmd, scene.model);

    for instance in 0..DRAW_INSTANCES {
        let push = push_constant_for(frame_value, instance);
        backend.push_constants(cmd, scene.layout, &push);
        backend.draw_model(cmd, scene.model);
    }

    backend.end_render_pass(cmd);
    backend.end_recording(cmd)?;
    log::trace!("recorded frame {} into image {}", frame_value, image_index);
    Ok(cmd)
}
