use crate::{Backend, SurfaceChain};

/// Everything that depends on the current swap chain, rebuilt as one unit.
///
/// Fields drop in declaration order: pipeline, then slots, then the chain.
/// Command buffers are plain handles and must be returned to the backend
/// with [`FrameResources::release`] to be freed before the pool goes away.
pub struct FrameResources<B: Backend> {
    pub(crate) pipeline: B::Pipeline,
    pub(crate) command_buffers: Vec<B::CommandBuffer>,
    pub(crate) chain: B::SwapChain,
}

impl<B: Backend> FrameResources<B> {
    pub fn image_count(&self) -> usize {
        self.chain.image_count()
    }

    pub fn slot_count(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn chain(&self) -> &B::SwapChain {
        &self.chain
    }

    /// Splits the group for recreation. The pipeline is released here; the
    /// slots and the retiring chain are handed back to the caller.
    pub(crate) fn retire(self) -> (Vec<B::CommandBuffer>, B::SwapChain) {
        let FrameResources {
            pipeline,
            command_buffers,
            chain,
        } = self;
        drop(pipeline);
        (command_buffers, chain)
    }

    /// Releases the group in order: pipeline, command slots, chain.
    pub(crate) fn release(self, backend: &mut B) {
        let (command_buffers, chain) = self.retire();
        backend.free_command_buffers(command_buffers);
        drop(chain);
    }
}
