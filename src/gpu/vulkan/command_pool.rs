use ash::{vk, Device};
use std::{cell::UnsafeCell, marker::PhantomData, thread::ThreadId};

use crate::Result;

/// Thin wrapper around a Vulkan command pool.
///
/// Hands out primary command buffers, one per presentable image, and frees
/// them again when the chain is rebuilt with a different image count.
/// Enforces single-threaded ownership: the pool may be moved to another thread
/// after creation but must not be shared across threads.
pub struct CommandPool {
    device: Device,
    raw: vk::CommandPool,
    allocated: usize,
    owner: ThreadId,
    // make !Sync
    _not_sync: PhantomData<UnsafeCell<()>>,
}

unsafe impl Send for CommandPool {}

impl CommandPool {
    /// Create a new command pool for the given queue family.
    pub(super) fn new(device: &Device, family: u32) -> Result<Self> {
        let ci = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .build();
        let raw = unsafe { device.create_command_pool(&ci, None)? };
        Ok(Self {
            device: device.clone(),
            raw,
            allocated: 0,
            owner: std::thread::current().id(),
            _not_sync: PhantomData,
        })
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            self.owner,
            std::thread::current().id(),
            "CommandPool used from wrong thread"
        );
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate(&mut self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        self.assert_owner();
        if count == 0 {
            return Ok(Vec::new());
        }

        let buffers = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.raw)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count as u32)
                    .build(),
            )?
        };
        self.allocated += buffers.len();
        log::debug!("allocated {} command buffers ({} live)", buffers.len(), self.allocated);
        Ok(buffers)
    }

    /// Return command buffers to the pool.
    ///
    /// # Prerequisites
    /// - None of the buffers may still be pending execution on the GPU.
    pub fn free(&mut self, buffers: Vec<vk::CommandBuffer>) {
        self.assert_owner();
        if buffers.is_empty() {
            return;
        }

        unsafe { self.device.free_command_buffers(self.raw, &buffers) };
        self.allocated = self.allocated.saturating_sub(buffers.len());
        log::debug!("freed {} command buffers ({} live)", buffers.len(), self.allocated);
    }

    /// Number of command buffers handed out and not yet freed.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Destroy the underlying Vulkan command pool. Command buffers allocated
    /// from this pool become invalid after this call.
    pub fn destroy(&mut self) {
        self.assert_owner();
        if self.raw == vk::CommandPool::null() {
            return;
        }
        unsafe {
            self.device.destroy_command_pool(self.raw, None);
        }
        self.raw = vk::CommandPool::null();
        self.allocated = 0;
    }

    /// Raw Vulkan command pool handle.
    pub fn raw(&self) -> vk::CommandPool {
        self.raw
    }
}
