use super::{GPUError, Result, VulkanContext};
use crate::Vertex;
use ash::{vk, Device};
use std::rc::Rc;
use vk_mem::Alloc;

/// Smallest vertex count that still forms a triangle.
pub const MIN_VERTICES: usize = 3;

/// Draw count for `len` vertices: at least [`MIN_VERTICES`] and within `u32`.
fn checked_vertex_count(len: usize) -> Result<u32> {
    if len < MIN_VERTICES {
        return Err(GPUError::BufferCreationError(format!(
            "a model needs at least {} vertices, got {}",
            MIN_VERTICES, len
        )));
    }
    u32::try_from(len).map_err(|_| {
        GPUError::BufferCreationError(format!("{} vertices exceed a single draw", len))
    })
}

/// Vertex data uploaded once into a host-visible buffer and drawn as a
/// single instance.
pub struct Model {
    device: Device,
    allocator: Rc<vk_mem::Allocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    vertex_count: u32,
}

impl Model {
    pub(super) fn new(ctx: &VulkanContext, vertices: &[Vertex]) -> Result<Self> {
        let vertex_count = checked_vertex_count(vertices.len())?;

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let create_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferHost,
            flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            ..Default::default()
        };

        let allocator = Rc::clone(&ctx.allocator);
        let (buffer, mut allocation) = unsafe {
            allocator.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(bytes.len() as u64)
                    .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .build(),
                &create_info,
            )
        }
        .map_err(|e| GPUError::BufferCreationError(format!("vertex buffer: {}", e)))?;

        let mapped = match unsafe { allocator.map_memory(&mut allocation) } {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                return Err(GPUError::BufferCreationError(format!("map vertex buffer: {}", e)));
            }
        };
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped, bytes.len());
            allocator.unmap_memory(&mut allocation);
        }
        if let Err(e) = allocator.flush_allocation(&allocation, 0, bytes.len()) {
            log::warn!("failed to flush vertex buffer: {}", e);
        }

        ctx.set_name(buffer, "ege.model.vertices", vk::ObjectType::BUFFER);
        log::debug!("uploaded model with {} vertices", vertices.len());

        Ok(Self {
            device: ctx.device.clone(),
            allocator,
            buffer,
            allocation,
            vertex_count,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(cmd, 0, &[self.buffer], &[0])
        };
    }

    pub fn draw(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_draw(cmd, self.vertex_count, 1, 0, 0) };
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        unsafe {
            self.allocator
                .destroy_buffer(self.buffer, &mut self.allocation)
        };
    }
}
