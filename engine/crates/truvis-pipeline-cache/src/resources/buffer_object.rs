use ash::vk;

use crate::resources::resource_arena::{GfxResourceHandle, GfxResourceKind, SharedResourceArena};

/// 外部创建的 uniform buffer 在缓存层中的视图
///
/// 只记录句柄与大小；内存由调用者分配和释放。
pub struct GfxBufferObject {
    resource: GfxResourceHandle,
    vk_buffer: vk::Buffer,
    byte_count: u32,
}
// new & init
impl GfxBufferObject {
    pub fn new(arena: &SharedResourceArena, vk_buffer: vk::Buffer, byte_count: u32, debug_name: &str) -> Self {
        let resource = arena.borrow_mut().register(GfxResourceKind::Buffer, debug_name);
        Self {
            resource,
            vk_buffer,
            byte_count,
        }
    }
}
// getters
impl GfxBufferObject {
    #[inline]
    pub fn resource(&self) -> GfxResourceHandle {
        self.resource
    }

    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.vk_buffer
    }

    #[inline]
    pub fn byte_count(&self) -> u32 {
        self.byte_count
    }
}
