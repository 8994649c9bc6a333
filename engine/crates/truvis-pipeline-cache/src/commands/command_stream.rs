use ash::vk;

use crate::resources::acquire_manager::AcquireOnlyManager;
use crate::resources::resource_arena::SharedResourceArena;

/// 正在录制的 command buffer
///
/// command buffer 的分配、录制开始 / 结束、提交都由外部负责；这里只额外记录它引用了哪些资源。
/// 外部在确认 GPU 执行完毕（fence signaled）之后调用 [`Self::release_resources`]。
pub struct GfxCommandStream {
    vk_handle: vk::CommandBuffer,
    resources: AcquireOnlyManager,

    #[cfg(debug_assertions)]
    name: String,
}
// new & init
impl GfxCommandStream {
    pub fn new(vk_handle: vk::CommandBuffer, arena: SharedResourceArena, debug_name: &str) -> Self {
        #[cfg(not(debug_assertions))]
        let _ = debug_name;
        Self {
            vk_handle,
            resources: AcquireOnlyManager::new(arena),
            #[cfg(debug_assertions)]
            name: debug_name.to_string(),
        }
    }
}
// getters
impl GfxCommandStream {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn resources(&self) -> &AcquireOnlyManager {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut AcquireOnlyManager {
        &mut self.resources
    }
}
// tools
impl GfxCommandStream {
    /// GPU 执行完毕后释放该 command buffer 持有的所有资源引用
    pub fn release_resources(&mut self) {
        #[cfg(debug_assertions)]
        log::debug!("{}: release {} resources", self.name, self.resources.len());
        self.resources.clear();
    }
}
