use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use ash::vk;
use parking_lot::Mutex;

/// command buffer 的执行状态，由完成回调所在的线程写入
pub struct GfxCmdFence {
    status: AtomicI32,
}
impl Default for GfxCmdFence {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl GfxCmdFence {
    /// 刚提交的 command buffer 处于 `NOT_READY`
    pub fn new() -> Self {
        Self {
            status: AtomicI32::new(vk::Result::NOT_READY.as_raw()),
        }
    }
}
// status
impl GfxCmdFence {
    #[inline]
    pub fn set_status(&self, status: vk::Result) {
        self.status.store(status.as_raw(), Ordering::Release);
    }

    #[inline]
    pub fn status(&self) -> vk::Result {
        vk::Result::from_raw(self.status.load(Ordering::Acquire))
    }
}

/// 一对 timestamp query，用来测量一段 GPU 工作的耗时
///
/// fence 在录制线程上挂载，可能在另一个线程上被读取，因此放在锁后面。
pub struct GfxTimerQuery {
    starting_query_index: u32,
    stopping_query_index: u32,
    fence: Mutex<Option<Arc<GfxCmdFence>>>,
}
// new & init
impl GfxTimerQuery {
    /// 占用 query pool 中 `starting_query_index` 与其后的一个槽位
    pub fn new(starting_query_index: u32) -> Self {
        Self {
            starting_query_index,
            stopping_query_index: starting_query_index + 1,
            fence: Mutex::new(None),
        }
    }
}
// fence
impl GfxTimerQuery {
    /// 写入 stop timestamp 的 command buffer 提交之后挂载它的 fence
    pub fn set_fence(&self, fence: Arc<GfxCmdFence>) {
        *self.fence.lock() = Some(fence);
    }

    /// query 被重新录制时清除旧的 fence
    pub fn reset_fence(&self) {
        *self.fence.lock() = None;
    }

    /// 只有挂载了 fence 并且 fence 已经 `SUCCESS` 时，query 的结果才可以读取
    pub fn is_completed(&self) -> bool {
        self.fence
            .lock()
            .as_ref()
            .is_some_and(|fence| fence.status() == vk::Result::SUCCESS)
    }
}
// getters
impl GfxTimerQuery {
    #[inline]
    pub fn starting_query_index(&self) -> u32 {
        self.starting_query_index
    }

    #[inline]
    pub fn stopping_query_index(&self) -> u32 {
        self.stopping_query_index
    }
}
