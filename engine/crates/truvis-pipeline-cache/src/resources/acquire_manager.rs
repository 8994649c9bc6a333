use ahash::AHashSet;

use crate::resources::resource_arena::{GfxResourceHandle, SharedResourceArena};

/// 只增不减的资源引用集合
///
/// 同一个资源在一个 manager 中只持有一次引用；[`Self::clear`] 或 drop 时统一释放。
/// 缓存条目、command buffer 各自持有一个，用来把资源的生命周期延长到它们不再被使用为止。
pub struct AcquireOnlyManager {
    arena: SharedResourceArena,
    resources: AHashSet<GfxResourceHandle>,
}
// new & init
impl AcquireOnlyManager {
    pub fn new(arena: SharedResourceArena) -> Self {
        Self {
            arena,
            resources: AHashSet::new(),
        }
    }
}
// acquire
impl AcquireOnlyManager {
    pub fn acquire(&mut self, handle: GfxResourceHandle) {
        if self.resources.contains(&handle) {
            return;
        }
        if self.arena.borrow_mut().acquire(handle) {
            self.resources.insert(handle);
        }
    }

    /// 持有 `src` 中的所有资源，`src` 本身不变
    pub fn acquire_all(&mut self, src: &AcquireOnlyManager) {
        debug_assert!(std::rc::Rc::ptr_eq(&self.arena, &src.arena), "managers must share one arena");
        let mut arena = self.arena.borrow_mut();
        for &handle in &src.resources {
            if !self.resources.contains(&handle) && arena.acquire(handle) {
                self.resources.insert(handle);
            }
        }
    }

    /// 释放所有引用
    pub fn clear(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        let mut arena = self.arena.borrow_mut();
        for handle in self.resources.drain() {
            arena.release(handle);
        }
    }
}
// getters
impl AcquireOnlyManager {
    #[inline]
    pub fn contains(&self, handle: GfxResourceHandle) -> bool {
        self.resources.contains(&handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn arena(&self) -> &SharedResourceArena {
        &self.arena
    }
}
impl Drop for AcquireOnlyManager {
    fn drop(&mut self) {
        self.clear();
    }
}
