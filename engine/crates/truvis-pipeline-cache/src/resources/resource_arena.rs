use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// 外部资源（buffer / texture / sampler）在 arena 中的句柄
    pub struct GfxResourceHandle;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxResourceKind {
    Buffer,
    Texture,
    Sampler,
}

struct ResourceSlot {
    kind: GfxResourceKind,
    ref_count: u32,
    /// 所有者已经请求销毁，等待引用计数归零
    destroy_requested: bool,
    #[cfg(debug_assertions)]
    name: String,
}

/// 外部资源的共享引用计数
///
/// arena 不创建也不释放真正的资源：所有者调用 [`Self::request_destroy`] 之后，
/// 只有当引用计数归零时，资源才会出现在 [`Self::collect_destroyable`] 的结果中，由所有者真正释放。
pub struct ResourceArena {
    slots: SlotMap<GfxResourceHandle, ResourceSlot>,
    /// 可以被所有者释放的资源
    destroyable: Vec<(GfxResourceHandle, GfxResourceKind)>,
}

pub type SharedResourceArena = Rc<RefCell<ResourceArena>>;

impl Default for ResourceArena {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl ResourceArena {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            destroyable: Vec::new(),
        }
    }

    pub fn new_shared() -> SharedResourceArena {
        Rc::new(RefCell::new(Self::new()))
    }
}
// register & destroy
impl ResourceArena {
    pub fn register(&mut self, kind: GfxResourceKind, name: impl AsRef<str>) -> GfxResourceHandle {
        #[cfg(not(debug_assertions))]
        let _ = name;
        self.slots.insert(ResourceSlot {
            kind,
            ref_count: 0,
            destroy_requested: false,
            #[cfg(debug_assertions)]
            name: name.as_ref().to_string(),
        })
    }

    /// 所有者不再需要该资源；若仍有引用，则推迟到最后一个引用释放时
    pub fn request_destroy(&mut self, handle: GfxResourceHandle) {
        let Some(slot) = self.slots.get_mut(handle) else {
            log::warn!("request_destroy on unknown resource {handle:?}");
            return;
        };
        slot.destroy_requested = true;
        if slot.ref_count == 0 {
            self.retire(handle);
        }
    }

    /// 取出所有可以真正释放的资源
    pub fn collect_destroyable(&mut self) -> Vec<(GfxResourceHandle, GfxResourceKind)> {
        std::mem::take(&mut self.destroyable)
    }

    fn retire(&mut self, handle: GfxResourceHandle) {
        if let Some(slot) = self.slots.remove(handle) {
            #[cfg(debug_assertions)]
            log::debug!("resource {} ({:?}) can be destroyed", slot.name, slot.kind);
            self.destroyable.push((handle, slot.kind));
        }
    }
}
// ref count
impl ResourceArena {
    /// 返回 false 表示句柄已经失效
    pub fn acquire(&mut self, handle: GfxResourceHandle) -> bool {
        match self.slots.get_mut(handle) {
            Some(slot) => {
                slot.ref_count += 1;
                true
            }
            None => {
                log::error!("acquire on unknown resource {handle:?}");
                false
            }
        }
    }

    pub fn release(&mut self, handle: GfxResourceHandle) {
        let Some(slot) = self.slots.get_mut(handle) else {
            log::error!("release on unknown resource {handle:?}");
            return;
        };
        debug_assert!(slot.ref_count > 0, "resource released more times than acquired");
        slot.ref_count = slot.ref_count.saturating_sub(1);
        if slot.ref_count == 0 && slot.destroy_requested {
            self.retire(handle);
        }
    }
}
// getters
impl ResourceArena {
    #[inline]
    pub fn contains(&self, handle: GfxResourceHandle) -> bool {
        self.slots.contains_key(handle)
    }

    #[inline]
    pub fn ref_count(&self, handle: GfxResourceHandle) -> Option<u32> {
        self.slots.get(handle).map(|slot| slot.ref_count)
    }

    #[inline]
    pub fn kind(&self, handle: GfxResourceHandle) -> Option<GfxResourceKind> {
        self.slots.get(handle).map(|slot| slot.kind)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroy_waits_for_last_reference() {
        let mut arena = ResourceArena::new();
        let buffer = arena.register(GfxResourceKind::Buffer, "ubo");

        assert!(arena.acquire(buffer));
        assert!(arena.acquire(buffer));
        arena.request_destroy(buffer);
        assert!(arena.collect_destroyable().is_empty());

        arena.release(buffer);
        assert!(arena.collect_destroyable().is_empty());
        assert_eq!(arena.ref_count(buffer), Some(1));

        arena.release(buffer);
        assert_eq!(arena.collect_destroyable(), vec![(buffer, GfxResourceKind::Buffer)]);
        assert!(!arena.contains(buffer));
        assert!(!arena.acquire(buffer));
    }

    #[test]
    fn test_unreferenced_destroy_is_immediate() {
        let mut arena = ResourceArena::new();
        let texture = arena.register(GfxResourceKind::Texture, "albedo");
        arena.request_destroy(texture);
        assert_eq!(arena.collect_destroyable(), vec![(texture, GfxResourceKind::Texture)]);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_release_without_destroy_keeps_slot() {
        let mut arena = ResourceArena::new();
        let sampler = arena.register(GfxResourceKind::Sampler, "linear");
        arena.acquire(sampler);
        arena.release(sampler);
        assert_eq!(arena.ref_count(sampler), Some(0));
        assert_eq!(arena.kind(sampler), Some(GfxResourceKind::Sampler));
        assert!(arena.collect_destroyable().is_empty());
    }
}
