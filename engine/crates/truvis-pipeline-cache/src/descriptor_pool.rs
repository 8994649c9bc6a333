use std::rc::Rc;

use ash::vk;

use crate::constants::{DESCRIPTOR_TYPE_COUNT, INPUT_ATTACHMENT_COUNT, SAMPLER_BINDING_COUNT, UBUFFER_BINDING_COUNT};
use crate::error::{PipelineCacheError, PipelineCacheResult};
use crate::foundation::device::{DeviceFunctions, set_debug_name};
use crate::pipeline_layout_cache::DescriptorSetBundle;
use crate::timeline::{Timestamp, TimelineTracker};

/// 扩容后被替换下来的 pool
struct ExtinctPool {
    handle: vk::DescriptorPool,
    retired_at: Timestamp,
}

/// 可扩容的 descriptor pool
///
/// 容量以 bundle 计（一个 bundle 是 [`DESCRIPTOR_TYPE_COUNT`] 个 set），每种 descriptor 的数量按
/// 每个 set 的最大绑定数预留。容量不足时整体替换为一个更大的 pool；旧的 pool 只有在时间线证明
/// GPU 不再引用时才会销毁。
pub struct DescriptorPool {
    device: Rc<dyn DeviceFunctions>,
    handle: vk::DescriptorPool,
    /// 当前 pool 可以容纳的 bundle 数量
    capacity: u32,
    growth_factor: u32,
    extinct_pools: Vec<ExtinctPool>,
    growth_count: u32,
}
// new & init
impl DescriptorPool {
    pub fn new(device: Rc<dyn DeviceFunctions>, capacity: u32, growth_factor: u32) -> PipelineCacheResult<Self> {
        debug_assert!(capacity > 0 && growth_factor >= 2);
        let handle = Self::create_vk_pool(device.as_ref(), capacity)?;
        Ok(Self {
            device,
            handle,
            capacity,
            growth_factor,
            extinct_pools: Vec::new(),
            growth_count: 0,
        })
    }

    fn create_vk_pool(device: &dyn DeviceFunctions, capacity: u32) -> PipelineCacheResult<vk::DescriptorPool> {
        let max_sets = capacity.saturating_mul(DESCRIPTOR_TYPE_COUNT as u32);
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: max_sets.saturating_mul(UBUFFER_BINDING_COUNT as u32),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: max_sets.saturating_mul(SAMPLER_BINDING_COUNT as u32),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::INPUT_ATTACHMENT,
                descriptor_count: max_sets.saturating_mul(INPUT_ATTACHMENT_COUNT as u32),
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let handle = device.create_descriptor_pool(&create_info).map_err(|e| {
            log::error!("failed to create descriptor pool with {capacity} bundles: {e}");
            PipelineCacheError::DescriptorPoolCreation(e)
        })?;
        set_debug_name(device, handle, format!("PipelineCacheDescriptorPool-{capacity}"));
        Ok(handle)
    }
}
// allocate
impl DescriptorPool {
    /// 再分配一个 bundle 是否会超出容量
    ///
    /// `bundles_in_use` 包括正在使用的、等待回收的以及 arena 中的 bundle
    #[inline]
    pub fn needs_growth(&self, bundles_in_use: usize) -> bool {
        bundles_in_use + 1 > self.capacity as usize
    }

    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout; DESCRIPTOR_TYPE_COUNT],
    ) -> PipelineCacheResult<DescriptorSetBundle> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.handle)
            .set_layouts(layouts);
        let sets = self.device.allocate_descriptor_sets(&allocate_info).map_err(|e| {
            log::error!("failed to allocate descriptor sets: {e}");
            PipelineCacheError::DescriptorSetAllocation(e)
        })?;
        match sets.as_slice() {
            &[ubo, sampler, input] => Ok([ubo, sampler, input]),
            _ => Err(PipelineCacheError::DescriptorSetAllocation(vk::Result::ERROR_UNKNOWN)),
        }
    }

    /// 把 set 还给当前的 pool
    pub fn free(&self, sets: &[vk::DescriptorSet]) {
        if sets.is_empty() {
            return;
        }
        if let Err(e) = self.device.free_descriptor_sets(self.handle, sets) {
            log::error!("failed to free {} descriptor sets: {e}", sets.len());
        }
    }
}
// grow & reclaim
impl DescriptorPool {
    /// 替换为一个 `growth_factor` 倍大的 pool
    ///
    /// 新 pool 创建失败时保持原状。成功后旧 pool 分配出的所有 set 都不能再放回 arena。
    pub fn grow(&mut self, now: Timestamp) -> PipelineCacheResult<()> {
        profile_span!("DescriptorPool::grow");

        let new_capacity = self.capacity.saturating_mul(self.growth_factor);
        let new_handle = Self::create_vk_pool(self.device.as_ref(), new_capacity)?;

        log::info!(
            "descriptor pool grows from {} to {} bundles (growth #{})",
            self.capacity,
            new_capacity,
            self.growth_count + 1
        );
        self.extinct_pools.push(ExtinctPool {
            handle: self.handle,
            retired_at: now,
        });
        self.handle = new_handle;
        self.capacity = new_capacity;
        self.growth_count += 1;
        Ok(())
    }

    /// 销毁已经过期的旧 pool
    ///
    /// 只有在旧 pool 分配出的 bundle 全部回收之后才能调用
    pub fn destroy_expired_extinct_pools(&mut self, timeline: &TimelineTracker) -> usize {
        let before = self.extinct_pools.len();
        let device = self.device.as_ref();
        self.extinct_pools.retain(|pool| {
            if timeline.is_expired(pool.retired_at) {
                log::debug!("destroy extinct descriptor pool {:?}", pool.handle);
                device.destroy_descriptor_pool(pool.handle);
                false
            } else {
                true
            }
        });
        before - self.extinct_pools.len()
    }

    /// 销毁当前的以及所有旧的 pool，其中分配的 set 随之释放
    pub fn destroy(&mut self) {
        for pool in self.extinct_pools.drain(..) {
            self.device.destroy_descriptor_pool(pool.handle);
        }
        if self.handle != vk::DescriptorPool::null() {
            self.device.destroy_descriptor_pool(self.handle);
            self.handle = vk::DescriptorPool::null();
        }
    }
}
// getters
impl DescriptorPool {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn growth_count(&self) -> u32 {
        self.growth_count
    }

    #[inline]
    pub fn extinct_pool_count(&self) -> usize {
        self.extinct_pools.len()
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::test_utils::RecordingDevice;

    fn layouts() -> [vk::DescriptorSetLayout; DESCRIPTOR_TYPE_COUNT] {
        [
            vk::DescriptorSetLayout::from_raw(1),
            vk::DescriptorSetLayout::from_raw(2),
            vk::DescriptorSetLayout::from_raw(3),
        ]
    }

    #[test]
    fn test_capacity_is_counted_in_bundles() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(device.clone(), 2, 2).unwrap();
        assert_eq!(device.pool_usage(pool.handle()), Some((0, 6)));

        pool.allocate(&layouts()).unwrap();
        pool.allocate(&layouts()).unwrap();
        assert!(pool.needs_growth(2));
        let err = pool.allocate(&layouts()).unwrap_err();
        assert!(matches!(err, PipelineCacheError::DescriptorSetAllocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY)));

        pool.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_grow_keeps_old_pool_until_expired() {
        let device = RecordingDevice::new();
        let mut timeline = TimelineTracker::new(2);
        let mut pool = DescriptorPool::new(device.clone(), 4, 2).unwrap();
        let old = pool.handle();

        pool.grow(timeline.now()).unwrap();
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.growth_count(), 1);
        assert_ne!(pool.handle(), old);
        assert!(device.is_live(old));

        for _ in 0..2 {
            timeline.advance();
            assert_eq!(pool.destroy_expired_extinct_pools(&timeline), 0);
        }
        timeline.advance();
        assert_eq!(pool.destroy_expired_extinct_pools(&timeline), 1);
        assert!(!device.is_live(old));

        pool.destroy();
        assert_eq!(device.live_pools(), 0);
    }

    #[test]
    fn test_failed_growth_keeps_current_pool() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(device.clone(), 1, 2).unwrap();
        let handle = pool.handle();

        device.fail_pool_creation(true);
        assert!(matches!(pool.grow(0), Err(PipelineCacheError::DescriptorPoolCreation(_))));
        assert_eq!(pool.handle(), handle);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.extinct_pool_count(), 0);

        pool.destroy();
    }
}
