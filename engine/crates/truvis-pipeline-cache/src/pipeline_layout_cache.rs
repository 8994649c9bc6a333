use std::collections::hash_map::Entry;
use std::rc::Rc;

use ahash::AHashMap;
use ash::vk;

use crate::constants::{DESCRIPTOR_TYPE_COUNT, INPUT_ATTACHMENT_COUNT, UBUFFER_BINDING_COUNT};
use crate::descriptor_pool::DescriptorPool;
use crate::error::{PipelineCacheError, PipelineCacheResult};
use crate::foundation::device::DeviceFunctions;
use crate::keys::usage_flags::PipelineLayoutKey;
use crate::timeline::{Timestamp, TimelineTracker};

/// 一组 descriptor set，按 uniform buffer / sampler / input attachment 的顺序
pub type DescriptorSetBundle = [vk::DescriptorSet; DESCRIPTOR_TYPE_COUNT];

pub struct PipelineLayoutCacheEntry {
    handle: vk::PipelineLayout,
    last_used: Timestamp,
    descriptor_set_layouts: [vk::DescriptorSetLayout; DESCRIPTOR_TYPE_COUNT],

    /// 已经不再使用、可以直接复用的 descriptor set
    ///
    /// bundle 总是整体放入、整体取出，因此三个 arena 的长度始终相同
    descriptor_set_arenas: [Vec<vk::DescriptorSet>; DESCRIPTOR_TYPE_COUNT],
}
// getters
impl PipelineLayoutCacheEntry {
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn last_used(&self) -> Timestamp {
        self.last_used
    }

    #[inline]
    pub fn descriptor_set_layouts(&self) -> &[vk::DescriptorSetLayout; DESCRIPTOR_TYPE_COUNT] {
        &self.descriptor_set_layouts
    }

    /// arena 中 bundle 的数量
    #[inline]
    pub fn dormant_count(&self) -> usize {
        self.descriptor_set_arenas[0].len()
    }
}
// arena
impl PipelineLayoutCacheEntry {
    pub fn pop_bundle(&mut self) -> Option<DescriptorSetBundle> {
        let [ubo, sampler, input] = &mut self.descriptor_set_arenas;
        match (ubo.pop(), sampler.pop(), input.pop()) {
            (Some(ubo), Some(sampler), Some(input)) => Some([ubo, sampler, input]),
            (None, None, None) => None,
            _ => {
                debug_assert!(false, "descriptor set arenas are out of sync");
                log::error!("descriptor set arenas are out of sync");
                None
            }
        }
    }

    pub fn push_bundle(&mut self, bundle: DescriptorSetBundle) {
        for (arena, set) in self.descriptor_set_arenas.iter_mut().zip(bundle) {
            arena.push(set);
        }
    }

    /// 清空 arena，返回被丢弃的 bundle 数量
    fn clear_arenas(&mut self) -> usize {
        let count = self.dormant_count();
        self.descriptor_set_arenas.iter_mut().for_each(Vec::clear);
        count
    }
}

/// `PipelineLayoutKey` -> pipeline layout 与 descriptor set layout
///
/// 每个 layout 对应 3 个 set：
/// - set 0：[`UBUFFER_BINDING_COUNT`] 个 uniform buffer，vertex | fragment 可见
/// - set 1：key 中标记为活跃的 combined image sampler，可见性由 key 决定
/// - set 2：[`INPUT_ATTACHMENT_COUNT`] 个 input attachment，fragment 可见
pub struct PipelineLayoutCache {
    device: Rc<dyn DeviceFunctions>,
    layouts: AHashMap<PipelineLayoutKey, PipelineLayoutCacheEntry>,
}
// new & init
impl PipelineLayoutCache {
    pub fn new(device: Rc<dyn DeviceFunctions>) -> Self {
        Self {
            device,
            layouts: AHashMap::new(),
        }
    }
}
// lookup
impl PipelineLayoutCache {
    /// 命中时刷新时间戳；未命中时创建，失败不会留下任何对象
    pub fn get_or_create(
        &mut self,
        key: PipelineLayoutKey,
        now: Timestamp,
    ) -> PipelineCacheResult<&mut PipelineLayoutCacheEntry> {
        let entry = match self.layouts.entry(key) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let entry = Self::create_entry(self.device.as_ref(), &key, now)?;
                vacant.insert(entry)
            }
        };
        entry.last_used = now;
        Ok(entry)
    }

    #[inline]
    pub fn get(&self, key: &PipelineLayoutKey) -> Option<&PipelineLayoutCacheEntry> {
        self.layouts.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &PipelineLayoutKey) -> Option<&mut PipelineLayoutCacheEntry> {
        self.layouts.get_mut(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// 所有 layout 的 arena 中 bundle 的总数
    pub fn dormant_count(&self) -> usize {
        self.layouts.values().map(|entry| entry.dormant_count()).sum()
    }
}
// create
impl PipelineLayoutCache {
    fn create_entry(
        device: &dyn DeviceFunctions,
        key: &PipelineLayoutKey,
        now: Timestamp,
    ) -> PipelineCacheResult<PipelineLayoutCacheEntry> {
        let ubo_stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let ubo_bindings: Vec<_> = (0..UBUFFER_BINDING_COUNT as u32)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(ubo_stages)
            })
            .collect();
        let sampler_bindings: Vec<_> = key
            .active_samplers()
            .map(|(binding, stages)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(stages)
            })
            .collect();
        let input_bindings: Vec<_> = (0..INPUT_ATTACHMENT_COUNT as u32)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            })
            .collect();

        // 顺序与 UBUFFER_SET_INDEX / SAMPLER_SET_INDEX / INPUT_ATTACHMENT_SET_INDEX 一致
        let binding_lists: [&[vk::DescriptorSetLayoutBinding]; DESCRIPTOR_TYPE_COUNT] =
            [&ubo_bindings, &sampler_bindings, &input_bindings];

        let mut set_layouts = [vk::DescriptorSetLayout::null(); DESCRIPTOR_TYPE_COUNT];
        for (index, bindings) in binding_lists.iter().enumerate() {
            let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
            match device.create_descriptor_set_layout(&create_info) {
                Ok(layout) => set_layouts[index] = layout,
                Err(e) => {
                    log::error!("failed to create descriptor set layout {index} for {key:?}: {e}");
                    Self::destroy_set_layouts(device, &set_layouts[..index]);
                    return Err(PipelineCacheError::DescriptorSetLayoutCreation(e));
                }
            }
        }

        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let handle = match device.create_pipeline_layout(&create_info) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("failed to create pipeline layout for {key:?}: {e}");
                Self::destroy_set_layouts(device, &set_layouts);
                return Err(PipelineCacheError::PipelineLayoutCreation(e));
            }
        };

        log::debug!("created pipeline layout {handle:?} with {} samplers", sampler_bindings.len());
        Ok(PipelineLayoutCacheEntry {
            handle,
            last_used: now,
            descriptor_set_layouts: set_layouts,
            descriptor_set_arenas: Default::default(),
        })
    }

    fn destroy_set_layouts(device: &dyn DeviceFunctions, layouts: &[vk::DescriptorSetLayout]) {
        for &layout in layouts {
            device.destroy_descriptor_set_layout(layout);
        }
    }
}
// reclaim & destroy
impl PipelineLayoutCache {
    /// descriptor pool 扩容后，arena 中的 set 属于旧的 pool，不能再复用
    ///
    /// 返回被丢弃的 bundle 数量
    pub fn clear_arenas(&mut self) -> usize {
        self.layouts.values_mut().map(|entry| entry.clear_arenas()).sum()
    }

    /// 销毁过期的 layout，并把其 arena 中的 set 还给 `pool`
    ///
    /// 返回被释放的 bundle 数量
    pub fn evict_expired(&mut self, timeline: &TimelineTracker, pool: &DescriptorPool) -> usize {
        profile_span!("PipelineLayoutCache::evict_expired");

        let expired: Vec<PipelineLayoutKey> = self
            .layouts
            .iter()
            .filter(|(_, entry)| timeline.is_expired(entry.last_used))
            .map(|(key, _)| *key)
            .collect();

        let mut freed_bundles = 0;
        for key in &expired {
            let Some(entry) = self.layouts.remove(key) else {
                continue;
            };
            freed_bundles += entry.dormant_count();
            for arena in &entry.descriptor_set_arenas {
                pool.free(arena);
            }
            self.destroy_entry(&entry);
        }
        freed_bundles
    }

    /// 销毁所有 layout；arena 中的 set 随 pool 一起销毁
    pub fn destroy(&mut self) {
        for (_, entry) in self.layouts.drain() {
            self.device.destroy_pipeline_layout(entry.handle);
            for layout in entry.descriptor_set_layouts {
                self.device.destroy_descriptor_set_layout(layout);
            }
        }
    }

    fn destroy_entry(&self, entry: &PipelineLayoutCacheEntry) {
        log::debug!("destroy pipeline layout {:?}", entry.handle);
        self.device.destroy_pipeline_layout(entry.handle);
        Self::destroy_set_layouts(self.device.as_ref(), &entry.descriptor_set_layouts);
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::test_utils::RecordingDevice;

    fn sampler_key() -> PipelineLayoutKey {
        PipelineLayoutKey::empty()
            .with_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .with_sampler(4, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
    }

    #[test]
    fn test_layout_bindings() {
        let device = RecordingDevice::new();
        let mut cache = PipelineLayoutCache::new(device.clone());

        let entry = cache.get_or_create(sampler_key(), 0).unwrap();
        let [ubo, sampler, input] = *entry.descriptor_set_layouts();

        let ubo_bindings = device.set_layout_bindings(ubo);
        assert_eq!(ubo_bindings.len(), UBUFFER_BINDING_COUNT);
        assert!(ubo_bindings.iter().all(|&(_, ty, stages)| {
            ty == vk::DescriptorType::UNIFORM_BUFFER
                && stages == vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        }));

        assert_eq!(
            device.set_layout_bindings(sampler),
            vec![
                (0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
                (
                    4,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
                ),
            ]
        );
        assert_eq!(
            device.set_layout_bindings(input),
            vec![(0, vk::DescriptorType::INPUT_ATTACHMENT, vk::ShaderStageFlags::FRAGMENT)]
        );

        cache.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_hit_refreshes_timestamp() {
        let device = RecordingDevice::new();
        let mut cache = PipelineLayoutCache::new(device.clone());

        let handle = cache.get_or_create(sampler_key(), 1).unwrap().handle();
        let entry = cache.get_or_create(sampler_key(), 5).unwrap();
        assert_eq!(entry.handle(), handle);
        assert_eq!(entry.last_used(), 5);
        assert_eq!(device.counters().pipeline_layouts_created, 1);
        assert_eq!(device.counters().set_layouts_created, 3);

        cache.destroy();
    }

    #[test]
    fn test_failed_creation_leaves_nothing_behind() {
        let device = RecordingDevice::new();
        let mut cache = PipelineLayoutCache::new(device.clone());

        device.fail_set_layout_creation(true);
        let err = cache.get_or_create(sampler_key(), 0).err().unwrap();
        assert!(matches!(err, PipelineCacheError::DescriptorSetLayoutCreation(_)));
        assert!(!err.is_fatal());
        assert!(cache.is_empty());
        assert_eq!(device.live_object_count(), 0);

        device.fail_set_layout_creation(false);
        assert!(cache.get_or_create(sampler_key(), 0).is_ok());
        cache.destroy();
    }

    #[test]
    fn test_arena_bundles_stay_in_sync() {
        let device = RecordingDevice::new();
        let mut cache = PipelineLayoutCache::new(device.clone());
        let entry = cache.get_or_create(PipelineLayoutKey::empty(), 0).unwrap();

        let bundle = [
            vk::DescriptorSet::from_raw(1),
            vk::DescriptorSet::from_raw(2),
            vk::DescriptorSet::from_raw(3),
        ];
        entry.push_bundle(bundle);
        assert_eq!(entry.dormant_count(), 1);
        assert_eq!(entry.pop_bundle(), Some(bundle));
        assert_eq!(entry.pop_bundle(), None);

        entry.push_bundle(bundle);
        assert_eq!(cache.dormant_count(), 1);
        assert_eq!(cache.clear_arenas(), 1);
        assert_eq!(cache.dormant_count(), 0);
        cache.destroy();
    }
}
