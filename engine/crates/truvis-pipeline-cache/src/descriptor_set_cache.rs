use std::rc::Rc;

use ahash::AHashMap;
use ash::vk;
use itertools::Itertools;

use crate::commands::command_stream::GfxCommandStream;
use crate::constants::{
    DESCRIPTOR_TYPE_COUNT, INPUT_ATTACHMENT_COUNT, INPUT_ATTACHMENT_SET_INDEX, SAMPLER_BINDING_COUNT, SAMPLER_SET_INDEX,
    UBUFFER_BINDING_COUNT, UBUFFER_SET_INDEX,
};
use crate::descriptor_pool::DescriptorPool;
use crate::error::PipelineCacheResult;
use crate::foundation::device::DeviceFunctions;
use crate::keys::descriptor_key::{DescriptorImageInfo, DescriptorKey, UniformBufferBinding};
use crate::keys::usage_flags::PipelineLayoutKey;
use crate::pipeline_layout_cache::{DescriptorSetBundle, PipelineLayoutCache};
use crate::resources::acquire_manager::AcquireOnlyManager;
use crate::resources::resource_arena::{GfxResourceHandle, SharedResourceArena};
use crate::timeline::{Timestamp, TimelineTracker};

pub struct DescriptorCacheEntry {
    handles: DescriptorSetBundle,
    last_used: Timestamp,
    /// 分配这组 set 时使用的 layout，回收时放回它的 arena
    pipeline_layout: PipelineLayoutKey,
    /// 用来索引条目持有的资源
    id: u32,
}
// getters
impl DescriptorCacheEntry {
    #[inline]
    pub fn handles(&self) -> &DescriptorSetBundle {
        &self.handles
    }

    #[inline]
    pub fn last_used(&self) -> Timestamp {
        self.last_used
    }

    #[inline]
    pub fn pipeline_layout(&self) -> PipelineLayoutKey {
        self.pipeline_layout
    }
}

/// 已经离开缓存、但 GPU 可能仍在使用的 bundle，连同它持有的资源
struct ParkedBundle {
    entry: DescriptorCacheEntry,
    resources: Option<AcquireOnlyManager>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetCacheStats {
    pub active_bundles: usize,
    pub retired_bundles: usize,
    pub extinct_bundles: usize,
    pub pool_capacity: u32,
    pub pool_growth_count: u32,
    pub extinct_pools: usize,
}

/// `DescriptorKey` -> 一组 descriptor set
///
/// renderer 通过 `set_*` 系列函数修改当前的绑定需求，这些函数不会调用 Vulkan。
/// [`Self::bind_descriptors`] 时查找或创建与需求完全一致的 bundle 并绑定。
///
/// 一个 bundle 所处的位置：
/// - active：在 `descriptor_sets` 中，可以被再次绑定
/// - retired：引用的资源被 unbind，不能再绑定，等待过期后放回 arena
/// - dormant：在 layout 的 arena 中，可以直接复用
/// - extinct：pool 扩容前分配的 bundle，等待过期后随旧 pool 一起销毁
pub struct DescriptorSetCache {
    device: Rc<dyn DeviceFunctions>,
    arena: SharedResourceArena,
    pool: DescriptorPool,

    descriptor_sets: AHashMap<DescriptorKey, DescriptorCacheEntry>,
    /// 条目 id -> 条目持有的资源，第一次绑定时创建
    descriptor_resources: AHashMap<u32, AcquireOnlyManager>,
    next_entry_id: u32,

    retired_bundles: Vec<ParkedBundle>,
    extinct_bundles: Vec<ParkedBundle>,

    /// 没有绑定 buffer 的 uniform 槽位写入这个 buffer
    dummy_buffer_info: vk::DescriptorBufferInfo,
    /// layout 中声明但没有绑定的 sampler 以及 input attachment 写入这个 texture
    dummy_image_info: vk::DescriptorImageInfo,

    requirements: DescriptorKey,
    uniform_resources: [Option<GfxResourceHandle>; UBUFFER_BINDING_COUNT],
    sampler_resources: [Option<GfxResourceHandle>; SAMPLER_BINDING_COUNT],
    input_attachment_resources: [Option<GfxResourceHandle>; INPUT_ATTACHMENT_COUNT],
    /// 通过 acquire_resource 附加的资源，下一次绑定时转交给条目
    pending_resources: AcquireOnlyManager,

    /// 当前 command buffer 中最后一次绑定的 key
    bound: Option<DescriptorKey>,
}
// new & init
impl DescriptorSetCache {
    pub fn new(
        device: Rc<dyn DeviceFunctions>,
        arena: SharedResourceArena,
        dummy_buffer_info: vk::DescriptorBufferInfo,
        dummy_image_info: vk::DescriptorImageInfo,
        initial_pool_size: u32,
        growth_factor: u32,
    ) -> PipelineCacheResult<Self> {
        let pool = DescriptorPool::new(device.clone(), initial_pool_size, growth_factor)?;
        Ok(Self {
            device,
            pending_resources: AcquireOnlyManager::new(arena.clone()),
            arena,
            pool,
            descriptor_sets: AHashMap::new(),
            descriptor_resources: AHashMap::new(),
            next_entry_id: 0,
            retired_bundles: Vec::new(),
            extinct_bundles: Vec::new(),
            dummy_buffer_info,
            dummy_image_info,
            requirements: DescriptorKey::default(),
            uniform_resources: [None; UBUFFER_BINDING_COUNT],
            sampler_resources: [None; SAMPLER_BINDING_COUNT],
            input_attachment_resources: [None; INPUT_ATTACHMENT_COUNT],
            bound: None,
        })
    }
}
// requirements
impl DescriptorSetCache {
    pub fn set_uniform_buffer(
        &mut self,
        binding: usize,
        buffer: vk::Buffer,
        offset: u32,
        size: u32,
        resource: Option<GfxResourceHandle>,
    ) {
        debug_assert!(binding < UBUFFER_BINDING_COUNT);
        self.requirements.set_uniform_buffer(binding, buffer, offset, size);
        self.uniform_resources[binding] = resource;
    }

    /// 从 binding 0 开始依次设置 sampler，其余槽位清空
    pub fn set_samplers(&mut self, samplers: &[vk::DescriptorImageInfo], textures: &[Option<GfxResourceHandle>]) {
        debug_assert!(samplers.len() <= SAMPLER_BINDING_COUNT);
        for binding in 0..SAMPLER_BINDING_COUNT {
            match samplers.get(binding) {
                Some(info) => self.requirements.set_sampler(binding, DescriptorImageInfo::from(info)),
                None => self.requirements.clear_sampler(binding),
            }
            self.sampler_resources[binding] = textures.get(binding).copied().flatten();
        }
    }

    /// 只修改一个 sampler 槽位
    pub fn set_sampler(
        &mut self,
        binding: usize,
        info: &vk::DescriptorImageInfo,
        texture: Option<GfxResourceHandle>,
    ) {
        debug_assert!(binding < SAMPLER_BINDING_COUNT);
        self.requirements.set_sampler(binding, DescriptorImageInfo::from(info));
        self.sampler_resources[binding] = texture;
    }

    pub fn set_input_attachment(
        &mut self,
        index: usize,
        info: &vk::DescriptorImageInfo,
        resource: Option<GfxResourceHandle>,
    ) {
        debug_assert!(index < INPUT_ATTACHMENT_COUNT);
        self.requirements.set_input_attachment(index, DescriptorImageInfo::from(info));
        self.input_attachment_resources[index] = resource;
    }

    /// 让下一次绑定的条目额外持有 `resource`
    pub fn acquire_resource(&mut self, resource: GfxResourceHandle) {
        self.pending_resources.acquire(resource);
    }

    /// 把 `resources` 中的所有资源交给下一次绑定的条目
    pub fn acquire_resources(&mut self, resources: &AcquireOnlyManager) {
        self.pending_resources.acquire_all(resources);
    }

    /// 替换构造时传入的占位 texture
    pub fn set_dummy_texture(&mut self, info: vk::DescriptorImageInfo) {
        self.dummy_image_info = info;
    }
}
// bind
impl DescriptorSetCache {
    /// 确保与当前需求一致的 bundle 存在并绑定到 `cmd`
    ///
    /// `layout_key` 来自当前的 pipeline 需求。分配失败时不会留下任何条目。
    pub fn bind_descriptors(
        &mut self,
        cmd: &mut GfxCommandStream,
        layouts: &mut PipelineLayoutCache,
        layout_key: PipelineLayoutKey,
        timeline: &TimelineTracker,
    ) -> PipelineCacheResult<()> {
        profile_span!("DescriptorSetCache::bind_descriptors");

        let now = timeline.now();
        self.requirements.set_layout(layout_key);

        if self.bound.as_ref() == Some(&self.requirements) && !self.descriptor_sets.is_empty() {
            if let Some(entry) = self.descriptor_sets.get_mut(&self.requirements) {
                entry.last_used = now;
                let entry_id = entry.id;
                // 两次 draw 之间附加的资源仍然要交给正在录制的 command buffer
                if !self.pending_resources.is_empty() {
                    self.hand_over_resources(cmd, entry_id);
                }
                return Ok(());
            }
            debug_assert!(false, "bound descriptor key is missing from the cache");
            log::error!("bound descriptor key is missing from the cache, rebinding");
        }

        let layout_entry = layouts.get_or_create(layout_key, now)?;
        let pipeline_layout = layout_entry.handle();
        let set_layouts = *layout_entry.descriptor_set_layouts();

        let key = self.requirements;
        let (handles, entry_id) = match self.descriptor_sets.get_mut(&key) {
            Some(entry) => {
                entry.last_used = now;
                (entry.handles, entry.id)
            }
            None => {
                let handles = self.create_descriptor_sets(layouts, &key, &set_layouts, now)?;
                let id = self.next_entry_id;
                self.next_entry_id = self.next_entry_id.wrapping_add(1);
                self.descriptor_sets.insert(
                    key,
                    DescriptorCacheEntry {
                        handles,
                        last_used: now,
                        pipeline_layout: layout_key,
                        id,
                    },
                );
                (handles, id)
            }
        };
        self.bound = Some(key);
        self.hand_over_resources(cmd, entry_id);

        self.device.cmd_bind_descriptor_sets(cmd.vk_handle(), pipeline_layout, 0, &handles);
        Ok(())
    }

    /// 条目持有当前槽位的资源与 pending 资源，command stream 再持有条目的全部资源
    fn hand_over_resources(&mut self, cmd: &mut GfxCommandStream, entry_id: u32) {
        let resources = self
            .descriptor_resources
            .entry(entry_id)
            .or_insert_with(|| AcquireOnlyManager::new(self.arena.clone()));
        for &resource in
            self.uniform_resources.iter().chain(&self.sampler_resources).chain(&self.input_attachment_resources).flatten()
        {
            resources.acquire(resource);
        }
        resources.acquire_all(&self.pending_resources);
        self.pending_resources.clear();
        cmd.resources_mut().acquire_all(resources);
    }

    fn create_descriptor_sets(
        &mut self,
        layouts: &mut PipelineLayoutCache,
        key: &DescriptorKey,
        set_layouts: &[vk::DescriptorSetLayout; DESCRIPTOR_TYPE_COUNT],
        now: Timestamp,
    ) -> PipelineCacheResult<DescriptorSetBundle> {
        let layout_key = key.layout();
        let reused = layouts.get_mut(&layout_key).and_then(|entry| entry.pop_bundle());
        let handles = match reused {
            Some(handles) => handles,
            None => {
                let in_use = self.descriptor_sets.len() + self.retired_bundles.len() + layouts.dormant_count();
                if self.pool.needs_growth(in_use) {
                    self.grow_pool(layouts, now)?;
                }
                self.pool.allocate(set_layouts)?
            }
        };
        log::debug!(
            "descriptor sets {:?} for layout {:?} ({})",
            handles,
            layout_key,
            if reused.is_some() { "reused" } else { "allocated" }
        );

        self.write_descriptor_sets(&handles, key);
        Ok(handles)
    }

    /// 写入 bundle 中所有可写的槽位：arena 中取出的 set 不能残留上一次的绑定
    fn write_descriptor_sets(&self, handles: &DescriptorSetBundle, key: &DescriptorKey) {
        let buffer_infos: [vk::DescriptorBufferInfo; UBUFFER_BINDING_COUNT] =
            std::array::from_fn(|binding| match key.uniform_buffer(binding) {
                Some(ubo) => vk::DescriptorBufferInfo::default()
                    .buffer(ubo.buffer)
                    .offset(ubo.offset as vk::DeviceSize)
                    .range(ubo.range()),
                None => self.dummy_buffer_info,
            });

        // layout 中声明的 sampler 全部写入，未绑定的使用占位 texture
        let sampler_infos = key
            .layout()
            .active_samplers()
            .map(|(binding, _)| {
                let info = key.sampler(binding).map_or(self.dummy_image_info, DescriptorImageInfo::to_vk);
                (binding as u32, info)
            })
            .collect_vec();

        let input_infos = (0..INPUT_ATTACHMENT_COUNT)
            .map(|index| {
                let info = key.input_attachment(index).map_or(
                    vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        ..self.dummy_image_info
                    },
                    DescriptorImageInfo::to_vk,
                );
                (index as u32, info)
            })
            .collect_vec();

        let mut writes = Vec::with_capacity(UBUFFER_BINDING_COUNT + sampler_infos.len() + input_infos.len());
        for (binding, info) in buffer_infos.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(handles[UBUFFER_SET_INDEX])
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }
        for (binding, info) in &sampler_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(handles[SAMPLER_SET_INDEX])
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info)),
            );
        }
        for (binding, info) in &input_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(handles[INPUT_ATTACHMENT_SET_INDEX])
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                    .image_info(std::slice::from_ref(info)),
            );
        }
        self.device.update_descriptor_sets(&writes);
    }

    /// pool 扩容：所有 active 与 retired 的 bundle 变为 extinct，arena 被清空
    fn grow_pool(&mut self, layouts: &mut PipelineLayoutCache, now: Timestamp) -> PipelineCacheResult<()> {
        self.pool.grow(now)?;

        let dropped_dormant = layouts.clear_arenas();
        let active = self.descriptor_sets.len();
        let retired = self.retired_bundles.len();
        for (_, entry) in self.descriptor_sets.drain() {
            let resources = self.descriptor_resources.remove(&entry.id);
            self.extinct_bundles.push(ParkedBundle { entry, resources });
        }
        self.extinct_bundles.append(&mut self.retired_bundles);
        self.bound = None;

        log::info!(
            "descriptor bundles moved to the extinct list: {active} active, {retired} retired; {dropped_dormant} dormant dropped"
        );
        Ok(())
    }
}
// invalidation
impl DescriptorSetCache {
    /// `buffer` 即将被销毁：清除需求中的引用，并让所有引用它的 bundle 退役
    pub fn unbind_uniform_buffer(&mut self, buffer: vk::Buffer) {
        for binding in self.requirements.unbind_buffer(buffer) {
            self.uniform_resources[binding] = None;
        }
        if self.bound.as_ref().is_some_and(|key| key.references_buffer(buffer)) {
            self.bound = None;
        }
        self.retire_matching(|key| key.references_buffer(buffer));
    }

    /// `image_view` 即将被销毁：清除 sampler 与 input attachment 中的引用，并让所有引用它的 bundle 退役
    pub fn unbind_image_view(&mut self, image_view: vk::ImageView) {
        for binding in self.requirements.unbind_image_view(image_view) {
            self.sampler_resources[binding] = None;
        }
        for index in 0..INPUT_ATTACHMENT_COUNT {
            if self.requirements.input_attachment(index).is_none() {
                self.input_attachment_resources[index] = None;
            }
        }
        if self.bound.as_ref().is_some_and(|key| key.references_image_view(image_view)) {
            self.bound = None;
        }
        self.retire_matching(|key| key.references_image_view(image_view));
    }

    fn retire_matching(&mut self, matches: impl Fn(&DescriptorKey) -> bool) {
        let keys = self.descriptor_sets.keys().filter(|key| matches(key)).copied().collect_vec();
        for key in &keys {
            let Some(entry) = self.descriptor_sets.remove(key) else {
                continue;
            };
            let resources = self.descriptor_resources.remove(&entry.id);
            self.retired_bundles.push(ParkedBundle { entry, resources });
        }
        if !keys.is_empty() {
            log::debug!("retired {} descriptor bundles", keys.len());
        }
    }
}
// reclaim & destroy
impl DescriptorSetCache {
    /// 进入新的 command buffer 之后调用
    ///
    /// 过期的 active / retired bundle 回到 layout 的 arena，过期的 extinct bundle 被丢弃；
    /// extinct bundle 全部清空后，过期的旧 pool 才会销毁。
    pub fn sweep(&mut self, layouts: &mut PipelineLayoutCache, timeline: &TimelineTracker) {
        profile_span!("DescriptorSetCache::sweep");

        self.bound = None;

        let expired = self
            .descriptor_sets
            .iter()
            .filter(|(_, entry)| timeline.is_expired(entry.last_used))
            .map(|(key, _)| *key)
            .collect_vec();
        for key in &expired {
            let Some(entry) = self.descriptor_sets.remove(key) else {
                continue;
            };
            self.descriptor_resources.remove(&entry.id);
            self.reclaim(layouts, &entry);
        }

        let (expired_retired, retired): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired_bundles)
            .into_iter()
            .partition(|bundle| timeline.is_expired(bundle.entry.last_used));
        self.retired_bundles = retired;
        for bundle in expired_retired {
            self.reclaim(layouts, &bundle.entry);
        }

        self.extinct_bundles.retain(|bundle| !timeline.is_expired(bundle.entry.last_used));
        if self.extinct_bundles.is_empty() {
            self.pool.destroy_expired_extinct_pools(timeline);
        }
    }

    /// bundle 放回 layout 的 arena；layout 已经不在时直接还给 pool
    fn reclaim(&self, layouts: &mut PipelineLayoutCache, entry: &DescriptorCacheEntry) {
        match layouts.get_mut(&entry.pipeline_layout) {
            Some(layout) => layout.push_bundle(entry.handles),
            None => self.pool.free(&entry.handles),
        }
    }

    /// 销毁过期的 layout，其 arena 中的 set 还给当前的 pool
    pub fn evict_expired_layouts(&mut self, layouts: &mut PipelineLayoutCache, timeline: &TimelineTracker) -> usize {
        layouts.evict_expired(timeline, &self.pool)
    }

    /// 所有 set 随 pool 一起销毁，持有的资源全部释放
    pub fn destroy(&mut self) {
        self.bound = None;
        self.descriptor_sets.clear();
        self.descriptor_resources.clear();
        self.retired_bundles.clear();
        self.extinct_bundles.clear();
        self.pending_resources.clear();
        self.pool.destroy();
    }
}
// getters
impl DescriptorSetCache {
    /// 当前需求中某个 uniform 槽位的绑定
    #[inline]
    pub fn get_uniform_buffer_binding(&self, binding: usize) -> Option<UniformBufferBinding> {
        self.requirements.uniform_buffer(binding)
    }

    #[inline]
    pub fn requirements(&self) -> &DescriptorKey {
        &self.requirements
    }

    #[inline]
    pub fn bound(&self) -> Option<&DescriptorKey> {
        self.bound.as_ref()
    }

    #[inline]
    pub fn get(&self, key: &DescriptorKey) -> Option<&DescriptorCacheEntry> {
        self.descriptor_sets.get(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptor_sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptor_sets.is_empty()
    }

    /// 某个 key 对应条目持有的资源数量
    pub fn entry_resource_count(&self, key: &DescriptorKey) -> usize {
        self.descriptor_sets
            .get(key)
            .and_then(|entry| self.descriptor_resources.get(&entry.id))
            .map_or(0, AcquireOnlyManager::len)
    }

    pub fn stats(&self) -> DescriptorSetCacheStats {
        DescriptorSetCacheStats {
            active_bundles: self.descriptor_sets.len(),
            retired_bundles: self.retired_bundles.len(),
            extinct_bundles: self.extinct_bundles.len(),
            pool_capacity: self.pool.capacity(),
            pool_growth_count: self.pool.growth_count(),
            extinct_pools: self.pool.extinct_pool_count(),
        }
    }
}
