use std::rc::Rc;

use ash::vk;

use crate::commands::command_stream::GfxCommandStream;
use crate::config::PipelineCacheConfig;
use crate::descriptor_set_cache::{DescriptorSetCache, DescriptorSetCacheStats};
use crate::error::PipelineCacheResult;
use crate::foundation::device::DeviceFunctions;
use crate::keys::descriptor_key::UniformBufferBinding;
use crate::keys::raster_state::RasterState;
use crate::keys::usage_flags::UsageFlags;
use crate::pipeline_layout_cache::PipelineLayoutCache;
use crate::pipeline_state_cache::PipelineStateCache;
use crate::program::GfxProgram;
use crate::resources::buffer_object::GfxBufferObject;
use crate::resources::resource_arena::{GfxResourceHandle, SharedResourceArena};
use crate::resources::sampler_group::SamplerGroup;
use crate::timeline::{Timestamp, TimelineTracker};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub timestamp: Timestamp,
    pub pipelines: usize,
    pub pipeline_layouts: usize,
    pub dormant_bundles: usize,
    pub descriptors: DescriptorSetCacheStats,
}

/// renderer 使用的门面
///
/// 持有时间线与三个子缓存。`bind_*` 系列函数只修改当前需求，不调用 Vulkan；
/// [`Self::bind_pipeline`] 与 [`Self::bind_descriptors`] 在 draw 之前调用，查找或创建对象并录制绑定命令。
/// 每个 command buffer 开始录制前调用一次 [`Self::on_command_buffer`]。
///
/// 设备销毁之前必须调用 [`Self::terminate`]。
pub struct PipelineCache {
    config: PipelineCacheConfig,
    timeline: TimelineTracker,

    layout_cache: PipelineLayoutCache,
    pipeline_state_cache: PipelineStateCache,
    descriptor_set_cache: DescriptorSetCache,

    /// renderer 在 draw 之间保存的 raster state
    current_raster_state: RasterState,
    /// 当前 command buffer 中最后一次设置的 scissor
    current_scissor: Option<vk::Rect2D>,
    device: Rc<dyn DeviceFunctions>,

    terminated: bool,
}
// new & init
impl PipelineCache {
    /// `dummy_buffer` 与 `dummy_texture` 用于填充所有未绑定的 uniform buffer / sampler / input attachment 槽位，
    /// 由调用者创建并保证在 terminate 之前有效
    pub fn new(
        device: Rc<dyn DeviceFunctions>,
        arena: SharedResourceArena,
        dummy_buffer: vk::DescriptorBufferInfo,
        dummy_texture: vk::DescriptorImageInfo,
        config: PipelineCacheConfig,
    ) -> PipelineCacheResult<Self> {
        config.validate()?;

        let descriptor_set_cache = DescriptorSetCache::new(
            device.clone(),
            arena,
            dummy_buffer,
            dummy_texture,
            config.initial_descriptor_pool_size,
            config.descriptor_pool_growth_factor,
        )?;
        log::info!(
            "pipeline cache created: max age {}, descriptor pool {} bundles (x{} growth)",
            config.max_pipeline_age,
            config.initial_descriptor_pool_size,
            config.descriptor_pool_growth_factor
        );

        Ok(Self {
            timeline: TimelineTracker::new(config.max_pipeline_age),
            layout_cache: PipelineLayoutCache::new(device.clone()),
            pipeline_state_cache: PipelineStateCache::new(device.clone()),
            descriptor_set_cache,
            current_raster_state: RasterState::default(),
            current_scissor: None,
            device,
            config,
            terminated: false,
        })
    }
}
// pipeline requirements
impl PipelineCache {
    /// 同时决定 shader、specialization 以及 pipeline layout
    #[inline]
    pub fn bind_program(&mut self, program: &GfxProgram) {
        self.pipeline_state_cache.set_program(program);
    }

    #[inline]
    pub fn bind_raster_state(&mut self, raster_state: RasterState) {
        self.pipeline_state_cache.set_raster_state(raster_state);
    }

    #[inline]
    pub fn bind_render_pass(&mut self, render_pass: vk::RenderPass, subpass_index: u32) {
        self.pipeline_state_cache.set_render_pass(render_pass, subpass_index);
    }

    #[inline]
    pub fn bind_primitive_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.pipeline_state_cache.set_topology(topology);
    }

    #[inline]
    pub fn bind_vertex_array(
        &mut self,
        attributes: &[vk::VertexInputAttributeDescription],
        buffers: &[vk::VertexInputBindingDescription],
    ) {
        self.pipeline_state_cache.set_vertex_input(attributes, buffers);
    }
}
// descriptor requirements
impl PipelineCache {
    /// `size` 为 [`crate::constants::WHOLE_SIZE`] 时绑定到 buffer 末尾
    pub fn bind_uniform_buffer(&mut self, binding: usize, buffer: vk::Buffer, offset: u32, size: u32) {
        self.descriptor_set_cache.set_uniform_buffer(binding, buffer, offset, size, None);
    }

    /// 与 [`Self::bind_uniform_buffer`] 相同，另外让使用它的 bundle 持有 buffer 的引用
    pub fn bind_uniform_buffer_object(&mut self, binding: usize, buffer: &GfxBufferObject, offset: u32, size: u32) {
        debug_assert!(size == crate::constants::WHOLE_SIZE || offset + size <= buffer.byte_count());
        self.descriptor_set_cache.set_uniform_buffer(
            binding,
            buffer.vk_buffer(),
            offset,
            size,
            Some(buffer.resource()),
        );
    }

    /// 整体替换所有 sampler，`usage` 同时成为 pipeline layout 的需求
    pub fn bind_samplers(
        &mut self,
        samplers: &[vk::DescriptorImageInfo],
        textures: &[Option<GfxResourceHandle>],
        usage: UsageFlags,
    ) {
        self.descriptor_set_cache.set_samplers(samplers, textures);
        self.pipeline_state_cache.set_layout(usage);
    }

    /// 按 program 的 binding 表，把第 `group_index` 个 sampler group 中的 sampler 放到对应的 binding 上
    pub fn bind_sampler_group(&mut self, program: &GfxProgram, group_index: u8, group: &SamplerGroup) {
        let image_infos = group.image_infos();
        let textures = group.textures();
        for (binding, &sampler_index) in program.binding_to_sampler_index().iter().enumerate() {
            if (sampler_index >> 8) as u8 != group_index {
                continue;
            }
            let index = (sampler_index & 0xff) as usize;
            let Some(info) = image_infos.get(index) else {
                log::warn!("sampler group {group_index} has no sampler {index} for binding {binding}");
                continue;
            };
            self.descriptor_set_cache.set_sampler(binding, info, textures[index]);
        }
        self.descriptor_set_cache.acquire_resources(group.resources());
    }

    pub fn bind_input_attachment(
        &mut self,
        index: usize,
        info: &vk::DescriptorImageInfo,
        resource: Option<GfxResourceHandle>,
    ) {
        self.descriptor_set_cache.set_input_attachment(index, info, resource);
    }

    /// 让下一次绑定的 descriptor set 额外持有 `resource`
    #[inline]
    pub fn acquire_resource(&mut self, resource: GfxResourceHandle) {
        self.descriptor_set_cache.acquire_resource(resource);
    }

    /// 替换 layout 中声明但没有绑定的 sampler 与 input attachment 使用的占位 texture
    #[inline]
    pub fn set_dummy_texture(&mut self, info: vk::DescriptorImageInfo) {
        self.descriptor_set_cache.set_dummy_texture(info);
    }
}
// bind
impl PipelineCache {
    pub fn bind_pipeline(&mut self, cmd: &GfxCommandStream) -> PipelineCacheResult<()> {
        debug_assert!(!self.terminated);
        self.pipeline_state_cache.bind_pipeline(cmd, &mut self.layout_cache, &self.timeline)
    }

    /// pipeline layout 由当前的 pipeline 需求决定，应当在 [`Self::bind_pipeline`] 之后调用
    pub fn bind_descriptors(&mut self, cmd: &mut GfxCommandStream) -> PipelineCacheResult<()> {
        debug_assert!(!self.terminated);
        let layout_key = self.pipeline_state_cache.requirements().layout();
        self.descriptor_set_cache.bind_descriptors(cmd, &mut self.layout_cache, layout_key, &self.timeline)
    }

    /// 与上一次设置的 scissor 相同时不录制命令
    pub fn bind_scissor(&mut self, cmd: &GfxCommandStream, scissor: vk::Rect2D) {
        if self.current_scissor.is_some_and(|current| Self::same_rect(&current, &scissor)) {
            return;
        }
        self.device.cmd_set_scissor(cmd.vk_handle(), scissor);
        self.current_scissor = Some(scissor);
    }

    fn same_rect(a: &vk::Rect2D, b: &vk::Rect2D) -> bool {
        a.offset.x == b.offset.x
            && a.offset.y == b.offset.y
            && a.extent.width == b.extent.width
            && a.extent.height == b.extent.height
    }
}
// invalidation
impl PipelineCache {
    /// buffer 销毁之前调用，之后不会再有 descriptor set 引用它
    pub fn unbind_uniform_buffer(&mut self, buffer: vk::Buffer) {
        self.descriptor_set_cache.unbind_uniform_buffer(buffer);
    }

    /// image view 销毁之前调用，之后不会再有 descriptor set 引用它
    pub fn unbind_image_view(&mut self, image_view: vk::ImageView) {
        self.descriptor_set_cache.unbind_image_view(image_view);
    }
}
// frame boundary
impl PipelineCache {
    /// 开始录制新的 command buffer 之前调用
    ///
    /// 时间线前进一步，清空当前 command buffer 的绑定状态，并回收过期的对象
    pub fn on_command_buffer(&mut self) {
        profile_span!("PipelineCache::on_command_buffer");

        let now = self.timeline.advance();
        self.current_scissor = None;

        self.descriptor_set_cache.sweep(&mut self.layout_cache, &self.timeline);
        let destroyed_pipelines = self.pipeline_state_cache.sweep(&self.timeline);
        let freed_bundles = self.descriptor_set_cache.evict_expired_layouts(&mut self.layout_cache, &self.timeline);

        if destroyed_pipelines > 0 || freed_bundles > 0 {
            log::debug!(
                "command buffer #{now}: destroyed {destroyed_pipelines} pipelines, freed {freed_bundles} dormant bundles"
            );
        }
    }

    /// 销毁所有缓存的 Vulkan 对象，之后不能再使用该缓存
    pub fn terminate(&mut self) {
        profile_span!("PipelineCache::terminate");
        if self.terminated {
            return;
        }

        let stats = self.stats();
        self.descriptor_set_cache.destroy();
        self.pipeline_state_cache.destroy();
        self.layout_cache.destroy();
        self.terminated = true;

        log::info!(
            "pipeline cache terminated: {} pipelines, {} layouts, {} descriptor bundles",
            stats.pipelines,
            stats.pipeline_layouts,
            stats.descriptors.active_bundles
        );
    }
}
// getters
impl PipelineCache {
    #[inline]
    pub fn current_raster_state(&self) -> RasterState {
        self.current_raster_state
    }

    #[inline]
    pub fn set_current_raster_state(&mut self, raster_state: RasterState) {
        self.current_raster_state = raster_state;
    }

    /// 当前需求中某个 uniform 槽位的绑定，用于 renderer 保存与恢复
    #[inline]
    pub fn get_uniform_buffer_binding(&self, binding: usize) -> Option<UniformBufferBinding> {
        self.descriptor_set_cache.get_uniform_buffer_binding(binding)
    }

    #[inline]
    pub fn config(&self) -> &PipelineCacheConfig {
        &self.config
    }

    #[inline]
    pub fn timeline(&self) -> &TimelineTracker {
        &self.timeline
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            timestamp: self.timeline.now(),
            pipelines: self.pipeline_state_cache.len(),
            pipeline_layouts: self.layout_cache.len(),
            dormant_bundles: self.layout_cache.dormant_count(),
            descriptors: self.descriptor_set_cache.stats(),
        }
    }
}
impl Drop for PipelineCache {
    fn drop(&mut self) {
        if self.terminated || std::thread::panicking() {
            return;
        }
        debug_assert!(false, "PipelineCache dropped without terminate()");
        log::error!("PipelineCache dropped without terminate(), cached Vulkan objects are leaked");
    }
}
