//! 单元测试使用的记录设备
//!
//! 不调用任何真实的 Vulkan 函数：handle 由递增的计数器生成，descriptor pool 会检查容量，
//! 所有 descriptor 写入、bind 与销毁都会被记录下来供断言使用。

use std::cell::RefCell;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;

use crate::foundation::device::DeviceFunctions;

#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordedWrite {
    pub dst_set: vk::DescriptorSet,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub buffer: Option<vk::DescriptorBufferInfo>,
    pub image: Option<vk::DescriptorImageInfo>,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RecordedPipeline {
    pub stage_count: u32,
    pub color_attachment_count: u32,
    pub vertex_attribute_count: u32,
    pub vertex_binding_count: u32,
    pub has_specialization: bool,
    pub layout: vk::PipelineLayout,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DeviceCounters {
    pub set_layouts_created: u32,
    pub set_layouts_destroyed: u32,
    pub pipeline_layouts_created: u32,
    pub pipeline_layouts_destroyed: u32,
    pub pipelines_created: u32,
    pub pipelines_destroyed: u32,
    pub pools_created: u32,
    pub pools_destroyed: u32,
    pub sets_allocated: u32,
    pub sets_freed: u32,
    pub update_calls: u32,
    pub pipeline_binds: u32,
    pub descriptor_binds: u32,
    pub scissor_sets: u32,
}

struct PoolState {
    max_sets: u32,
    allocated: u32,
}

#[derive(Default)]
struct RecordingState {
    next_handle: u64,
    counters: DeviceCounters,
    pools: AHashMap<vk::DescriptorPool, PoolState>,
    /// 每次 update_descriptor_sets 的写入
    update_batches: Vec<Vec<RecordedWrite>>,
    /// 每个 set layout 的 (binding, type, stages)
    set_layout_bindings: AHashMap<vk::DescriptorSetLayout, Vec<(u32, vk::DescriptorType, vk::ShaderStageFlags)>>,
    pipelines: Vec<RecordedPipeline>,
    bound_pipelines: Vec<vk::Pipeline>,
    bound_descriptor_sets: Vec<(vk::PipelineLayout, Vec<vk::DescriptorSet>)>,
    live_objects: AHashSet<u64>,

    fail_pipeline_creation: bool,
    fail_pool_creation: bool,
    fail_set_layout_creation: bool,
}

pub(crate) struct RecordingDevice {
    state: RefCell<RecordingState>,
}
// new & init
impl RecordingDevice {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(RecordingState {
                next_handle: 0x1000,
                ..Default::default()
            }),
        })
    }

    fn next_handle<H: Handle>(&self) -> H {
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let raw = state.next_handle;
        state.live_objects.insert(raw);
        H::from_raw(raw)
    }

    fn retire_handle<H: Handle + Copy>(&self, handle: H) {
        let removed = self.state.borrow_mut().live_objects.remove(&handle.as_raw());
        assert!(removed, "destroying unknown or already destroyed object {:#x}", handle.as_raw());
    }
}
// failure injection
impl RecordingDevice {
    pub fn fail_pipeline_creation(&self, fail: bool) {
        self.state.borrow_mut().fail_pipeline_creation = fail;
    }

    pub fn fail_pool_creation(&self, fail: bool) {
        self.state.borrow_mut().fail_pool_creation = fail;
    }

    pub fn fail_set_layout_creation(&self, fail: bool) {
        self.state.borrow_mut().fail_set_layout_creation = fail;
    }
}
// inspection
impl RecordingDevice {
    pub fn counters(&self) -> DeviceCounters {
        self.state.borrow().counters
    }

    pub fn last_update(&self) -> Vec<RecordedWrite> {
        self.state.borrow().update_batches.last().cloned().unwrap_or_default()
    }

    pub fn update_batches(&self) -> Vec<Vec<RecordedWrite>> {
        self.state.borrow().update_batches.clone()
    }

    pub fn last_pipeline(&self) -> Option<RecordedPipeline> {
        self.state.borrow().pipelines.last().copied()
    }

    pub fn bound_pipelines(&self) -> Vec<vk::Pipeline> {
        self.state.borrow().bound_pipelines.clone()
    }

    pub fn bound_descriptor_sets(&self) -> Vec<(vk::PipelineLayout, Vec<vk::DescriptorSet>)> {
        self.state.borrow().bound_descriptor_sets.clone()
    }

    pub fn set_layout_bindings(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Vec<(u32, vk::DescriptorType, vk::ShaderStageFlags)> {
        self.state.borrow().set_layout_bindings.get(&layout).cloned().unwrap_or_default()
    }

    pub fn pool_usage(&self, pool: vk::DescriptorPool) -> Option<(u32, u32)> {
        self.state.borrow().pools.get(&pool).map(|p| (p.allocated, p.max_sets))
    }

    pub fn live_pools(&self) -> usize {
        self.state.borrow().pools.len()
    }

    /// 尚未销毁的对象数量（不含 descriptor set）
    pub fn live_object_count(&self) -> usize {
        self.state.borrow().live_objects.len()
    }

    pub fn is_live<H: Handle>(&self, handle: H) -> bool {
        self.state.borrow().live_objects.contains(&handle.as_raw())
    }
}

impl DeviceFunctions for RecordingDevice {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        if self.state.borrow().fail_set_layout_creation {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let bindings = if create_info.binding_count == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(create_info.p_bindings, create_info.binding_count as usize) }
                .iter()
                .map(|b| (b.binding, b.descriptor_type, b.stage_flags))
                .collect()
        };
        let layout: vk::DescriptorSetLayout = self.next_handle();
        let mut state = self.state.borrow_mut();
        state.counters.set_layouts_created += 1;
        state.set_layout_bindings.insert(layout, bindings);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.retire_handle(layout);
        self.state.borrow_mut().counters.set_layouts_destroyed += 1;
    }

    fn create_pipeline_layout(&self, create_info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout> {
        assert_eq!(create_info.set_layout_count, 3);
        let layout = self.next_handle();
        self.state.borrow_mut().counters.pipeline_layouts_created += 1;
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.retire_handle(layout);
        self.state.borrow_mut().counters.pipeline_layouts_destroyed += 1;
    }

    fn create_graphics_pipeline(&self, create_info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline> {
        if self.state.borrow().fail_pipeline_creation {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        let recorded = unsafe {
            let stages = std::slice::from_raw_parts(create_info.p_stages, create_info.stage_count as usize);
            let vertex_input = &*create_info.p_vertex_input_state;
            let color_blend = &*create_info.p_color_blend_state;
            RecordedPipeline {
                stage_count: create_info.stage_count,
                color_attachment_count: color_blend.attachment_count,
                vertex_attribute_count: vertex_input.vertex_attribute_description_count,
                vertex_binding_count: vertex_input.vertex_binding_description_count,
                has_specialization: stages.iter().any(|s| !s.p_specialization_info.is_null()),
                layout: create_info.layout,
            }
        };
        let pipeline = self.next_handle();
        let mut state = self.state.borrow_mut();
        state.counters.pipelines_created += 1;
        state.pipelines.push(recorded);
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.retire_handle(pipeline);
        self.state.borrow_mut().counters.pipelines_destroyed += 1;
    }

    fn create_descriptor_pool(&self, create_info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        if self.state.borrow().fail_pool_creation {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        assert!(create_info.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));
        let pool = self.next_handle();
        let mut state = self.state.borrow_mut();
        state.counters.pools_created += 1;
        state.pools.insert(
            pool,
            PoolState {
                max_sets: create_info.max_sets,
                allocated: 0,
            },
        );
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.retire_handle(pool);
        let mut state = self.state.borrow_mut();
        state.counters.pools_destroyed += 1;
        state.pools.remove(&pool);
    }

    fn allocate_descriptor_sets(
        &self,
        allocate_info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let count = allocate_info.descriptor_set_count;
        {
            let mut state = self.state.borrow_mut();
            let Some(pool) = state.pools.get_mut(&allocate_info.descriptor_pool) else {
                panic!("allocating from unknown pool {:?}", allocate_info.descriptor_pool);
            };
            if pool.allocated + count > pool.max_sets {
                return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            }
            pool.allocated += count;
            state.counters.sets_allocated += count;
        }
        Ok((0..count)
            .map(|_| {
                let mut state = self.state.borrow_mut();
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(state.next_handle)
            })
            .collect())
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(pool) = state.pools.get_mut(&pool) else {
            panic!("freeing sets into unknown pool {pool:?}");
        };
        assert!(pool.allocated >= sets.len() as u32);
        pool.allocated -= sets.len() as u32;
        state.counters.sets_freed += sets.len() as u32;
        Ok(())
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let batch = writes
            .iter()
            .map(|w| {
                assert_eq!(w.descriptor_count, 1);
                RecordedWrite {
                    dst_set: w.dst_set,
                    binding: w.dst_binding,
                    descriptor_type: w.descriptor_type,
                    buffer: (!w.p_buffer_info.is_null()).then(|| unsafe { *w.p_buffer_info }),
                    image: (!w.p_image_info.is_null()).then(|| unsafe { *w.p_image_info }),
                }
            })
            .collect();
        let mut state = self.state.borrow_mut();
        state.counters.update_calls += 1;
        state.update_batches.push(batch);
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        assert!(self.is_live(pipeline), "binding a destroyed pipeline");
        let mut state = self.state.borrow_mut();
        state.counters.pipeline_binds += 1;
        state.bound_pipelines.push(pipeline);
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        assert_eq!(first_set, 0);
        assert!(self.is_live(layout), "binding sets with a destroyed pipeline layout");
        let mut state = self.state.borrow_mut();
        state.counters.descriptor_binds += 1;
        state.bound_descriptor_sets.push((layout, sets.to_vec()));
    }

    fn cmd_set_scissor(&self, _command_buffer: vk::CommandBuffer, _scissor: vk::Rect2D) {
        self.state.borrow_mut().counters.scissor_sets += 1;
    }
}
