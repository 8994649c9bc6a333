use std::rc::Rc;

use ahash::AHashMap;
use ash::vk;
use itertools::Itertools;

use crate::commands::command_stream::GfxCommandStream;
use crate::error::{PipelineCacheError, PipelineCacheResult};
use crate::foundation::device::DeviceFunctions;
use crate::keys::pipeline_key::PipelineKey;
use crate::keys::raster_state::RasterState;
use crate::keys::usage_flags::PipelineLayoutKey;
use crate::pipeline_layout_cache::PipelineLayoutCache;
use crate::program::{GfxProgram, ShaderStage, SpecializationConstants};
use crate::timeline::{Timestamp, TimelineTracker};

pub struct PipelineCacheEntry {
    handle: vk::Pipeline,
    last_used: Timestamp,
}
// getters
impl PipelineCacheEntry {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn last_used(&self) -> Timestamp {
        self.last_used
    }
}

/// `PipelineKey` -> graphics pipeline
///
/// viewport 与 scissor 是 dynamic state，不属于 key。
pub struct PipelineStateCache {
    device: Rc<dyn DeviceFunctions>,
    pipelines: AHashMap<PipelineKey, PipelineCacheEntry>,

    requirements: PipelineKey,
    /// 跟随 program 设置；specialization 不进入 key，使用相同 shader module 的 program 必须使用相同的常量
    specialization: Option<Rc<SpecializationConstants>>,

    /// 当前 command buffer 中最后一次绑定的 key
    bound: Option<PipelineKey>,
}
// new & init
impl PipelineStateCache {
    pub fn new(device: Rc<dyn DeviceFunctions>) -> Self {
        let mut requirements = PipelineKey::default();
        requirements.set_topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        requirements.set_raster_state(RasterState::default());
        Self {
            device,
            pipelines: AHashMap::new(),
            requirements,
            specialization: None,
            bound: None,
        }
    }
}
// requirements
impl PipelineStateCache {
    /// shader 与 sampler 的可见性都来自 program
    pub fn set_program(&mut self, program: &GfxProgram) {
        self.requirements.set_shaders(program.vertex_shader(), program.fragment_shader());
        self.requirements.set_layout(program.usage());
        self.specialization = program.specialization().cloned();
    }

    #[inline]
    pub fn set_layout(&mut self, layout: PipelineLayoutKey) {
        self.requirements.set_layout(layout);
    }

    #[inline]
    pub fn set_raster_state(&mut self, raster_state: RasterState) {
        self.requirements.set_raster_state(raster_state);
    }

    #[inline]
    pub fn set_render_pass(&mut self, render_pass: vk::RenderPass, subpass_index: u32) {
        self.requirements.set_render_pass(render_pass, subpass_index);
    }

    #[inline]
    pub fn set_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.requirements.set_topology(topology);
    }

    #[inline]
    pub fn set_vertex_input(
        &mut self,
        attributes: &[vk::VertexInputAttributeDescription],
        buffers: &[vk::VertexInputBindingDescription],
    ) {
        self.requirements.set_vertex_input(attributes, buffers);
    }
}
// bind
impl PipelineStateCache {
    /// 确保与当前需求一致的 pipeline 存在并绑定到 `cmd`
    ///
    /// 创建失败是致命错误，不会插入任何条目
    pub fn bind_pipeline(
        &mut self,
        cmd: &GfxCommandStream,
        layouts: &mut PipelineLayoutCache,
        timeline: &TimelineTracker,
    ) -> PipelineCacheResult<()> {
        profile_span!("PipelineStateCache::bind_pipeline");

        let now = timeline.now();
        if self.bound.as_ref() == Some(&self.requirements) {
            if let Some(entry) = self.pipelines.get_mut(&self.requirements) {
                entry.last_used = now;
                return Ok(());
            }
        }

        let key = self.requirements;
        let handle = match self.pipelines.get_mut(&key) {
            Some(entry) => {
                entry.last_used = now;
                entry.handle
            }
            None => {
                let layout = layouts.get_or_create(key.layout(), now)?.handle();
                let handle = self.create_pipeline(&key, layout)?;
                self.pipelines.insert(
                    key,
                    PipelineCacheEntry {
                        handle,
                        last_used: now,
                    },
                );
                handle
            }
        };

        self.device.cmd_bind_pipeline(cmd.vk_handle(), handle);
        self.bound = Some(key);
        Ok(())
    }

    fn create_pipeline(&self, key: &PipelineKey, layout: vk::PipelineLayout) -> PipelineCacheResult<vk::Pipeline> {
        profile_span!("PipelineStateCache::create_pipeline");

        if key.vertex_shader() == vk::ShaderModule::null() {
            log::error!("cannot create a graphics pipeline without a vertex shader");
            return Err(PipelineCacheError::MissingVertexShader);
        }
        // 没有 fragment shader 时（例如 depth only pass）只有一个 stage，也不输出颜色
        let has_fragment = key.fragment_shader() != vk::ShaderModule::null();

        let specialization_info = self.specialization.as_deref().map(SpecializationConstants::vk_info);
        let shader_stages = [
            (ShaderStage::Vertex, key.vertex_shader()),
            (ShaderStage::Fragment, key.fragment_shader()),
        ]
        .into_iter()
        .filter(|(_, module)| *module != vk::ShaderModule::null())
        .map(|(stage, module)| {
            let info = vk::PipelineShaderStageCreateInfo::default()
                .stage(stage.vk_stage())
                .module(module)
                .name(c"main");
            match &specialization_info {
                Some(specialization) => info.specialization_info(specialization),
                None => info,
            }
        })
        .collect_vec();

        // 顶点输入只包含 key 中非空的槽位
        let vertex_attributes = key.active_vertex_attributes();
        let vertex_buffers = key.active_vertex_buffers();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_buffers)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(key.topology())
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let raster = key.raster_state();
        let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(raster.cull_mode())
            .front_face(raster.front_face())
            .depth_bias_enable(raster.depth_bias_enable())
            .depth_bias_constant_factor(raster.depth_bias_constant_factor())
            .depth_bias_slope_factor(raster.depth_bias_slope_factor())
            .depth_bias_clamp(0.0);

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(raster.rasterization_samples())
            .sample_shading_enable(false)
            .alpha_to_coverage_enable(raster.alpha_to_coverage());

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(raster.depth_write_enable())
            .depth_compare_op(raster.depth_compare_op())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // 混合设置：需要为每个 color attachment 分别指定
        let color_target_count = if has_fragment { raster.color_target_count() } else { 0 };
        let blend_attachments = vec![raster.color_blend_attachment(); color_target_count];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments)
            .blend_constants([0.0; 4]);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_info)
            .multisample_state(&msaa_info)
            .depth_stencil_state(&depth_stencil_info)
            .color_blend_state(&color_blend_info)
            .dynamic_state(&dynamic_state_info)
            .layout(layout)
            .render_pass(key.render_pass())
            .subpass(key.subpass_index());

        let pipeline = self.device.create_graphics_pipeline(&create_info).map_err(|e| {
            log::error!("failed to create graphics pipeline ({} stages, layout {layout:?}): {e}", shader_stages.len());
            PipelineCacheError::PipelineCreation(e)
        })?;
        log::debug!(
            "created pipeline {pipeline:?}: {} stages, {} vertex attributes, {} color targets",
            shader_stages.len(),
            vertex_attributes.len(),
            color_target_count
        );
        Ok(pipeline)
    }
}
// reclaim & destroy
impl PipelineStateCache {
    /// 进入新的 command buffer 之后调用，销毁过期的 pipeline
    pub fn sweep(&mut self, timeline: &TimelineTracker) -> usize {
        profile_span!("PipelineStateCache::sweep");

        self.bound = None;
        let before = self.pipelines.len();
        let device = self.device.as_ref();
        self.pipelines.retain(|_, entry| {
            if timeline.is_expired(entry.last_used) {
                device.destroy_pipeline(entry.handle);
                false
            } else {
                true
            }
        });
        before - self.pipelines.len()
    }

    pub fn destroy(&mut self) {
        self.bound = None;
        for (_, entry) in self.pipelines.drain() {
            self.device.destroy_pipeline(entry.handle);
        }
    }
}
// getters
impl PipelineStateCache {
    #[inline]
    pub fn requirements(&self) -> &PipelineKey {
        &self.requirements
    }

    #[inline]
    pub fn bound(&self) -> Option<&PipelineKey> {
        self.bound.as_ref()
    }

    #[inline]
    pub fn get(&self, key: &PipelineKey) -> Option<&PipelineCacheEntry> {
        self.pipelines.get(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
