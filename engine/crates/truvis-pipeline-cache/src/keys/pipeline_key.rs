use std::mem::offset_of;

use ash::vk;
use ash::vk::Handle;
use bytemuck::{Pod, Zeroable};

use crate::constants::{SHADER_MODULE_COUNT, VERTEX_ATTRIBUTE_COUNT};
use crate::keys::impl_bytewise_eq_hash;
use crate::keys::raster_state::RasterState;
use crate::keys::usage_flags::PipelineLayoutKey;

/// 紧凑的顶点属性描述，`format == 0` 表示该槽位未使用
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct VertexInputAttributeDescription {
    pub location: u8,
    pub binding: u8,
    pub format: u16,
    pub offset: u32,
}
impl VertexInputAttributeDescription {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.format != 0
    }

    #[inline]
    pub fn to_vk(&self) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription {
            location: self.location as u32,
            binding: self.binding as u32,
            format: vk::Format::from_raw(self.format as i32),
            offset: self.offset,
        }
    }
}
impl From<&vk::VertexInputAttributeDescription> for VertexInputAttributeDescription {
    fn from(desc: &vk::VertexInputAttributeDescription) -> Self {
        debug_assert!(desc.location <= u8::MAX as u32 && desc.binding <= u8::MAX as u32);
        debug_assert!((0..=u16::MAX as i32).contains(&desc.format.as_raw()));
        Self {
            location: desc.location as u8,
            binding: desc.binding as u8,
            format: desc.format.as_raw() as u16,
            offset: desc.offset,
        }
    }
}

/// 紧凑的顶点 buffer 描述，`stride == 0` 表示该槽位未使用
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct VertexInputBindingDescription {
    pub binding: u16,
    pub input_rate: u16,
    pub stride: u32,
}
impl VertexInputBindingDescription {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.stride != 0
    }

    #[inline]
    pub fn to_vk(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: self.binding as u32,
            stride: self.stride,
            input_rate: vk::VertexInputRate::from_raw(self.input_rate as i32),
        }
    }
}
impl From<&vk::VertexInputBindingDescription> for VertexInputBindingDescription {
    fn from(desc: &vk::VertexInputBindingDescription) -> Self {
        debug_assert!(desc.binding <= u16::MAX as u32);
        Self {
            binding: desc.binding as u16,
            input_rate: desc.input_rate.as_raw() as u16,
            stride: desc.stride,
        }
    }
}

/// 唯一确定一个 graphics pipeline 的所有状态
///
/// 320 字节，不含隐式 padding。shader module 只按句柄比较，不比较内容。
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PipelineKey {
    shaders: [u64; SHADER_MODULE_COUNT],
    render_pass: u64,
    topology: u16,
    subpass_index: u16,
    vertex_attributes: [VertexInputAttributeDescription; VERTEX_ATTRIBUTE_COUNT],
    vertex_buffers: [VertexInputBindingDescription; VERTEX_ATTRIBUTE_COUNT],
    raster_state: RasterState,
    padding: u32,
    layout: PipelineLayoutKey,
}
impl_bytewise_eq_hash!(PipelineKey);

static_assertions::const_assert_eq!(size_of::<PipelineKey>(), 320);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, render_pass), 16);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, topology), 24);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, vertex_attributes), 28);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, vertex_buffers), 156);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, raster_state), 284);
static_assertions::const_assert_eq!(offset_of!(PipelineKey, layout), 304);

impl Default for PipelineKey {
    fn default() -> Self {
        Self::zeroed()
    }
}
// setters
impl PipelineKey {
    #[inline]
    pub fn set_shaders(&mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) {
        self.shaders = [vertex.as_raw(), fragment.as_raw()];
    }

    #[inline]
    pub fn set_render_pass(&mut self, render_pass: vk::RenderPass, subpass_index: u32) {
        debug_assert!(subpass_index <= u16::MAX as u32);
        self.render_pass = render_pass.as_raw();
        self.subpass_index = subpass_index as u16;
    }

    #[inline]
    pub fn set_topology(&mut self, topology: vk::PrimitiveTopology) {
        self.topology = topology.as_raw() as u16;
    }

    #[inline]
    pub fn set_raster_state(&mut self, raster_state: RasterState) {
        self.raster_state = raster_state;
    }

    #[inline]
    pub fn set_layout(&mut self, layout: PipelineLayoutKey) {
        self.layout = layout;
    }

    /// 未提供的槽位会被清零，保证相同的顶点布局产生相同的字节
    pub fn set_vertex_input(
        &mut self,
        attributes: &[vk::VertexInputAttributeDescription],
        buffers: &[vk::VertexInputBindingDescription],
    ) {
        debug_assert!(attributes.len() <= VERTEX_ATTRIBUTE_COUNT);
        debug_assert!(buffers.len() <= VERTEX_ATTRIBUTE_COUNT);

        self.vertex_attributes = Zeroable::zeroed();
        self.vertex_buffers = Zeroable::zeroed();
        for (dst, src) in self.vertex_attributes.iter_mut().zip(attributes) {
            *dst = src.into();
        }
        for (dst, src) in self.vertex_buffers.iter_mut().zip(buffers) {
            *dst = src.into();
        }
    }
}
// getters
impl PipelineKey {
    #[inline]
    pub fn vertex_shader(&self) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(self.shaders[0])
    }

    #[inline]
    pub fn fragment_shader(&self) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(self.shaders[1])
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::from_raw(self.render_pass)
    }

    #[inline]
    pub fn subpass_index(&self) -> u32 {
        self.subpass_index as u32
    }

    #[inline]
    pub fn topology(&self) -> vk::PrimitiveTopology {
        vk::PrimitiveTopology::from_raw(self.topology as i32)
    }

    #[inline]
    pub fn raster_state(&self) -> &RasterState {
        &self.raster_state
    }

    #[inline]
    pub fn layout(&self) -> PipelineLayoutKey {
        self.layout
    }

    /// 跳过未使用的槽位
    pub fn active_vertex_attributes(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.vertex_attributes.iter().filter(|a| a.is_active()).map(|a| a.to_vk()).collect()
    }

    /// 跳过未使用的槽位
    pub fn active_vertex_buffers(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.vertex_buffers.iter().filter(|b| b.is_active()).map(|b| b.to_vk()).collect()
    }
}
