use std::mem::offset_of;

use ash::vk;
use ash::vk::Handle;
use bytemuck::{Pod, Zeroable};

use crate::constants::{INPUT_ATTACHMENT_COUNT, SAMPLER_BINDING_COUNT, UBUFFER_BINDING_COUNT, WHOLE_SIZE};
use crate::keys::impl_bytewise_eq_hash;
use crate::keys::usage_flags::PipelineLayoutKey;

/// `vk::DescriptorImageInfo` 的定长版本，`image_layout` 后补齐 4 字节的 padding
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct DescriptorImageInfo {
    pub sampler: u64,
    pub image_view: u64,
    pub image_layout: i32,
    padding: u32,
}
impl DescriptorImageInfo {
    pub fn new(sampler: vk::Sampler, image_view: vk::ImageView, image_layout: vk::ImageLayout) -> Self {
        Self {
            sampler: sampler.as_raw(),
            image_view: image_view.as_raw(),
            image_layout: image_layout.as_raw(),
            padding: 0,
        }
    }

    #[inline]
    pub fn to_vk(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(self.sampler),
            image_view: vk::ImageView::from_raw(self.image_view),
            image_layout: vk::ImageLayout::from_raw(self.image_layout),
        }
    }
}
impl From<&vk::DescriptorImageInfo> for DescriptorImageInfo {
    fn from(info: &vk::DescriptorImageInfo) -> Self {
        Self::new(info.sampler, info.image_view, info.image_layout)
    }
}

static_assertions::const_assert_eq!(size_of::<DescriptorImageInfo>(), 24);

/// 某个 uniform buffer 槽位上的绑定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformBufferBinding {
    pub buffer: vk::Buffer,
    pub offset: u32,
    /// [`WHOLE_SIZE`] 表示从 offset 到 buffer 末尾
    pub size: u32,
}
impl UniformBufferBinding {
    /// 写入 descriptor 时使用的 range
    #[inline]
    pub fn range(&self) -> vk::DeviceSize {
        if self.size == WHOLE_SIZE { vk::WHOLE_SIZE } else { self.size as vk::DeviceSize }
    }
}

/// 唯一确定一组 descriptor set（uniform buffer / sampler / input attachment 各一个）的绑定状态
///
/// 末尾附带 pipeline layout key：set 是按 layout 分配的，不同 layout 即使绑定相同也不能共用 set。
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DescriptorKey {
    uniform_buffers: [u64; UBUFFER_BINDING_COUNT],
    samplers: [DescriptorImageInfo; SAMPLER_BINDING_COUNT],
    input_attachments: [DescriptorImageInfo; INPUT_ATTACHMENT_COUNT],
    uniform_buffer_offsets: [u32; UBUFFER_BINDING_COUNT],
    uniform_buffer_sizes: [u32; UBUFFER_BINDING_COUNT],
    layout: PipelineLayoutKey,
}
impl_bytewise_eq_hash!(DescriptorKey);

static_assertions::const_assert_eq!(offset_of!(DescriptorKey, samplers), 80);
static_assertions::const_assert_eq!(offset_of!(DescriptorKey, input_attachments), 1568);
static_assertions::const_assert_eq!(offset_of!(DescriptorKey, uniform_buffer_offsets), 1592);
static_assertions::const_assert_eq!(offset_of!(DescriptorKey, uniform_buffer_sizes), 1632);
static_assertions::const_assert_eq!(offset_of!(DescriptorKey, layout), 1672);
static_assertions::const_assert_eq!(size_of::<DescriptorKey>(), 1688);

impl Default for DescriptorKey {
    fn default() -> Self {
        Self::zeroed()
    }
}
// setters
impl DescriptorKey {
    pub fn set_uniform_buffer(&mut self, binding: usize, buffer: vk::Buffer, offset: u32, size: u32) {
        debug_assert!(binding < UBUFFER_BINDING_COUNT);
        self.uniform_buffers[binding] = buffer.as_raw();
        self.uniform_buffer_offsets[binding] = offset;
        self.uniform_buffer_sizes[binding] = size;
    }

    pub fn clear_uniform_buffer(&mut self, binding: usize) {
        self.set_uniform_buffer(binding, vk::Buffer::null(), 0, 0);
    }

    #[inline]
    pub fn set_sampler(&mut self, binding: usize, info: DescriptorImageInfo) {
        debug_assert!(binding < SAMPLER_BINDING_COUNT);
        self.samplers[binding] = info;
    }

    #[inline]
    pub fn clear_sampler(&mut self, binding: usize) {
        self.set_sampler(binding, DescriptorImageInfo::default());
    }

    #[inline]
    pub fn set_input_attachment(&mut self, index: usize, info: DescriptorImageInfo) {
        debug_assert!(index < INPUT_ATTACHMENT_COUNT);
        self.input_attachments[index] = info;
    }

    #[inline]
    pub fn set_layout(&mut self, layout: PipelineLayoutKey) {
        self.layout = layout;
    }
}
// getters
impl DescriptorKey {
    /// 槽位未绑定时返回 `None`
    pub fn uniform_buffer(&self, binding: usize) -> Option<UniformBufferBinding> {
        let buffer = self.uniform_buffers[binding];
        (buffer != 0).then(|| UniformBufferBinding {
            buffer: vk::Buffer::from_raw(buffer),
            offset: self.uniform_buffer_offsets[binding],
            size: self.uniform_buffer_sizes[binding],
        })
    }

    /// 没有 sampler 的槽位视为未绑定
    pub fn sampler(&self, binding: usize) -> Option<&DescriptorImageInfo> {
        let info = &self.samplers[binding];
        (info.sampler != 0).then_some(info)
    }

    /// 没有 image view 的槽位视为未绑定
    pub fn input_attachment(&self, index: usize) -> Option<&DescriptorImageInfo> {
        let info = &self.input_attachments[index];
        (info.image_view != 0).then_some(info)
    }

    #[inline]
    pub fn layout(&self) -> PipelineLayoutKey {
        self.layout
    }
}
// invalidation
impl DescriptorKey {
    pub fn references_buffer(&self, buffer: vk::Buffer) -> bool {
        let raw = buffer.as_raw();
        raw != 0 && self.uniform_buffers.contains(&raw)
    }

    pub fn references_image_view(&self, image_view: vk::ImageView) -> bool {
        let raw = image_view.as_raw();
        raw != 0 && self.samplers.iter().chain(&self.input_attachments).any(|info| info.image_view == raw)
    }

    /// 清除所有绑定了 `buffer` 的槽位，返回被清除的 binding
    pub fn unbind_buffer(&mut self, buffer: vk::Buffer) -> Vec<usize> {
        let raw = buffer.as_raw();
        if raw == 0 {
            return Vec::new();
        }
        let bindings: Vec<usize> = (0..UBUFFER_BINDING_COUNT).filter(|&b| self.uniform_buffers[b] == raw).collect();
        for &binding in &bindings {
            self.clear_uniform_buffer(binding);
        }
        bindings
    }

    /// 清除所有引用了 `image_view` 的 sampler 与 input attachment 槽位，返回被清除的 sampler binding
    pub fn unbind_image_view(&mut self, image_view: vk::ImageView) -> Vec<usize> {
        let raw = image_view.as_raw();
        if raw == 0 {
            return Vec::new();
        }
        let bindings: Vec<usize> =
            (0..SAMPLER_BINDING_COUNT).filter(|&b| self.samplers[b].image_view == raw).collect();
        for &binding in &bindings {
            self.clear_sampler(binding);
        }
        for info in self.input_attachments.iter_mut().filter(|info| info.image_view == raw) {
            *info = DescriptorImageInfo::default();
        }
        bindings
    }
}
