use std::rc::Rc;

use ash::vk;

use crate::constants::{SAMPLER_BINDING_COUNT, SHADER_MODULE_COUNT};
use crate::keys::usage_flags::UsageFlags;

/// program 中 shader module 的槽位
///
/// 目前只有 vertex 与 fragment，compute 预留在后面
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex = 0,
    Fragment = 1,
}
impl ShaderStage {
    #[inline]
    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpecializationConstantValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// specialization constants，每个常量占 4 字节（bool 按 `VkBool32` 存储）
#[derive(Debug, Default)]
pub struct SpecializationConstants {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}
impl SpecializationConstants {
    pub fn new(constants: &[(u32, SpecializationConstantValue)]) -> Self {
        let mut entries = Vec::with_capacity(constants.len());
        let mut data = Vec::with_capacity(constants.len() * 4);
        for &(constant_id, value) in constants {
            entries.push(vk::SpecializationMapEntry {
                constant_id,
                offset: data.len() as u32,
                size: 4,
            });
            let bytes = match value {
                SpecializationConstantValue::Bool(b) => (if b { vk::TRUE } else { vk::FALSE }).to_ne_bytes(),
                SpecializationConstantValue::Int(i) => i.to_ne_bytes(),
                SpecializationConstantValue::Float(f) => f.to_ne_bytes(),
            };
            data.extend_from_slice(&bytes);
        }
        Self { entries, data }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn entries(&self) -> &[vk::SpecializationMapEntry] {
        &self.entries
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 返回的结构体借用 self 中的数组
    pub fn vk_info(&self) -> vk::SpecializationInfo<'_> {
        vk::SpecializationInfo::default().map_entries(&self.entries).data(&self.data)
    }
}

/// sampler binding 在 program 中的来源
#[derive(Clone, Copy, Debug)]
pub struct SamplerBinding {
    pub group: u8,
    pub index: u8,
    pub stages: vk::ShaderStageFlags,
}

/// 一组 shader module 以及它们对 sampler 的使用情况
///
/// shader module 由外部创建和销毁，缓存层只按句柄比较。
pub struct GfxProgram {
    shaders: [vk::ShaderModule; SHADER_MODULE_COUNT],
    usage: UsageFlags,
    /// 高 8 位是 sampler group 的编号，低 8 位是 group 内的序号
    binding_to_sampler_index: Vec<u16>,
    specialization: Option<Rc<SpecializationConstants>>,

    #[cfg(debug_assertions)]
    name: String,
}
// new & init
impl GfxProgram {
    /// `sampler_bindings` 的下标就是 sampler 的 binding
    pub fn new(
        vertex: vk::ShaderModule,
        fragment: vk::ShaderModule,
        sampler_bindings: &[SamplerBinding],
        debug_name: &str,
    ) -> Self {
        debug_assert!(sampler_bindings.len() <= SAMPLER_BINDING_COUNT);
        #[cfg(not(debug_assertions))]
        let _ = debug_name;

        let mut usage = UsageFlags::empty();
        let mut binding_to_sampler_index = Vec::with_capacity(sampler_bindings.len());
        for (binding, sampler) in sampler_bindings.iter().enumerate() {
            binding_to_sampler_index.push(((sampler.group as u16) << 8) | sampler.index as u16);
            usage = usage.with_sampler(binding, sampler.stages);
        }

        Self {
            shaders: [vertex, fragment],
            usage,
            binding_to_sampler_index,
            specialization: None,
            #[cfg(debug_assertions)]
            name: debug_name.to_string(),
        }
    }

    pub fn with_specialization(mut self, constants: &[(u32, SpecializationConstantValue)]) -> Self {
        self.specialization = (!constants.is_empty()).then(|| Rc::new(SpecializationConstants::new(constants)));
        self
    }
}
// getters
impl GfxProgram {
    #[inline]
    pub fn shader(&self, stage: ShaderStage) -> vk::ShaderModule {
        self.shaders[stage as usize]
    }

    #[inline]
    pub fn vertex_shader(&self) -> vk::ShaderModule {
        self.shader(ShaderStage::Vertex)
    }

    #[inline]
    pub fn fragment_shader(&self) -> vk::ShaderModule {
        self.shader(ShaderStage::Fragment)
    }

    #[inline]
    pub fn usage(&self) -> UsageFlags {
        self.usage
    }

    #[inline]
    pub fn binding_to_sampler_index(&self) -> &[u16] {
        &self.binding_to_sampler_index
    }

    #[inline]
    pub fn specialization(&self) -> Option<&Rc<SpecializationConstants>> {
        self.specialization.as_ref()
    }

    #[cfg(debug_assertions)]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_usage_and_sampler_index() {
        let program = GfxProgram::new(
            vk::ShaderModule::from_raw(1),
            vk::ShaderModule::from_raw(2),
            &[
                SamplerBinding {
                    group: 0,
                    index: 0,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                },
                SamplerBinding {
                    group: 2,
                    index: 5,
                    stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                },
            ],
            "lit",
        );

        assert_eq!(program.binding_to_sampler_index(), &[0x0000, 0x0205]);
        assert_eq!(program.usage().sampler_stages(0), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(
            program.usage().sampler_stages(1),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(program.shader(ShaderStage::Fragment), vk::ShaderModule::from_raw(2));
        assert!(program.specialization().is_none());
    }

    #[test]
    fn test_specialization_layout() {
        let constants = SpecializationConstants::new(&[
            (0, SpecializationConstantValue::Bool(true)),
            (3, SpecializationConstantValue::Int(-2)),
            (7, SpecializationConstantValue::Float(0.5)),
        ]);

        let offsets: Vec<_> = constants.entries().iter().map(|e| (e.constant_id, e.offset, e.size)).collect();
        assert_eq!(offsets, vec![(0, 0, 4), (3, 4, 4), (7, 8, 4)]);
        assert_eq!(&constants.data()[0..4], &vk::TRUE.to_ne_bytes());
        assert_eq!(&constants.data()[4..8], &(-2_i32).to_ne_bytes());
        assert_eq!(&constants.data()[8..12], &0.5_f32.to_ne_bytes());

        let info = constants.vk_info();
        assert_eq!(info.map_entry_count, 3);
        assert_eq!(info.data_size, 12);
    }
}
