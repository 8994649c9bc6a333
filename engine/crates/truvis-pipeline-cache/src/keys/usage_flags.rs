use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::constants::SAMPLER_BINDING_COUNT;

/// sampler 在各个 shader stage 中的可见性
///
/// 对于 sampler binding `b`：
/// - 第 `b` 位表示 vertex stage 可见
/// - 第 `SAMPLER_BINDING_COUNT + b` 位表示 fragment stage 可见
///
/// uniform buffer 总是对 vertex | fragment 可见，input attachment 总是对 fragment 可见，不占用位。
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct UsageFlags {
    words: [u64; 2],
}

/// pipeline layout 只由 sampler 的可见性决定
pub type PipelineLayoutKey = UsageFlags;

static_assertions::const_assert!(UsageFlags::BIT_COUNT >= 2 * SAMPLER_BINDING_COUNT);
static_assertions::const_assert_eq!(size_of::<UsageFlags>(), 16);

// new & init
impl UsageFlags {
    pub const BIT_COUNT: usize = 128;

    #[inline]
    pub const fn empty() -> Self {
        Self { words: [0; 2] }
    }
}
// bits
impl UsageFlags {
    #[inline]
    pub fn set(&mut self, bit: usize) {
        debug_assert!(bit < Self::BIT_COUNT);
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    #[inline]
    pub fn unset(&mut self, bit: usize) {
        debug_assert!(bit < Self::BIT_COUNT);
        self.words[bit / 64] &= !(1 << (bit % 64));
    }

    #[inline]
    pub fn test(&self, bit: usize) -> bool {
        debug_assert!(bit < Self::BIT_COUNT);
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words == [0; 2]
    }
}
// sampler
impl UsageFlags {
    /// 在 `binding` 上标记 sampler 在 `stages` 中可见，只关心 vertex 和 fragment
    pub fn with_sampler(mut self, binding: usize, stages: vk::ShaderStageFlags) -> Self {
        debug_assert!(binding < SAMPLER_BINDING_COUNT);
        if stages.contains(vk::ShaderStageFlags::VERTEX) {
            self.set(binding);
        }
        if stages.contains(vk::ShaderStageFlags::FRAGMENT) {
            self.set(SAMPLER_BINDING_COUNT + binding);
        }
        self
    }

    /// 清除 `binding` 上所有 stage 的可见性
    pub fn without_sampler(mut self, binding: usize) -> Self {
        debug_assert!(binding < SAMPLER_BINDING_COUNT);
        self.unset(binding);
        self.unset(SAMPLER_BINDING_COUNT + binding);
        self
    }

    /// `with_sampler` 的逆运算
    pub fn sampler_stages(&self, binding: usize) -> vk::ShaderStageFlags {
        let mut stages = vk::ShaderStageFlags::empty();
        if self.test(binding) {
            stages |= vk::ShaderStageFlags::VERTEX;
        }
        if self.test(SAMPLER_BINDING_COUNT + binding) {
            stages |= vk::ShaderStageFlags::FRAGMENT;
        }
        stages
    }

    #[inline]
    pub fn is_sampler_active(&self, binding: usize) -> bool {
        !self.sampler_stages(binding).is_empty()
    }

    /// 所有活跃的 sampler binding 以及对应的 stage
    pub fn active_samplers(&self) -> impl Iterator<Item = (usize, vk::ShaderStageFlags)> + '_ {
        (0..SAMPLER_BINDING_COUNT)
            .map(|binding| (binding, self.sampler_stages(binding)))
            .filter(|(_, stages)| !stages.is_empty())
    }
}
