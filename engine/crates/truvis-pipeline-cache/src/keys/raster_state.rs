use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::constants::MAX_COLOR_TARGET_COUNT;
use crate::keys::impl_bytewise_eq_hash;

/// packed `u32` 中的一段位域
#[derive(Clone, Copy)]
struct BitField {
    offset: u32,
    width: u32,
}
impl BitField {
    const fn new(offset: u32, width: u32) -> Self {
        Self { offset, width }
    }

    #[inline]
    const fn mask(self) -> u32 {
        (1 << self.width) - 1
    }

    #[inline]
    fn get(self, word: u32) -> u32 {
        (word >> self.offset) & self.mask()
    }

    #[inline]
    fn set(self, word: &mut u32, value: u32) {
        debug_assert!(value <= self.mask(), "value {value} does not fit in {} bits", self.width);
        *word = (*word & !(self.mask() << self.offset)) | ((value & self.mask()) << self.offset);
    }
}

// bits 字段的布局，总共 32 位
const CULL_MODE: BitField = BitField::new(0, 2);
const FRONT_FACE: BitField = BitField::new(2, 2);
const DEPTH_BIAS_ENABLE: BitField = BitField::new(4, 1);
const BLEND_ENABLE: BitField = BitField::new(5, 1);
const DEPTH_WRITE_ENABLE: BitField = BitField::new(6, 1);
const ALPHA_TO_COVERAGE: BitField = BitField::new(7, 1);
const SRC_COLOR_BLEND_FACTOR: BitField = BitField::new(8, 5);
const DST_COLOR_BLEND_FACTOR: BitField = BitField::new(13, 5);
const SRC_ALPHA_BLEND_FACTOR: BitField = BitField::new(18, 5);
const DST_ALPHA_BLEND_FACTOR: BitField = BitField::new(23, 5);
const COLOR_WRITE_MASK: BitField = BitField::new(28, 4);

const COLOR_COMPONENT_ALL: vk::ColorComponentFlags = vk::ColorComponentFlags::from_raw(
    vk::ColorComponentFlags::R.as_raw()
        | vk::ColorComponentFlags::G.as_raw()
        | vk::ColorComponentFlags::B.as_raw()
        | vk::ColorComponentFlags::A.as_raw(),
);

// blend_ops 字段的布局
const COLOR_BLEND_OP: BitField = BitField::new(0, 4);
const ALPHA_BLEND_OP: BitField = BitField::new(4, 4);

/// 光栅化、深度与混合状态
///
/// 16 字节，作为 `PipelineKey` 的一部分参与按字节比较。所有枚举值都以 Vulkan 的原始数值存储，
/// 超出位宽的值在 debug 下会触发断言。
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct RasterState {
    bits: u32,
    rasterization_samples: u8,
    color_target_count: u8,
    blend_ops: u8,
    depth_compare_op: u8,
    depth_bias_constant_factor: f32,
    depth_bias_slope_factor: f32,
}
impl_bytewise_eq_hash!(RasterState);

static_assertions::const_assert_eq!(size_of::<RasterState>(), 16);

impl Default for RasterState {
    /// 背面剔除、逆时针为正面、深度写入、LESS 比较、不混合、写入全部颜色分量
    fn default() -> Self {
        Self::zeroed()
            .with_cull_mode(vk::CullModeFlags::BACK)
            .with_front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .with_depth_write(true)
            .with_depth_compare_op(vk::CompareOp::LESS)
            .with_blend_factors(
                vk::BlendFactor::ONE,
                vk::BlendFactor::ZERO,
                vk::BlendFactor::ONE,
                vk::BlendFactor::ZERO,
            )
            .with_blend_ops(vk::BlendOp::ADD, vk::BlendOp::ADD)
            .with_color_write_mask(COLOR_COMPONENT_ALL)
            .with_rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .with_color_target_count(1)
    }
}
// builder
impl RasterState {
    #[inline]
    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        CULL_MODE.set(&mut self.bits, cull_mode.as_raw());
        self
    }

    #[inline]
    pub fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        FRONT_FACE.set(&mut self.bits, front_face.as_raw() as u32);
        self
    }

    #[inline]
    pub fn with_depth_bias(mut self, constant_factor: f32, slope_factor: f32) -> Self {
        DEPTH_BIAS_ENABLE.set(&mut self.bits, 1);
        self.depth_bias_constant_factor = constant_factor;
        self.depth_bias_slope_factor = slope_factor;
        self
    }

    #[inline]
    pub fn without_depth_bias(mut self) -> Self {
        DEPTH_BIAS_ENABLE.set(&mut self.bits, 0);
        self.depth_bias_constant_factor = 0.0;
        self.depth_bias_slope_factor = 0.0;
        self
    }

    #[inline]
    pub fn with_blend(mut self, enable: bool) -> Self {
        BLEND_ENABLE.set(&mut self.bits, enable as u32);
        self
    }

    #[inline]
    pub fn with_depth_write(mut self, enable: bool) -> Self {
        DEPTH_WRITE_ENABLE.set(&mut self.bits, enable as u32);
        self
    }

    #[inline]
    pub fn with_alpha_to_coverage(mut self, enable: bool) -> Self {
        ALPHA_TO_COVERAGE.set(&mut self.bits, enable as u32);
        self
    }

    pub fn with_blend_factors(
        mut self,
        src_color: vk::BlendFactor,
        dst_color: vk::BlendFactor,
        src_alpha: vk::BlendFactor,
        dst_alpha: vk::BlendFactor,
    ) -> Self {
        SRC_COLOR_BLEND_FACTOR.set(&mut self.bits, src_color.as_raw() as u32);
        DST_COLOR_BLEND_FACTOR.set(&mut self.bits, dst_color.as_raw() as u32);
        SRC_ALPHA_BLEND_FACTOR.set(&mut self.bits, src_alpha.as_raw() as u32);
        DST_ALPHA_BLEND_FACTOR.set(&mut self.bits, dst_alpha.as_raw() as u32);
        self
    }

    pub fn with_blend_ops(mut self, color_op: vk::BlendOp, alpha_op: vk::BlendOp) -> Self {
        let mut ops = self.blend_ops as u32;
        COLOR_BLEND_OP.set(&mut ops, color_op.as_raw() as u32);
        ALPHA_BLEND_OP.set(&mut ops, alpha_op.as_raw() as u32);
        self.blend_ops = ops as u8;
        self
    }

    #[inline]
    pub fn with_color_write_mask(mut self, mask: vk::ColorComponentFlags) -> Self {
        COLOR_WRITE_MASK.set(&mut self.bits, mask.as_raw());
        self
    }

    #[inline]
    pub fn with_rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        debug_assert!(samples.as_raw() <= u8::MAX as u32);
        self.rasterization_samples = samples.as_raw() as u8;
        self
    }

    #[inline]
    pub fn with_color_target_count(mut self, count: usize) -> Self {
        debug_assert!(count <= MAX_COLOR_TARGET_COUNT);
        self.color_target_count = count as u8;
        self
    }

    #[inline]
    pub fn with_depth_compare_op(mut self, op: vk::CompareOp) -> Self {
        debug_assert!((0..=u8::MAX as i32).contains(&op.as_raw()));
        self.depth_compare_op = op.as_raw() as u8;
        self
    }
}
// getters
impl RasterState {
    #[inline]
    pub fn cull_mode(&self) -> vk::CullModeFlags {
        vk::CullModeFlags::from_raw(CULL_MODE.get(self.bits))
    }

    #[inline]
    pub fn front_face(&self) -> vk::FrontFace {
        vk::FrontFace::from_raw(FRONT_FACE.get(self.bits) as i32)
    }

    #[inline]
    pub fn depth_bias_enable(&self) -> bool {
        DEPTH_BIAS_ENABLE.get(self.bits) != 0
    }

    #[inline]
    pub fn depth_bias_constant_factor(&self) -> f32 {
        self.depth_bias_constant_factor
    }

    #[inline]
    pub fn depth_bias_slope_factor(&self) -> f32 {
        self.depth_bias_slope_factor
    }

    #[inline]
    pub fn blend_enable(&self) -> bool {
        BLEND_ENABLE.get(self.bits) != 0
    }

    #[inline]
    pub fn depth_write_enable(&self) -> bool {
        DEPTH_WRITE_ENABLE.get(self.bits) != 0
    }

    #[inline]
    pub fn alpha_to_coverage(&self) -> bool {
        ALPHA_TO_COVERAGE.get(self.bits) != 0
    }

    #[inline]
    pub fn src_color_blend_factor(&self) -> vk::BlendFactor {
        vk::BlendFactor::from_raw(SRC_COLOR_BLEND_FACTOR.get(self.bits) as i32)
    }

    #[inline]
    pub fn dst_color_blend_factor(&self) -> vk::BlendFactor {
        vk::BlendFactor::from_raw(DST_COLOR_BLEND_FACTOR.get(self.bits) as i32)
    }

    #[inline]
    pub fn src_alpha_blend_factor(&self) -> vk::BlendFactor {
        vk::BlendFactor::from_raw(SRC_ALPHA_BLEND_FACTOR.get(self.bits) as i32)
    }

    #[inline]
    pub fn dst_alpha_blend_factor(&self) -> vk::BlendFactor {
        vk::BlendFactor::from_raw(DST_ALPHA_BLEND_FACTOR.get(self.bits) as i32)
    }

    #[inline]
    pub fn color_blend_op(&self) -> vk::BlendOp {
        vk::BlendOp::from_raw(COLOR_BLEND_OP.get(self.blend_ops as u32) as i32)
    }

    #[inline]
    pub fn alpha_blend_op(&self) -> vk::BlendOp {
        vk::BlendOp::from_raw(ALPHA_BLEND_OP.get(self.blend_ops as u32) as i32)
    }

    #[inline]
    pub fn color_write_mask(&self) -> vk::ColorComponentFlags {
        vk::ColorComponentFlags::from_raw(COLOR_WRITE_MASK.get(self.bits))
    }

    #[inline]
    pub fn rasterization_samples(&self) -> vk::SampleCountFlags {
        vk::SampleCountFlags::from_raw(self.rasterization_samples as u32)
    }

    #[inline]
    pub fn color_target_count(&self) -> usize {
        self.color_target_count as usize
    }

    #[inline]
    pub fn depth_compare_op(&self) -> vk::CompareOp {
        vk::CompareOp::from_raw(self.depth_compare_op as i32)
    }
}
// tools
impl RasterState {
    /// 每个颜色附件使用相同的混合状态
    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable())
            .src_color_blend_factor(self.src_color_blend_factor())
            .dst_color_blend_factor(self.dst_color_blend_factor())
            .color_blend_op(self.color_blend_op())
            .src_alpha_blend_factor(self.src_alpha_blend_factor())
            .dst_alpha_blend_factor(self.dst_alpha_blend_factor())
            .alpha_blend_op(self.alpha_blend_op())
            .color_write_mask(self.color_write_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_do_not_overlap() {
        let state = RasterState::default()
            .with_cull_mode(vk::CullModeFlags::FRONT_AND_BACK)
            .with_front_face(vk::FrontFace::CLOCKWISE)
            .with_blend(true)
            .with_alpha_to_coverage(true)
            .with_depth_write(false)
            .with_blend_factors(
                vk::BlendFactor::SRC_ALPHA,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                vk::BlendFactor::ONE,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            )
            .with_blend_ops(vk::BlendOp::SUBTRACT, vk::BlendOp::MAX)
            .with_color_write_mask(vk::ColorComponentFlags::R | vk::ColorComponentFlags::A)
            .with_depth_compare_op(vk::CompareOp::GREATER_OR_EQUAL)
            .with_rasterization_samples(vk::SampleCountFlags::TYPE_4)
            .with_color_target_count(3);

        assert_eq!(state.cull_mode(), vk::CullModeFlags::FRONT_AND_BACK);
        assert_eq!(state.front_face(), vk::FrontFace::CLOCKWISE);
        assert!(state.blend_enable());
        assert!(state.alpha_to_coverage());
        assert!(!state.depth_write_enable());
        assert!(!state.depth_bias_enable());
        assert_eq!(state.src_color_blend_factor(), vk::BlendFactor::SRC_ALPHA);
        assert_eq!(state.dst_color_blend_factor(), vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(state.src_alpha_blend_factor(), vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor(), vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(state.color_blend_op(), vk::BlendOp::SUBTRACT);
        assert_eq!(state.alpha_blend_op(), vk::BlendOp::MAX);
        assert_eq!(state.color_write_mask(), vk::ColorComponentFlags::R | vk::ColorComponentFlags::A);
        assert_eq!(state.depth_compare_op(), vk::CompareOp::GREATER_OR_EQUAL);
        assert_eq!(state.rasterization_samples(), vk::SampleCountFlags::TYPE_4);
        assert_eq!(state.color_target_count(), 3);
    }

    #[test]
    fn test_depth_bias_participates_in_equality() {
        let a = RasterState::default().with_depth_bias(1.0, 2.0);
        let b = RasterState::default().with_depth_bias(1.0, 2.5);
        assert_ne!(a, b);
        assert_eq!(a.without_depth_bias(), RasterState::default());
    }

    #[test]
    fn test_default_blend_attachment() {
        let attachment = RasterState::default().color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, COLOR_COMPONENT_ALL);
        assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(attachment.dst_color_blend_factor, vk::BlendFactor::ZERO);
    }
}
