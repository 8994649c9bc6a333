//! 缓存层使用的绑定数量上限
//!
//! 这些数量直接决定了 key 的内存布局，修改任何一个都会改变 key 的大小。

/// 每个 pipeline 可以绑定的 uniform buffer 数量
pub const UBUFFER_BINDING_COUNT: usize = 10;

/// 每个 pipeline 可以绑定的 combined image sampler 数量
pub const SAMPLER_BINDING_COUNT: usize = 62;

/// 每个 pipeline 可以绑定的 input attachment 数量
pub const INPUT_ATTACHMENT_COUNT: usize = 1;

/// vertex + fragment
pub const SHADER_MODULE_COUNT: usize = 2;

pub const VERTEX_ATTRIBUTE_COUNT: usize = 16;

/// 颜色附件数量上限（MRT）
pub const MAX_COLOR_TARGET_COUNT: usize = 8;

/// uniform buffer / sampler / input attachment 各占一个 descriptor set
pub const DESCRIPTOR_TYPE_COUNT: usize = 3;

/// descriptor pool 初始容量，单位是 bundle（一个 bundle 包含 [`DESCRIPTOR_TYPE_COUNT`] 个 set）
pub const INITIAL_DESCRIPTOR_SET_POOL_SIZE: u32 = 512;

/// 一个对象在多少次 command buffer 提交之后没有被使用，才允许回收
pub const MAX_PIPELINE_AGE: u64 = 10;

/// key 中 uniform buffer size 的哨兵值，写入 descriptor 时转换为 `vk::WHOLE_SIZE`
pub const WHOLE_SIZE: u32 = u32::MAX;

/// descriptor set 的编号
pub const UBUFFER_SET_INDEX: usize = 0;
pub const SAMPLER_SET_INDEX: usize = 1;
pub const INPUT_ATTACHMENT_SET_INDEX: usize = 2;
