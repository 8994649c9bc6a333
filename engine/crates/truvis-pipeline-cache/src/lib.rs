//! Vulkan 状态缓存层
//!
//! 位于 renderer 与 Vulkan 之间，把粗粒度的 pipeline 状态和资源绑定状态规约为定长、按字节比较的 key，
//! 再把 key 映射到创建代价很高的 GPU 对象上：
//! - [`pipeline_state_cache::PipelineStateCache`]：`PipelineKey` -> `vk::Pipeline`
//! - [`pipeline_layout_cache::PipelineLayoutCache`]：`PipelineLayoutKey` -> `vk::PipelineLayout` 以及 3 个 set layout
//! - [`descriptor_set_cache::DescriptorSetCache`]：`DescriptorKey` -> 3 个 `vk::DescriptorSet`
//!
//! 所有对象都通过 [`timeline::TimelineTracker`] 打上时间戳，只有确定 GPU 不会再引用时才会回收或销毁。
//! renderer 通常只需要和门面 [`pipeline_cache::PipelineCache`] 打交道。

/// 在热点函数中插入 tracy span，未开启 `tracy` feature 时为空
macro_rules! profile_span {
    ($name:expr) => {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!($name);
    };
}

pub mod commands;
pub mod config;
pub mod constants;
pub mod descriptor_pool;
pub mod descriptor_set_cache;
pub mod error;
pub mod foundation;
pub mod keys;
pub mod pipeline_cache;
pub mod pipeline_layout_cache;
pub mod pipeline_state_cache;
pub mod program;
pub mod query;
pub mod resources;
pub mod timeline;

#[cfg(test)]
pub(crate) mod test_utils;
