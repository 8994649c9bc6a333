use ash::vk;

/// 缓存层的错误
///
/// - 分配类错误（pool、descriptor set、layout 创建失败）可以恢复：renderer 可以跳过这次 draw
/// - pipeline 创建失败、缺少 vertex shader 视为致命错误，不会重试
///
/// 任何一次失败的创建都不会在 cache 中留下半成品
#[derive(Debug, thiserror::Error)]
pub enum PipelineCacheError {
    #[error("failed to create descriptor pool: {0}")]
    DescriptorPoolCreation(vk::Result),

    #[error("failed to allocate descriptor sets: {0}")]
    DescriptorSetAllocation(vk::Result),

    #[error("failed to create descriptor set layout: {0}")]
    DescriptorSetLayoutCreation(vk::Result),

    #[error("failed to create pipeline layout: {0}")]
    PipelineLayoutCreation(vk::Result),

    #[error("failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    #[error("a vertex shader is required to create a graphics pipeline")]
    MissingVertexShader,

    #[error("invalid pipeline cache config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse pipeline cache config")]
    ConfigParse(#[from] serde_json::Error),
}

impl PipelineCacheError {
    /// 致命错误：重试也不会成功，通常意味着 shader 或状态组合本身有问题
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PipelineCreation(_) | Self::MissingVertexShader)
    }

    #[inline]
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::DescriptorPoolCreation(r)
            | Self::DescriptorSetAllocation(r)
            | Self::DescriptorSetLayoutCreation(r)
            | Self::PipelineLayoutCreation(r)
            | Self::PipelineCreation(r) => matches!(
                *r,
                vk::Result::ERROR_OUT_OF_HOST_MEMORY
                    | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                    | vk::Result::ERROR_OUT_OF_POOL_MEMORY
                    | vk::Result::ERROR_FRAGMENTED_POOL
            ),
            _ => false,
        }
    }
}

pub type PipelineCacheResult<T> = Result<T, PipelineCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert!(PipelineCacheError::MissingVertexShader.is_fatal());
        assert!(PipelineCacheError::PipelineCreation(vk::Result::ERROR_UNKNOWN).is_fatal());

        let alloc = PipelineCacheError::DescriptorSetAllocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        assert!(!alloc.is_fatal());
        assert!(alloc.is_out_of_memory());

        let layout = PipelineCacheError::PipelineLayoutCreation(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert!(!layout.is_fatal());
        assert!(!layout.is_out_of_memory());
    }
}
