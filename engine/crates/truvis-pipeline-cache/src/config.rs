use serde::{Deserialize, Serialize};

use crate::constants::{INITIAL_DESCRIPTOR_SET_POOL_SIZE, MAX_PIPELINE_AGE};
use crate::error::{PipelineCacheError, PipelineCacheResult};

/// 缓存层的可调参数
///
/// 缺省的字段使用默认值，因此配置文件只需要写想要覆盖的部分：
/// ```json
/// { "max_pipeline_age": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineCacheConfig {
    /// 对象连续多少次 command buffer 提交未被使用后可以回收
    ///
    /// 必须不小于同时在 GPU 上执行的 command buffer 数量
    pub max_pipeline_age: u64,

    /// descriptor pool 的初始容量，单位是 bundle
    pub initial_descriptor_pool_size: u32,

    /// pool 容量不足时的扩容倍数
    pub descriptor_pool_growth_factor: u32,
}

impl Default for PipelineCacheConfig {
    fn default() -> Self {
        Self {
            max_pipeline_age: MAX_PIPELINE_AGE,
            initial_descriptor_pool_size: INITIAL_DESCRIPTOR_SET_POOL_SIZE,
            descriptor_pool_growth_factor: 2,
        }
    }
}

impl PipelineCacheConfig {
    pub fn from_json_str(json: &str) -> PipelineCacheResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineCacheResult<()> {
        if self.max_pipeline_age == 0 {
            return Err(PipelineCacheError::InvalidConfig("max_pipeline_age must be at least 1".to_string()));
        }
        if self.initial_descriptor_pool_size == 0 {
            return Err(PipelineCacheError::InvalidConfig(
                "initial_descriptor_pool_size must be at least 1".to_string(),
            ));
        }
        if self.descriptor_pool_growth_factor < 2 {
            return Err(PipelineCacheError::InvalidConfig(format!(
                "descriptor_pool_growth_factor must be at least 2, got {}",
                self.descriptor_pool_growth_factor
            )));
        }
        Ok(())
    }
}
