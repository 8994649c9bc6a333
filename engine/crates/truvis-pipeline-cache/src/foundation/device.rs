use std::ffi::CString;
use std::ops::Deref;

use ash::prelude::VkResult;
use ash::vk;

/// 缓存层用到的全部 Vulkan 设备函数
///
/// 缓存层只通过这个 trait 访问设备，既可以接真实的 [`AshDeviceFunctions`]，也可以接测试中的记录设备。
/// 所有 handle 的合法性由调用者保证。
pub trait DeviceFunctions {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(&self, create_info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, create_info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_descriptor_pool(&self, create_info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn allocate_descriptor_sets(&self, allocate_info: &vk::DescriptorSetAllocateInfo)
    -> VkResult<Vec<vk::DescriptorSet>>;
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()>;
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);

    /// 没有开启 debug utils 时什么也不做
    fn set_object_debug_name(&self, _object_type: vk::ObjectType, _raw_handle: u64, _name: &str) {}
}

/// 以 handle 的类型设置 debug name
pub fn set_debug_name<T: vk::Handle>(device: &dyn DeviceFunctions, handle: T, name: impl AsRef<str>) {
    device.set_object_debug_name(T::TYPE, handle.as_raw(), name.as_ref());
}

/// 基于 `ash::Device` 的实现
pub struct AshDeviceFunctions {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
}
// new & init
impl AshDeviceFunctions {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            debug_utils: None,
        }
    }

    /// 需要 instance 开启了 `VK_EXT_debug_utils`
    pub fn with_debug_utils(instance: &ash::Instance, device: ash::Device) -> Self {
        let debug_utils = ash::ext::debug_utils::Device::new(instance, &device);
        Self {
            device,
            debug_utils: Some(debug_utils),
        }
    }
}
impl Deref for AshDeviceFunctions {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl DeviceFunctions for AshDeviceFunctions {
    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.device.create_descriptor_set_layout(create_info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_pipeline_layout(&self, create_info: &vk::PipelineLayoutCreateInfo) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(create_info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, create_info: &vk::GraphicsPipelineCreateInfo) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(create_info), None)
                .map_err(|(_, result)| result)?
        };
        pipelines.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_descriptor_pool(&self, create_info: &vk::DescriptorPoolCreateInfo) -> VkResult<vk::DescriptorPool> {
        unsafe { self.device.create_descriptor_pool(create_info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        allocate_info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        unsafe { self.device.allocate_descriptor_sets(allocate_info) }
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VkResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, sets) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.device.update_descriptor_sets(writes, &[]) }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            )
        }
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(command_buffer, 0, std::slice::from_ref(&scissor)) }
    }

    fn set_object_debug_name(&self, object_type: vk::ObjectType, raw_handle: u64, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            log::warn!("debug name contains a nul byte: {name:?}");
            return;
        };
        let mut name_info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str());
        name_info.object_type = object_type;
        name_info.object_handle = raw_handle;
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
            log::warn!("failed to set debug name {name:?}: {e}");
        }
    }
}
