use std::cell::RefCell;
use std::rc::Rc;

use ash::vk;

use crate::resources::acquire_manager::AcquireOnlyManager;
use crate::resources::resource_arena::{GfxResourceHandle, SharedResourceArena};
use crate::resources::texture::{GfxTexture, TextureViewInfo};

/// 一个 sampler 槽位的输入
pub struct SamplerDescriptor<'a> {
    pub texture: Option<&'a mut GfxTexture>,
    pub sampler: vk::Sampler,
}

#[derive(Default)]
struct SamplerGroupInfo {
    image_infos: Vec<vk::DescriptorImageInfo>,
    textures: Vec<Option<GfxResourceHandle>>,
}
impl SamplerGroupInfo {
    fn with_count(count: usize) -> Self {
        Self {
            image_infos: vec![vk::DescriptorImageInfo::default(); count],
            textures: vec![None; count],
        }
    }

    /// layout 仍是 `UNDEFINED` 时 texture 还不可用，保持原来的 view
    fn refresh(&mut self, index: usize, view: &TextureViewInfo) {
        if view.image_layout == vk::ImageLayout::UNDEFINED {
            return;
        }
        let info = &mut self.image_infos[index];
        info.image_view = view.image_view;
        info.image_layout = view.image_layout;
    }
}

/// 一组 combined image sampler
///
/// 持有所引用 texture 的引用计数，并监听 texture 的 view 变化：texture 完成创建或 layout 转换后，
/// 对应槽位的 image info 会被自动刷新。
pub struct SamplerGroup {
    info: Rc<RefCell<SamplerGroupInfo>>,
    resources: AcquireOnlyManager,
}
// new & init
impl SamplerGroup {
    pub fn new(arena: SharedResourceArena, count: usize) -> Self {
        Self {
            info: Rc::new(RefCell::new(SamplerGroupInfo::with_count(count))),
            resources: AcquireOnlyManager::new(arena),
        }
    }
}
// update
impl SamplerGroup {
    /// 整体替换所有槽位
    ///
    /// 旧的监听挂在旧的 info 上，info 被替换后它们会在 texture 下一次通知时自动移除
    pub fn update(&mut self, descriptors: &mut [SamplerDescriptor]) {
        self.resources.clear();
        self.info = Rc::new(RefCell::new(SamplerGroupInfo::with_count(descriptors.len())));

        for (index, descriptor) in descriptors.iter_mut().enumerate() {
            let Some(texture) = descriptor.texture.as_deref_mut() else {
                continue;
            };

            self.resources.acquire(texture.resource());
            {
                let mut info = self.info.borrow_mut();
                info.textures[index] = Some(texture.resource());
                info.image_infos[index].sampler = descriptor.sampler;
                info.refresh(index, &texture.primary_view());
            }

            texture
                .on_view_changed()
                .subscribe_weak(&self.info, move |info, view| info.refresh(index, view));
        }
    }
}
// getters
impl SamplerGroup {
    /// 当前所有槽位的 image info（拷贝）
    pub fn image_infos(&self) -> Vec<vk::DescriptorImageInfo> {
        self.info.borrow().image_infos.clone()
    }

    pub fn textures(&self) -> Vec<Option<GfxResourceHandle>> {
        self.info.borrow().textures.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.info.borrow().image_infos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 绑定到 descriptor set 时，这些资源需要转移给缓存条目
    #[inline]
    pub fn resources(&self) -> &AcquireOnlyManager {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::resources::resource_arena::ResourceArena;

    #[test]
    fn test_view_refreshes_when_texture_becomes_ready() {
        let arena = ResourceArena::new_shared();
        let mut albedo = GfxTexture::new(&arena, "albedo");
        let sampler = vk::Sampler::from_raw(0x10);

        let mut group = SamplerGroup::new(arena.clone(), 2);
        group.update(&mut [
            SamplerDescriptor {
                texture: Some(&mut albedo),
                sampler,
            },
            SamplerDescriptor {
                texture: None,
                sampler: vk::Sampler::null(),
            },
        ]);

        // texture 尚未就绪：sampler 已填，view 为空
        let infos = group.image_infos();
        assert_eq!(infos[0].sampler, sampler);
        assert_eq!(infos[0].image_view, vk::ImageView::null());
        assert_eq!(group.textures(), vec![Some(albedo.resource()), None]);
        assert_eq!(arena.borrow().ref_count(albedo.resource()), Some(1));

        let view = vk::ImageView::from_raw(0x20);
        albedo.update_primary_view(view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let infos = group.image_infos();
        assert_eq!(infos[0].image_view, view);
        assert_eq!(infos[0].image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_update_replaces_previous_listeners() {
        let arena = ResourceArena::new_shared();
        let mut texture = GfxTexture::new(&arena, "shadow");
        texture.update_primary_view(vk::ImageView::from_raw(1), vk::ImageLayout::GENERAL);

        let mut group = SamplerGroup::new(arena.clone(), 1);
        let sampler = vk::Sampler::from_raw(2);
        group.update(&mut [SamplerDescriptor {
            texture: Some(&mut texture),
            sampler,
        }]);
        group.update(&mut [SamplerDescriptor {
            texture: Some(&mut texture),
            sampler,
        }]);
        assert_eq!(texture.on_view_changed().listener_count(), 2);
        assert_eq!(arena.borrow().ref_count(texture.resource()), Some(1));

        texture.update_primary_view(vk::ImageView::from_raw(3), vk::ImageLayout::GENERAL);
        assert_eq!(texture.on_view_changed().listener_count(), 1);
        assert_eq!(group.image_infos()[0].image_view, vk::ImageView::from_raw(3));

        drop(group);
        assert_eq!(arena.borrow().ref_count(texture.resource()), Some(0));
    }
}
