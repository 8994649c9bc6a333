use ash::vk;

use crate::resources::listener::ChangeNotifier;
use crate::resources::resource_arena::{GfxResourceHandle, GfxResourceKind, SharedResourceArena};

/// texture 当前用于采样的 view 与 layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureViewInfo {
    pub image_view: vk::ImageView,
    pub image_layout: vk::ImageLayout,
}
impl Default for TextureViewInfo {
    fn default() -> Self {
        Self {
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

/// 外部 texture 在缓存层中的视图
///
/// image 与 view 由资源系统创建；当 primary view 或 layout 变化时（例如 mip 上传完成、layout 转换），
/// 通过 [`Self::on_view_changed`] 通知所有引用它的 sampler group。
pub struct GfxTexture {
    resource: GfxResourceHandle,
    primary_view: TextureViewInfo,
    on_view_changed: ChangeNotifier<TextureViewInfo>,
}
// new & init
impl GfxTexture {
    /// 新建的 texture 还没有可用的 view，layout 为 `UNDEFINED`
    pub fn new(arena: &SharedResourceArena, debug_name: &str) -> Self {
        let resource = arena.borrow_mut().register(GfxResourceKind::Texture, debug_name);
        Self {
            resource,
            primary_view: TextureViewInfo::default(),
            on_view_changed: ChangeNotifier::new(),
        }
    }
}
// update
impl GfxTexture {
    pub fn update_primary_view(&mut self, image_view: vk::ImageView, image_layout: vk::ImageLayout) {
        let view = TextureViewInfo {
            image_view,
            image_layout,
        };
        if view == self.primary_view {
            return;
        }
        self.primary_view = view;
        self.on_view_changed.notify(&view);
    }
}
// getters
impl GfxTexture {
    #[inline]
    pub fn resource(&self) -> GfxResourceHandle {
        self.resource
    }

    #[inline]
    pub fn primary_view(&self) -> TextureViewInfo {
        self.primary_view
    }

    #[inline]
    pub fn on_view_changed(&mut self) -> &mut ChangeNotifier<TextureViewInfo> {
        &mut self.on_view_changed
    }
}
