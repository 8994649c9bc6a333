//! 缓存使用的 key
//!
//! 所有 key 都是 `#[repr(C)]` 的 `Pod` 类型，padding 是显式的字段并且始终为 0，
//! 因此相等与哈希都可以直接作用于完整的字节序列。

pub mod descriptor_key;
pub mod pipeline_key;
pub mod raster_state;
pub mod usage_flags;

/// 为 `Pod` 类型实现按字节比较的 `PartialEq` / `Eq` / `Hash`
///
/// 保证 `a == b` 时 `hash(a) == hash(b)`，浮点字段也按位比较
macro_rules! impl_bytewise_eq_hash {
    ($ty:ty) => {
        impl PartialEq for $ty {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
            }
        }
        impl Eq for $ty {}
        impl std::hash::Hash for $ty {
            #[inline]
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                state.write(bytemuck::bytes_of(self));
            }
        }
    };
}
pub(crate) use impl_bytewise_eq_hash;
