//! 外部资源的引用计数与变化通知
//!
//! buffer / texture / sampler 的创建与销毁不归缓存层管理，缓存层只通过
//! [`resource_arena::ResourceArena`] 记录"谁还在用"，保证资源不会在 GPU 仍可能访问时被释放。

pub mod acquire_manager;
pub mod buffer_object;
pub mod listener;
pub mod resource_arena;
pub mod sampler_group;
pub mod texture;
