use std::cell::RefCell;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct ListenerKey;
}

/// 订阅凭证，用于取消订阅
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerToken {
    key: ListenerKey,
}

/// 返回 false 表示监听者已经失效，需要移除
type Listener<T> = Box<dyn FnMut(&T) -> bool>;

/// 变化通知
///
/// 监听者通过 [`Self::subscribe_weak`] 以弱引用的方式挂在通知者上，
/// 监听者被释放后会在下一次通知时自动移除，不会出现悬空的回指。
pub struct ChangeNotifier<T> {
    listeners: SlotMap<ListenerKey, Listener<T>>,
}

impl<T> Default for ChangeNotifier<T> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<T> ChangeNotifier<T> {
    pub fn new() -> Self {
        Self {
            listeners: SlotMap::with_key(),
        }
    }
}
// subscribe
impl<T> ChangeNotifier<T> {
    pub fn subscribe(&mut self, listener: impl FnMut(&T) -> bool + 'static) -> ListenerToken {
        ListenerToken {
            key: self.listeners.insert(Box::new(listener)),
        }
    }

    /// `target` 被释放后监听自动失效
    pub fn subscribe_weak<S: 'static>(
        &mut self,
        target: &Rc<RefCell<S>>,
        mut on_change: impl FnMut(&mut S, &T) + 'static,
    ) -> ListenerToken {
        let weak: Weak<RefCell<S>> = Rc::downgrade(target);
        self.subscribe(move |value| match weak.upgrade() {
            Some(target) => {
                on_change(&mut target.borrow_mut(), value);
                true
            }
            None => false,
        })
    }

    /// 返回 false 表示 token 已经失效
    pub fn unsubscribe(&mut self, token: ListenerToken) -> bool {
        self.listeners.remove(token.key).is_some()
    }
}
// notify
impl<T> ChangeNotifier<T> {
    pub fn notify(&mut self, value: &T) {
        self.listeners.retain(|_, listener| listener(value));
    }

    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_listener_is_removed_after_drop() {
        let mut notifier = ChangeNotifier::<u32>::new();
        let target = Rc::new(RefCell::new(0_u32));
        notifier.subscribe_weak(&target, |value, v| *value = *v);

        notifier.notify(&7);
        assert_eq!(*target.borrow(), 7);
        assert_eq!(notifier.listener_count(), 1);

        drop(target);
        notifier.notify(&8);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut notifier = ChangeNotifier::<()>::new();
        let counter = Rc::new(RefCell::new(0));
        let token = notifier.subscribe_weak(&counter, |count, _| *count += 1);

        notifier.notify(&());
        assert!(notifier.unsubscribe(token));
        assert!(!notifier.unsubscribe(token));
        notifier.notify(&());
        assert_eq!(*counter.borrow(), 1);
    }
}
