/// 逻辑时间戳，每个 command buffer 边界加一
pub type Timestamp = u64;

/// 缓存层的逻辑时钟
///
/// 只在 command buffer 边界前进一次。所有回收判断都只比较记录的时间戳与当前值，与墙上时间无关。
pub struct TimelineTracker {
    current: Timestamp,
    max_age: u64,
}
// new & init
impl TimelineTracker {
    pub fn new(max_age: u64) -> Self {
        Self { current: 0, max_age }
    }
}
// update
impl TimelineTracker {
    /// 进入下一个 command buffer，返回新的时间戳
    #[inline]
    pub fn advance(&mut self) -> Timestamp {
        self.current = self.current.wrapping_add(1);
        self.current
    }
}
// getters
impl TimelineTracker {
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.current
    }

    #[inline]
    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    /// `last_used + max_age < now` 时对象不再可能被在途的 GPU 工作引用
    #[inline]
    pub fn is_expired(&self, last_used: Timestamp) -> bool {
        last_used.saturating_add(self.max_age) < self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_boundary() {
        let mut timeline = TimelineTracker::new(10);
        let stamp = timeline.now();

        for _ in 0..10 {
            timeline.advance();
            assert!(!timeline.is_expired(stamp), "age {} must be kept", timeline.now() - stamp);
        }

        timeline.advance();
        assert_eq!(timeline.now() - stamp, 11);
        assert!(timeline.is_expired(stamp));
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut timeline = TimelineTracker::new(1);
        let a = timeline.advance();
        let b = timeline.advance();
        assert!(b > a);
        assert_eq!(timeline.now(), b);
    }
}
