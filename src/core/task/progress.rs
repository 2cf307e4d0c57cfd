use std::time::Instant;

/// 吞吐估算：相邻两次采样的字节差除以时间差。
/// 采样由定时器驱动（500ms 一次），不在每个数据帧上做，避免高吞吐时的开销。
#[derive(Debug)]
pub struct SpeedEstimator {
    last_at: Option<Instant>,
    last_bytes: u64,
}

impl SpeedEstimator {
    pub fn new() -> Self {
        Self { last_at: None, last_bytes: 0 }
    }

    /// 记录一次采样并返回瞬时速度（B/s）。首个采样点返回 0。
    pub fn sample_at(&mut self, at: Instant, bytes: u64) -> u64 {
        let speed = match self.last_at {
            Some(prev) => {
                let dt = at.duration_since(prev).as_secs_f64();
                if dt > 0.0 {
                    (bytes.saturating_sub(self.last_bytes) as f64 / dt) as u64
                } else {
                    0
                }
            }
            None => 0,
        };
        self.last_at = Some(at);
        self.last_bytes = bytes;
        speed
    }

    /// 暂停后恢复时调用，否则恢复后的第一次采样会把暂停时长摊进速度里
    pub fn reset(&mut self) {
        self.last_at = None;
        self.last_bytes = 0;
    }
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// 预计剩余秒数；速度为 0 或总大小未知时不可估
pub fn estimate_eta(total: u64, downloaded: u64, speed: u64) -> Option<u64> {
    if speed == 0 || total == 0 {
        return None;
    }
    Some(total.saturating_sub(downloaded) / speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_speed_from_consecutive_samples() {
        let mut estimator = SpeedEstimator::new();
        let t0 = Instant::now();
        assert_eq!(estimator.sample_at(t0, 0), 0);
        assert_eq!(estimator.sample_at(t0 + Duration::from_secs(1), 1_048_576), 1_048_576);
        // 两秒下了 2MB -> 1MB/s
        assert_eq!(
            estimator.sample_at(t0 + Duration::from_secs(3), 3_145_728),
            1_048_576
        );
    }

    #[test]
    fn test_speed_never_negative_on_stall() {
        let mut estimator = SpeedEstimator::new();
        let t0 = Instant::now();
        estimator.sample_at(t0, 1000);
        // 字节数没涨，速度归零而不是下溢
        assert_eq!(estimator.sample_at(t0 + Duration::from_secs(1), 1000), 0);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut estimator = SpeedEstimator::new();
        let t0 = Instant::now();
        estimator.sample_at(t0, 10_000_000);
        estimator.reset();
        // 重置后首个采样点不产生速度
        assert_eq!(estimator.sample_at(t0 + Duration::from_secs(60), 10_000_100), 0);
    }

    #[test]
    fn test_eta() {
        assert_eq!(estimate_eta(100_000_000, 40_000_000, 1_000_000), Some(60));
        assert_eq!(estimate_eta(100, 100, 1_000), Some(0));
        // 速度为零或大小未知 -> 不可估
        assert_eq!(estimate_eta(100, 0, 0), None);
        assert_eq!(estimate_eta(0, 1234, 1_000), None);
    }
}
