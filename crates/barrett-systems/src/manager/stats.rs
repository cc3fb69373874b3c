//! 控制循环统计

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 周期耗时统计快照（单位：微秒）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleStatistics {
    pub period_us: f64,
    pub min_us: f64,
    pub mean_us: f64,
    pub max_us: f64,
    pub stdev_us: f64,
    pub loop_count: u64,
    /// 错过的唤醒点数量
    pub missed_release_points: u64,
    /// 耗时超过周期的次数
    pub overruns: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LoopStats {
    min_us: f64,
    max_us: f64,
    sum_us: f64,
    sum_sq_us: f64,
    loop_count: u64,
    missed: u64,
    overruns: u64,
}

impl LoopStats {
    pub(crate) fn record(&mut self, duration: Duration, period: Duration) {
        let us = duration.as_secs_f64() * 1e6;
        if self.loop_count == 0 {
            self.min_us = us;
            self.max_us = us;
        } else {
            self.min_us = self.min_us.min(us);
            self.max_us = self.max_us.max(us);
        }
        self.sum_us += us;
        self.sum_sq_us += us * us;
        self.loop_count += 1;
        if duration > period {
            self.overruns += 1;
        }
    }

    pub(crate) fn add_missed(&mut self, missed: u64) {
        self.missed += missed;
    }

    pub(crate) fn snapshot(&self, period: Duration) -> CycleStatistics {
        let (mean, stdev) = if self.loop_count == 0 {
            (0.0, 0.0)
        } else {
            let n = self.loop_count as f64;
            let mean = self.sum_us / n;
            let var = (self.sum_sq_us / n - mean * mean).max(0.0);
            (mean, var.sqrt())
        };
        CycleStatistics {
            period_us: period.as_secs_f64() * 1e6,
            min_us: self.min_us,
            mean_us: mean,
            max_us: self.max_us,
            stdev_us: stdev,
            loop_count: self.loop_count,
            missed_release_points: self.missed,
            overruns: self.overruns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = LoopStats::default().snapshot(Duration::from_millis(2));
        assert_eq!(stats.loop_count, 0);
        assert_eq!(stats.mean_us, 0.0);
        assert!((stats.period_us - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_record() {
        let period = Duration::from_micros(100);
        let mut stats = LoopStats::default();
        stats.record(Duration::from_micros(50), period);
        stats.record(Duration::from_micros(150), period);
        stats.record(Duration::from_micros(100), period);
        stats.add_missed(3);

        let s = stats.snapshot(period);
        assert_eq!(s.loop_count, 3);
        assert!((s.min_us - 50.0).abs() < 1e-6);
        assert!((s.max_us - 150.0).abs() < 1e-6);
        assert!((s.mean_us - 100.0).abs() < 1e-6);
        // 总体标准差 sqrt(5000/3)
        assert!((s.stdev_us - (5000.0f64 / 3.0).sqrt()).abs() < 1e-6);
        assert_eq!(s.overruns, 1);
        assert_eq!(s.missed_release_points, 3);
    }

    #[test]
    fn test_serialize() {
        let s = CycleStatistics {
            loop_count: 10,
            ..Default::default()
        };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"loop_count\":10"));
        let back: CycleStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
