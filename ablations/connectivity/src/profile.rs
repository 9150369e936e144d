//! 单次演化统计.

use std::time::Duration;

/// 一次演化的数据统计.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    /// 成功加入的种子个数.
    pub seeds: usize,

    /// 实际演化步数.
    pub steps: usize,

    /// 是否因为波前耗尽而提前结束.
    pub exhausted: bool,

    /// 最后一个已知点的到达时间.
    pub last_arrival: Option<f32>,

    /// `show(1.0)` 之后带标签的体素个数.
    pub labelled: usize,

    /// 强度模型的样本均值与方差.
    pub intensity: (f64, f64),

    /// 强度模型与不均匀度模型被截断的样本个数之和.
    pub clamped: u64,

    /// 种子加入到显示结果的总时间.
    pub elapsed: Duration,
}

impl Profile {
    /// 平均每步耗时 (以微秒为单位).
    #[inline]
    pub fn avg_step_us(&self) -> Option<f64> {
        (self.steps != 0).then(|| self.elapsed.as_micros() as f64 / self.steps as f64)
    }
}
