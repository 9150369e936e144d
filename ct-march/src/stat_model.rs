//! 一维有界整数取值 (`0..=realization_max`) 上的在线经验分布估计.
//!
//! 样本先进入待处理队列, 在 [`StatisticalModel::update`] 时并入有界滑动窗口.
//! 窗口样本的一阶/二阶矩增量维护, 直方图按当前方差自适应地做高斯核平滑.
//! 当样本数不足时, [`StatisticalModel::value`] 退化为闭式高斯密度.

use crate::consts::{GAUSSIAN_FALLBACK_FACTOR, MIN_UPDATE_RATE};
use log::{debug, trace};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// 方差下限. 样本是整数, 低于一个量化单位的方差没有意义.
const MIN_VARIANCE: f64 = 1.0;

/// 在线统计模型.
#[derive(Clone, Debug)]
pub struct StatisticalModel {
    realization_max: usize,

    /// 每个取值在窗口中出现的次数.
    bins: Vec<u32>,

    /// 平滑并归一化后的直方图.
    smoothed: Vec<f64>,

    /// 滑动窗口, 队首最旧.
    window: VecDeque<usize>,

    /// 尚未并入窗口的样本.
    pending: VecDeque<usize>,

    /// 窗口容量. `None` 代表无界.
    memory_size: Option<usize>,

    /// 每加入多少个样本自动更新一次. `None` 代表从不自动更新.
    update_rate: Option<usize>,

    /// 距离上次自动更新加入的样本数.
    counter: usize,

    sum: f64,
    sum_sqr: f64,
    mean: f64,
    variance: f64,

    sigma2_smooth_pdf: f64,

    /// 被截断到合法区间的样本个数.
    clamped: u64,
}

impl StatisticalModel {
    /// 创建取值范围为 `0..=realization_max` 的空模型.
    /// 窗口无界, 不自动更新, 平滑系数为 1.
    pub fn new(realization_max: usize) -> Self {
        Self {
            realization_max,
            bins: vec![0; realization_max + 1],
            smoothed: vec![0.0; realization_max + 1],
            window: VecDeque::new(),
            pending: VecDeque::new(),
            memory_size: None,
            update_rate: None,
            counter: 0,
            sum: 0.0,
            sum_sqr: 0.0,
            mean: 0.0,
            variance: MIN_VARIANCE,
            sigma2_smooth_pdf: 1.0,
            clamped: 0,
        }
    }

    /// 清空所有样本, 直方图与矩累加量. 窗口容量, 更新频率和平滑系数保持不变.
    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.smoothed.fill(0.0);
        self.window.clear();
        self.pending.clear();
        self.counter = 0;
        self.sum = 0.0;
        self.sum_sqr = 0.0;
        self.mean = 0.0;
        self.variance = MIN_VARIANCE;
    }

    /// 记录一次观测.
    ///
    /// 超出 `0..=realization_max` 的值被截断到区间端点.
    /// 每累计 `update_rate` 个样本, 或待处理样本超过窗口容量的一半时,
    /// 自动调用 [`Self::update`].
    pub fn add_realization(&mut self, k: i32) {
        let r = self.clamp(k);
        self.pending.push_back(r);
        self.counter += 1;

        if let Some(rate) = self.update_rate {
            if self.counter >= rate {
                self.update();
                return;
            }
        }
        if let Some(memory) = self.memory_size {
            if self.pending.len() > memory / 2 {
                self.update();
            }
        }
    }

    #[inline]
    fn clamp(&mut self, k: i32) -> usize {
        let r = k.clamp(0, self.realization_max as i32) as usize;
        if r as i32 != k {
            if self.clamped == 0 {
                debug!("realization {k} clamped into [0, {}]", self.realization_max);
            }
            self.clamped += 1;
        }
        r
    }

    /// 将待处理样本并入窗口, 淘汰超出容量的旧样本, 重新计算均值, 方差和平滑直方图.
    pub fn update(&mut self) {
        self.counter = 0;

        while let Some(r) = self.pending.pop_front() {
            self.window.push_back(r);
            self.bins[r] += 1;
            self.sum += r as f64;
            self.sum_sqr += (r * r) as f64;
        }
        if let Some(memory) = self.memory_size {
            while self.window.len() > memory {
                let Some(r) = self.window.pop_front() else {
                    break;
                };
                self.bins[r] -= 1;
                self.sum -= r as f64;
                self.sum_sqr -= (r * r) as f64;
            }
        }

        let n = self.window.len();
        if n == 0 {
            self.mean = 0.0;
            self.variance = MIN_VARIANCE;
            self.sum = 0.0;
            self.sum_sqr = 0.0;
            self.smoothed.fill(0.0);
            return;
        }

        let n = n as f64;
        self.mean = self.sum / n;
        self.variance = (self.sum_sqr / n - self.mean * self.mean).max(MIN_VARIANCE);

        self.smooth();
        trace!(
            "model updated: n = {n}, mean = {:.3}, variance = {:.3}",
            self.mean,
            self.variance
        );
    }

    /// 以 `sigma2_smooth_pdf * variance` 为带宽平滑直方图, 并按样本数归一化.
    fn smooth(&mut self) {
        let len = self.realization_max + 1;
        let bandwidth = self.sigma2_smooth_pdf * self.variance;

        // 核只依赖于 |k - j|.
        let kernel: Vec<f64> = (0..len)
            .map(|d| (-0.5 * (d * d) as f64 / bandwidth).exp())
            .collect();
        let mut prefix = Vec::with_capacity(len + 1);
        prefix.push(0.0);
        for w in kernel.iter() {
            prefix.push(prefix[prefix.len() - 1] + w);
        }

        let occupied: Vec<(usize, f64)> = self
            .bins
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0)
            .map(|(j, &c)| (j, c as f64))
            .collect();
        let n = self.window.len() as f64;

        for (k, out) in self.smoothed.iter_mut().enumerate() {
            // sum_{j=0}^{max} kernel[|k - j|]
            let weights = prefix[k + 1] + prefix[len - k] - kernel[0];
            let num: f64 = occupied
                .iter()
                .map(|&(j, c)| c * kernel[k.abs_diff(j)])
                .sum();
            *out = num / weights / n;
        }
    }

    /// 在 `k` 处的概率密度估计.
    ///
    /// 样本不足 (见 [`Self::will_use_gaussian`]) 或 `k` 越界时返回高斯密度,
    /// 否则返回平滑直方图的值.
    pub fn value(&self, k: i32) -> f64 {
        if self.will_use_gaussian() || k < 0 || k as usize > self.realization_max {
            self.gaussian(k)
        } else {
            self.smoothed[k as usize]
        }
    }

    /// 窗口样本数是否小于 `50 * sqrt(variance)`.
    #[inline]
    pub fn will_use_gaussian(&self) -> bool {
        (self.window.len() as f64) < GAUSSIAN_FALLBACK_FACTOR * self.variance.sqrt()
    }

    /// 以当前均值和方差计算的一维高斯密度.
    pub fn gaussian(&self, k: i32) -> f64 {
        let d = k as f64 - self.mean;
        (-d * d / (2.0 * self.variance)).exp() / (2.0 * PI * self.variance).sqrt()
    }

    /// 设置窗口容量. `None` 代表无界.
    #[inline]
    pub fn set_memory(&mut self, memory_size: Option<usize>) {
        self.memory_size = memory_size;
    }

    /// 设置自动更新频率. `None` 代表从不自动更新, 小于 10 的值被提升到 10.
    #[inline]
    pub fn set_update_rate(&mut self, rate: Option<usize>) {
        self.update_rate = rate.map(|r| r.max(MIN_UPDATE_RATE));
    }

    /// 窗口容量.
    #[inline]
    pub fn memory(&self) -> Option<usize> {
        self.memory_size
    }

    /// 自动更新频率.
    #[inline]
    pub fn update_rate(&self) -> Option<usize> {
        self.update_rate
    }

    /// 平滑带宽与方差的比例.
    #[inline]
    pub fn sigma2_smooth_pdf(&self) -> f64 {
        self.sigma2_smooth_pdf
    }

    /// 设置平滑带宽与方差的比例. 下次 [`Self::update`] 时生效.
    #[inline]
    pub fn set_sigma2_smooth_pdf(&mut self, value: f64) {
        self.sigma2_smooth_pdf = value;
    }

    /// 窗口均值.
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 窗口方差 (不小于 1).
    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// 窗口内样本数.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    /// 待处理样本数.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 取值上限.
    #[inline]
    pub fn realization_max(&self) -> usize {
        self.realization_max
    }

    /// 被截断过的样本总数.
    #[inline]
    pub fn clamped_count(&self) -> u64 {
        self.clamped
    }
}
