//! 27-邻域的中值与不均匀度缓存.
//!
//! 对体素 `index` 取其 3x3x3 邻域的 27 个强度, 排序后:
//! - 中值 `median = sorted[13]`;
//! - 不均匀度 `inhomogeneity = sorted[21] - sorted[5]`, 即第 78 与第 19 百分位之差.
//!
//! 两者只计算一次. `inhomo[index] == UNCOMPUTED` 代表尚未计算.

use super::FastMarching;
use crate::grid::{Grid, N_FULL};

/// 不均匀度缓存中 "尚未计算" 的标记.
pub(crate) const UNCOMPUTED: i32 = -1;

const MEDIAN_RANK: usize = 13;
const LOW_RANK: usize = 5;
const HIGH_RANK: usize = 21;

/// 计算 `index` 处的 `(median, inhomogeneity)`. `index` 不能位于网格最外层.
#[inline]
fn neighbourhood_stats(grid: &Grid, data: &[i16], index: usize) -> (i32, i32) {
    let mut v = [0i32; N_FULL + 1];
    for (n, x) in v.iter_mut().enumerate() {
        *x = data[grid.neighbour(index, n)] as i32;
    }
    v.sort_unstable();
    (v[MEDIAN_RANK], v[HIGH_RANK] - v[LOW_RANK])
}

/// 邻域统计量实现块
impl FastMarching {
    /// 读取 (必要时计算并缓存) `index` 处的 `(median, inhomogeneity)`.
    pub(crate) fn median_inhomo(&mut self, index: usize) -> (i32, i32) {
        let inh = self.inhomo[index];
        if inh != UNCOMPUTED {
            return (self.median[index], inh);
        }
        let (med, inh) = neighbourhood_stats(&self.grid, &self.in_data, index);
        self.median[index] = med;
        self.inhomo[index] = inh;
        (med, inh)
    }

    /// 将 `index` 处的中值和不均匀度分别加入两个统计模型.
    pub(crate) fn collect_info(&mut self, index: usize) {
        let (med, inh) = self.median_inhomo(index);
        self.pdf_intensity.add_realization(med);
        self.pdf_inhomo.add_realization(inh);
    }

    /// 并行地预先计算所有尚未计算的体素的邻域统计量.
    ///
    /// 结果与按需计算完全相同, 只是把排序开销从演化过程中挪走.
    /// 引擎没有有效输入时什么也不做.
    #[cfg(feature = "rayon")]
    pub fn precompute_neighbourhood_stats(&mut self) {
        use rayon::prelude::*;

        if !self.is_valid() {
            return;
        }
        let grid = &self.grid;
        let data = &self.in_data;
        self.median
            .par_iter_mut()
            .zip(self.inhomo.par_iter_mut())
            .enumerate()
            .filter(|(_, (_, inh))| **inh == UNCOMPUTED)
            .for_each(|(index, (med, inh))| {
                let (m, h) = neighbourhood_stats(grid, data, index);
                *med = m;
                *inh = h;
            });
    }
}
