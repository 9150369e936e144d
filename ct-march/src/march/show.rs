//! 在已知点历史上浏览 (scrub) 分割结果, 以及继续演化前对回退部分的撤销.
//!
//! `known_points` 只会在末尾追加或截断, 从不重排, 因此游标的前进和后退
//! 只需对两个位置之间的体素打上或擦除标签.

use super::node::FmStatus;
use super::{FastMarching, MarchMode};
use crate::consts::{INF, LABEL_BACKGROUND};
use crate::{FmError, FmResult};
use log::{debug, error};

/// Show 实现块
impl FastMarching {
    /// 将输出标签调整为已知点历史的前 `floor((len - 1) * r) + 1` 个点.
    ///
    /// 游标前进时, 新覆盖的点若仍是 `Known` 且为背景, 则打上活动标签;
    /// 游标后退时, 退出覆盖的点若仍是 `Known` 且带有活动标签, 则恢复为背景.
    /// 调用后引擎进入 [`MarchMode::Scrubbing`].
    ///
    /// 尚未演化过或历史为空时什么也不做. `r` 不在 `[0, 1]` 内时返回
    /// `Err(FmError::InvalidScrubRatio)`.
    pub fn show(&mut self, r: f32) -> FmResult<()> {
        self.ensure_valid()?;
        if !(0.0..=1.0).contains(&r) {
            error!("show ratio {r} is outside [0, 1]");
            return Err(FmError::InvalidScrubRatio(r));
        }
        if self.mode == MarchMode::Idle || self.known_points.is_empty() {
            return Ok(());
        }

        let last = self.known_points.len() - 1;
        let new = ((last as f64 * r as f64).floor() as usize).min(last);
        let label = self.label;

        match self.cursor {
            Some(old) if new < old => {
                for &index in self.known_points[new + 1..=old].iter().rev() {
                    if self.nodes[index].status == FmStatus::Known && self.out_data[index] == label {
                        self.out_data[index] = LABEL_BACKGROUND;
                    }
                }
            }
            old => {
                let start = old.map_or(0, |o| o + 1);
                for &index in self.known_points.iter().take(new + 1).skip(start) {
                    if self.nodes[index].status == FmStatus::Known
                        && self.out_data[index] == LABEL_BACKGROUND
                    {
                        self.out_data[index] = label;
                    }
                }
            }
        }

        self.cursor = Some(new);
        self.mode = MarchMode::Scrubbing;
        Ok(())
    }

    /// 撤销游标之后的已知点, 使演化可以从游标位置重新开始.
    ///
    /// 被撤销的点变回 `Far`, 它们在波前中的邻居被推到堆尾 (`T = INF`).
    /// 被撤销的点若仍与 `Known` 体素相邻, 重新计算到达时间并回到波前;
    /// 被推到堆尾的邻居若仍与 `Known` 体素相邻, 同样重新计算.
    /// 历史被截断到游标处.
    pub(crate) fn retract_scrubbed(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        if cursor + 1 >= self.known_points.len() {
            return;
        }

        let stale = self.known_points.split_off(cursor + 1);
        let count = self.params.connectivity.count();
        let mut pushed_back = Vec::new();

        for &index in stale.iter() {
            let node = &mut self.nodes[index];
            node.status = FmStatus::Far;
            node.t = INF;

            for n in 1..=count {
                let nb = self.grid.neighbour(index, n);
                if self.nodes[nb].status != FmStatus::Trial {
                    continue;
                }
                self.nodes[nb].t = INF;
                if let Some(leaf) = self.nodes[nb].leaf {
                    self.heap.down(&mut self.nodes, leaf);
                }
                pushed_back.push(nb);
            }
        }

        for &index in stale.iter() {
            if self.nodes[index].status != FmStatus::Out && self.has_known_neighbour(index) {
                self.nodes[index].t = self.compute_t(index);
                self.nodes[index].status = FmStatus::Trial;
                self.heap.insert(&mut self.nodes, index);
            }
        }

        for index in pushed_back {
            let node = self.nodes[index];
            if node.status != FmStatus::Trial || node.t < INF || !self.has_known_neighbour(index) {
                continue;
            }
            self.nodes[index].t = self.compute_t(index);
            if let Some(leaf) = self.nodes[index].leaf {
                self.heap.up(&mut self.nodes, leaf);
            }
        }

        debug!(
            "{} scrubbed points retracted, {} known points kept",
            stale.len(),
            self.known_points.len()
        );
    }

    fn has_known_neighbour(&self, index: usize) -> bool {
        (1..=self.params.connectivity.count())
            .any(|n| self.nodes[self.grid.neighbour(index, n)].status == FmStatus::Known)
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::LABEL_BACKGROUND;
    use crate::march::node::FmStatus;
    use crate::march::tests::uniform_engine;
    use crate::{FmError, Ijk, MarchMode};

    fn labelled(fm: &crate::FastMarching) -> usize {
        fm.label_map().iter().filter(|&&v| v != LABEL_BACKGROUND).count()
    }

    #[test]
    fn test_show_before_evolution() {
        let mut fm = uniform_engine(10);
        fm.add_seed_ijk(Ijk::new(5, 5, 5)).unwrap();
        fm.show(1.0).unwrap();
        assert_eq!(fm.mode(), MarchMode::Idle);
        assert_eq!(labelled(&fm), 0);
        assert!(matches!(fm.show(1.5), Err(FmError::InvalidScrubRatio(_))));
        assert!(fm.show(-0.1).is_err());
        assert!(fm.show(f32::NAN).is_err());
    }

    #[test]
    fn test_show_round_trip() {
        let mut fm = uniform_engine(10);
        fm.add_seed_ijk(Ijk::new(5, 5, 5)).unwrap();
        fm.evolve(1000).unwrap();
        assert_eq!(labelled(&fm), 0);

        fm.show(0.0).unwrap();
        assert_eq!(fm.cursor(), Some(0));
        assert_eq!(labelled(&fm), 1);
        let snapshot = fm.label_map().to_owned();

        for r in [0.25, 0.5, 1.0, 0.75, 0.3, 0.6, 0.1, 0.0] {
            fm.show(r).unwrap();
            let expected = (63.0 * r as f64).floor() as usize + 1;
            assert_eq!(labelled(&fm), expected, "r = {r}");
        }
        assert_eq!(fm.label_map(), snapshot.view());
        assert_eq!(fm.mode(), MarchMode::Scrubbing);
    }

    #[test]
    fn test_show_keeps_foreign_labels() {
        let mut fm = uniform_engine(10);
        fm.add_seed_ijk(Ijk::new(5, 5, 5)).unwrap();
        fm.evolve(1000).unwrap();
        fm.set_active_label(3);
        fm.show(1.0).unwrap();
        assert!(fm.label_map().iter().all(|&v| v == 0 || v == 3));

        // 换一个标签后倒退, 已经写入的 3 不会被擦除.
        fm.set_active_label(4);
        fm.show(0.0).unwrap();
        assert_eq!(labelled(&fm), 64);
    }

    #[test]
    fn test_retract_scrubbed() {
        let mut fm = uniform_engine(10);
        fm.add_seed_ijk(Ijk::new(5, 5, 5)).unwrap();
        fm.evolve(20).unwrap();
        assert_eq!(fm.n_known_points(), 21);

        fm.show(1.0).unwrap();
        fm.show(0.25).unwrap();
        assert_eq!(fm.cursor(), Some(5));
        let stale: Vec<usize> = fm.known_points()[6..].to_vec();

        fm.retract_scrubbed();
        assert_eq!(fm.n_known_points(), 6);
        assert_eq!(fm.check_heap(), Ok(()));
        for index in stale {
            // 要么回到波前, 要么变回 Far.
            assert!(matches!(
                fm.nodes[index].status,
                FmStatus::Trial | FmStatus::Far
            ));
            assert_eq!(fm.out_data[index], LABEL_BACKGROUND);
        }
        // 游标之后已经没有东西可撤销.
        fm.retract_scrubbed();
        assert_eq!(fm.n_known_points(), 6);
    }
}
