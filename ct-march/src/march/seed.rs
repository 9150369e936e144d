//! 种子管理: 添加, 种植, 以及从已有标签开始新一轮扩展.

use super::node::{FmNode, FmStatus};
use super::{FastMarching, MarchMode};
use crate::consts::LABEL_BACKGROUND;
use crate::grid::N_FULL;
use crate::{FmError, FmResult, Ijk, ScalarType, VolumeData};
use log::{debug, error, warn};

/// 种子实现块
impl FastMarching {
    /// 设置 RAS -> IJK 的 4x4 仿射矩阵 (行优先).
    #[inline]
    pub fn set_ras_to_ijk(&mut self, m: [[f64; 4]; 4]) {
        self.ras_to_ijk = m;
    }

    /// 获取 RAS -> IJK 的仿射矩阵.
    #[inline]
    pub fn ras_to_ijk(&self) -> &[[f64; 4]; 4] {
        &self.ras_to_ijk
    }

    /// 以物理坐标 `[r, a, s]` 添加种子. 坐标经仿射矩阵变换后向零截断为体素坐标.
    ///
    /// 结果不在网格内部区域时返回 `Err(FmError::SeedOutOfRange)`.
    pub fn add_seed(&mut self, ras: [f64; 3]) -> FmResult<()> {
        self.ensure_valid()?;
        let [r, a, s] = ras;
        let row = |m: &[f64; 4]| m[0] * r + m[1] * a + m[2] * s + m[3];
        let m = &self.ras_to_ijk;
        // 负值在 `as` 转换下饱和到 0, 同样会被判为越界.
        let p = Ijk::new(row(&m[0]) as usize, row(&m[1]) as usize, row(&m[2]) as usize);
        self.add_seed_ijk(p)
    }

    /// 以体素坐标添加种子.
    ///
    /// 种子进入待种植队列, 其完整 27-邻域的统计量立即加入两个统计模型.
    /// 坐标必须在每个轴上满足 `1 <= c <= dim - 2`,
    /// 否则返回 `Err(FmError::SeedOutOfRange)`, 引擎状态不变.
    pub fn add_seed_ijk(&mut self, p: Ijk) -> FmResult<()> {
        self.ensure_valid()?;
        if !self.grid.is_seedable(p) {
            warn!("seed {p:?} is outside the image volume");
            return Err(FmError::SeedOutOfRange(p));
        }

        let index = self.grid.index(p);
        self.seeds.push(index);
        for n in 0..=N_FULL {
            self.collect_info(self.grid.neighbour(index, n));
        }
        debug!("seed {p:?} queued, {} seeds pending", self.seeds.len());
        Ok(())
    }

    /// 将标签图像中每个非零体素作为种子. 返回成功添加的种子个数.
    ///
    /// 标签图像必须是 `i16` 或 `u16`, 且形状与网格一致.
    /// 越界的体素被跳过 (记录日志), 不影响其它种子.
    pub fn add_seeds_from_image(&mut self, image: &VolumeData) -> FmResult<usize> {
        self.ensure_valid()?;
        match image.scalar_type() {
            ScalarType::I16 | ScalarType::U16 => {}
            other => {
                error!("seed label image must be i16 or u16, found {other:?}");
                return Err(FmError::UnsupportedScalarType(other));
            }
        }
        let expected = self.grid.shape();
        if image.shape() != expected {
            return Err(FmError::ShapeMismatch {
                expected,
                found: image.shape(),
            });
        }

        let added = image
            .nonzero_ijk()
            .into_iter()
            .filter(|p| self.add_seed_ijk(*p).is_ok())
            .count();
        debug!("{added} seeds added from label image");
        Ok(added)
    }

    /// 种植种子 `index`: `T = 0`, 状态变为 `Known`, 并将 26-邻域中 `Far` 的体素以
    /// `T = 距离 / 速度` 加入波前.
    ///
    /// 体素不是 `Far` (已经种植过, 或是 `Out`/`Done`) 时什么也不做.
    pub(crate) fn set_seed(&mut self, index: usize) {
        if self.nodes[index].status != FmStatus::Far {
            return;
        }

        let node = &mut self.nodes[index];
        node.t = 0.0;
        node.status = FmStatus::Known;
        self.known_points.push(index);

        for n in 1..=N_FULL {
            let nb = self.grid.neighbour(index, n);
            if self.nodes[nb].status == FmStatus::Far {
                let t = self.grid.distance(n) / self.speed(nb);
                self.nodes[nb].status = FmStatus::Trial;
                self.nodes[nb].t = t as f32;
                self.heap.insert(&mut self.nodes, nb);
            }
        }
    }

    /// 以当前输出标签中的活动标签区域为起点, 开始新一轮扩展.
    ///
    /// 清空两个统计模型, 波前, 已知点历史和种子队列. 每个非 `Out` 体素重新变为
    /// `Far` (背景) 或 `Done` (已有标签). 活动标签区域内每个体素的统计量加入模型,
    /// 其邻域中的背景体素成为新的种子.
    pub fn init_new_expansion(&mut self) -> FmResult<()> {
        self.ensure_valid()?;
        if self.label == LABEL_BACKGROUND {
            warn!("active label is the background value, nothing to expand from");
        }

        for model in [&mut self.pdf_intensity, &mut self.pdf_inhomo] {
            model.reset();
            model.set_memory(None);
            model.set_update_rate(None);
        }
        for index in self.heap.drain() {
            self.nodes[index].leaf = None;
        }
        self.known_points.clear();
        self.seeds.clear();
        self.cursor = None;
        self.first_call = true;
        self.mode = MarchMode::Idle;

        for (node, &out) in self.nodes.iter_mut().zip(self.out_data.iter()) {
            if node.status == FmStatus::Out {
                continue;
            }
            *node = if out == LABEL_BACKGROUND {
                FmNode::FAR
            } else {
                FmNode {
                    status: FmStatus::Done,
                    ..FmNode::FAR
                }
            };
        }

        if self.label == LABEL_BACKGROUND {
            return Ok(());
        }
        let count = self.params.connectivity.count();
        for index in 0..self.grid.len() {
            if self.out_data[index] != self.label || self.nodes[index].status == FmStatus::Out {
                continue;
            }
            self.collect_info(index);
            for n in 1..=count {
                let nb = self.grid.neighbour(index, n);
                if self.out_data[nb] == LABEL_BACKGROUND {
                    self.seeds.push(nb);
                }
            }
        }
        debug!("new expansion prepared with {} seeds", self.seeds.len());
        Ok(())
    }
}
