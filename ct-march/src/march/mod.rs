//! 交互式 Fast Marching 分割引擎.
//!
//! 典型流程:
//!
//! 1. [`FastMarching::new`] 给出网格几何与强度上限;
//! 2. [`FastMarching::set_volumes`] 给出 `i16` 驱动图像和输出标签;
//! 3. 添加种子 ([`FastMarching::add_seed`], [`FastMarching::add_seed_ijk`],
//!    [`FastMarching::add_seeds_from_image`]);
//! 4. 反复调用 [`FastMarching::evolve`] 扩展波前, 用 [`FastMarching::show`]
//!    浏览结果. 浏览时回退的部分在下一次演化前被撤销 ("泄漏" 重放).
//!
//! 实现按职责拆分在多个 `impl` 块中:
//!
//! - 邻域统计量: `neighbourhood.rs`;
//! - 速度与 Eikonal 更新: `eikonal.rs`;
//! - 种子: `seed.rs`;
//! - 结果浏览与撤销: `show.rs`.

use std::fmt;

use log::{debug, error, info, warn};
use ndarray::{Array3, ArrayView3};

use crate::consts::{
    DATE_VERSION, GRANULARITY_PROGRESS, INF, LABEL_BACKGROUND, MAJOR_VERSION, MINOR_VERSION,
};
use crate::grid::FACE_Z_PLUS;
use crate::{
    Connectivity, FmError, FmResult, Grid, Ijk, MarchParams, StatisticalModel, Tweak, VolumeData,
};

mod eikonal;
mod heap;
mod neighbourhood;
mod node;
mod seed;
mod show;

pub use heap::HeapViolation;
pub use node::FmStatus;

use heap::MinHeap;
use neighbourhood::UNCOMPUTED;
use node::FmNode;

/// 引擎当前所处的阶段.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MarchMode {
    /// 尚未演化. 种子在队列中等待.
    #[default]
    Idle,

    /// 最近一次操作是演化. 已知点历史的末尾即为波前位置.
    Expanding,

    /// 最近一次操作是 `show`. 游标之后的已知点在下一次演化前会被撤销.
    Scrubbing,
}

/// 一次演化的结果.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Evolution {
    /// 实际完成的步数.
    pub steps: usize,

    /// 演化是否因为波前无处可去而提前结束.
    pub exhausted: bool,

    /// 最后一个被确定的体素的到达时间.
    pub last_arrival: Option<f32>,
}

/// 交互式 Fast Marching 引擎.
///
/// 引擎持有驱动图像与输出标签的一份拷贝. 所有调用必须顺序进行.
#[derive(Clone, Debug)]
pub struct FastMarching {
    grid: Grid,
    depth: usize,

    nodes: Vec<FmNode>,
    median: Vec<i32>,
    inhomo: Vec<i32>,

    in_data: Vec<i16>,
    out_data: Vec<i16>,

    heap: MinHeap,
    known_points: Vec<usize>,
    seeds: Vec<usize>,

    pdf_intensity: StatisticalModel,
    pdf_inhomo: StatisticalModel,

    ras_to_ijk: [[f64; 4]; 4],
    label: i16,
    params: MarchParams,

    /// 驱动图像曾经不合法. 直到重新 `init` 之前, 所有操作都不做任何事.
    invalid_inputs: bool,
    volumes_set: bool,

    /// 下一次演化是否需要先把种子本身的统计量加入模型.
    first_call: bool,
    mode: MarchMode,

    /// 已经显示到的已知点位置. `None` 代表一个都没有显示.
    cursor: Option<usize>,

    speed_warned: bool,
    empty_heap_logged: bool,
}

const IDENTITY: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// 生命周期实现块
impl FastMarching {
    /// 为 `(dim_x, dim_y, dim_z)` 网格, 体素间距 `spacing` 创建引擎.
    /// 驱动图像的取值应位于 `0..=depth`.
    ///
    /// 引擎在 [`Self::set_volumes`] 成功之前没有有效输入.
    pub fn new(dims: (usize, usize, usize), depth: usize, spacing: [f64; 3]) -> FmResult<Self> {
        let grid = Grid::new(dims, spacing)?;
        let len = grid.len();
        debug!("engine allocated for {dims:?} voxels, spacing {spacing:?}, depth {depth}");

        Ok(Self {
            grid,
            depth,
            nodes: vec![FmNode::FAR; len],
            median: vec![0; len],
            inhomo: vec![UNCOMPUTED; len],
            in_data: vec![0; len],
            out_data: vec![LABEL_BACKGROUND; len],
            heap: MinHeap::default(),
            known_points: Vec::new(),
            seeds: Vec::new(),
            pdf_intensity: StatisticalModel::new(depth),
            pdf_inhomo: StatisticalModel::new(depth),
            ras_to_ijk: IDENTITY,
            label: 1,
            params: MarchParams::default(),
            invalid_inputs: false,
            volumes_set: false,
            first_call: true,
            mode: MarchMode::Idle,
            cursor: None,
            speed_warned: false,
            empty_heap_logged: false,
        })
    }

    /// 以新的几何重新初始化. 活动标签和 RAS -> IJK 矩阵保留, 其它状态全部丢弃,
    /// 参数恢复为默认值. 之前的 "输入无效" 状态被清除.
    ///
    /// 几何不合法时返回 `Err`, 引擎保持原状.
    pub fn init(
        &mut self,
        dims: (usize, usize, usize),
        depth: usize,
        spacing: [f64; 3],
    ) -> FmResult<()> {
        let mut fresh = Self::new(dims, depth, spacing)?;
        fresh.label = self.label;
        fresh.ras_to_ijk = self.ras_to_ijk;
        *self = fresh;
        Ok(())
    }

    /// 设置驱动图像和输出标签, 并完成逐体素的初始化:
    /// 输出标签非零的体素为 `Done`, 边界带为 `Out`, 其它为 `Far`.
    ///
    /// 驱动图像必须是 `i16`, 两者形状都必须与网格一致. 否则引擎进入
    /// "输入无效" 状态并返回 `Err`, 直到下一次 [`Self::init`].
    pub fn set_volumes(&mut self, input: &VolumeData, labels: ArrayView3<'_, i16>) -> FmResult<()> {
        if self.invalid_inputs {
            return Err(FmError::NotInitialized);
        }
        let expected = self.grid.shape();

        let scan = match input {
            VolumeData::I16(scan) => scan,
            other => {
                let found = other.scalar_type();
                error!("driving image scalars are {found:?} instead of i16");
                self.invalid_inputs = true;
                return Err(FmError::UnsupportedScalarType(found));
            }
        };
        for found in [scan.dim(), labels.dim()] {
            if found != expected {
                error!("volume shape {found:?} does not match grid shape {expected:?}");
                self.invalid_inputs = true;
                return Err(FmError::ShapeMismatch { expected, found });
            }
        }

        self.in_data = scan.iter().copied().collect();
        self.out_data = labels.iter().copied().collect();

        let depth = self.depth as i32;
        for (index, p) in self.grid.iter_ijk().enumerate() {
            let node = &mut self.nodes[index];
            *node = FmNode::FAR;
            self.inhomo[index] = UNCOMPUTED;
            if self.out_data[index] != LABEL_BACKGROUND {
                node.status = FmStatus::Done;
            }
            if self.grid.in_band(p) {
                node.status = FmStatus::Out;
                self.inhomo[index] = depth;
                self.median[index] = 0;
            }
        }

        self.heap = MinHeap::default();
        self.known_points.clear();
        self.seeds.clear();
        self.pdf_intensity.reset();
        self.pdf_inhomo.reset();
        self.first_call = true;
        self.mode = MarchMode::Idle;
        self.cursor = None;
        self.volumes_set = true;

        info!(
            "volumes set: {:?} voxels, {} already labelled",
            self.grid.dims(),
            self.out_data.iter().filter(|&&v| v != LABEL_BACKGROUND).count()
        );
        Ok(())
    }

    /// 引擎是否有有效输入.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.invalid_inputs && self.volumes_set
    }

    #[inline]
    fn ensure_valid(&self) -> FmResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(FmError::NotInitialized)
        }
    }
}

/// 演化实现块
impl FastMarching {
    /// 将波前中到达时间最小的体素确定下来, 并更新它的邻居.
    ///
    /// 返回该体素的到达时间. 波前为空, 或剩下的体素都不可达 (`T >= INF`) 时返回 `None`.
    pub fn step(&mut self) -> Option<f32> {
        if !self.is_valid() {
            return None;
        }

        let Some(min) = self.heap.pop_min(&mut self.nodes) else {
            if !self.empty_heap_logged {
                warn!("step called with an empty front");
                self.empty_heap_logged = true;
            }
            return None;
        };

        let t = self.nodes[min].t;
        if t >= INF {
            // 只剩下撤销时被推到堆尾的体素, 波前自然到达之前不考虑它们.
            debug!("front exhausted at voxel {min} (T = INF)");
            self.nodes[min].status = FmStatus::Far;
            return None;
        }

        self.collect_info(min);
        self.nodes[min].status = FmStatus::Known;
        self.known_points.push(min);

        for n in 1..=self.params.connectivity.count() {
            let nb = self.grid.neighbour(min, n);
            match self.nodes[nb].status {
                FmStatus::Far => {
                    self.nodes[nb].t = self.compute_t(nb);
                    self.nodes[nb].status = FmStatus::Trial;
                    self.heap.insert(&mut self.nodes, nb);
                }
                FmStatus::Trial => {
                    let old = self.nodes[nb].t;
                    let new = self.compute_t(nb);
                    self.nodes[nb].t = new;
                    if let Some(leaf) = self.nodes[nb].leaf {
                        if new < old {
                            self.heap.up(&mut self.nodes, leaf);
                        } else {
                            self.heap.down(&mut self.nodes, leaf);
                        }
                    }
                }
                _ => {}
            }
        }
        Some(t)
    }

    /// 最多演化 `n` 步. 见 [`Self::evolve_with_progress`].
    #[inline]
    pub fn evolve(&mut self, n: usize) -> FmResult<Evolution> {
        self.evolve_with_progress(n, |_| {})
    }

    /// 最多演化 `n` 步, 并以 `[0, 1)` 内的比例回调进度 (最多 50 次).
    ///
    /// 1. 第一次演化前, 每个种子自身的统计量加入模型并更新模型.
    ///    此时没有种子则返回 `Err(FmError::NoSeeds)`, 下次调用时重试.
    ///    `n == 0` 时只做这一步;
    /// 2. 若刚刚浏览过结果且游标落后于历史末尾, 撤销游标之后的点;
    /// 3. 种植队列中的种子, 然后逐步演化. 每一步之后模型的窗口容量
    ///    被设为当前波前大小的 5 倍.
    pub fn evolve_with_progress<F>(&mut self, n: usize, mut progress: F) -> FmResult<Evolution>
    where
        F: FnMut(f32),
    {
        self.ensure_valid()?;

        if self.first_call {
            if self.seeds.is_empty() {
                error!("cannot start an evolution without seed points");
                return Err(FmError::NoSeeds);
            }
            self.first_call = false;
            for i in 0..self.seeds.len() {
                self.collect_info(self.seeds[i]);
            }
            self.pdf_intensity.update();
            self.pdf_inhomo.update();
        }

        let mut evolution = Evolution::default();
        if n == 0 {
            return Ok(evolution);
        }

        if self.mode == MarchMode::Scrubbing {
            self.retract_scrubbed();
        }
        self.mode = MarchMode::Expanding;

        while let Some(index) = self.seeds.pop() {
            self.set_seed(index);
        }
        self.min_heap_is_sorted();

        let rate = Some(n / 100);
        self.pdf_intensity.set_update_rate(rate);
        self.pdf_inhomo.set_update_rate(rate);

        for i in 0..n {
            if (i * GRANULARITY_PROGRESS) % n == 0 {
                progress(i as f32 / n as f32);
            }

            let t = self.step();

            // 统计量只取自波前附近的一层.
            let memory = Some(5 * self.heap.len());
            self.pdf_intensity.set_memory(memory);
            self.pdf_inhomo.set_memory(memory);

            match t {
                Some(t) => {
                    evolution.steps += 1;
                    evolution.last_arrival = Some(t);
                }
                None => {
                    info!("nowhere else to go, end of evolution");
                    evolution.exhausted = true;
                    break;
                }
            }
        }
        self.min_heap_is_sorted();

        info!(
            "evolution of {} steps done, {} known points, front size {}",
            evolution.steps,
            self.known_points.len(),
            self.heap.len()
        );
        Ok(evolution)
    }
}

/// 查询实现块
impl FastMarching {
    /// 待种植的种子个数加上波前大小. 没有有效输入时为 0.
    #[inline]
    pub fn n_valid_seeds(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.seeds.len() + self.heap.len()
    }

    /// 已知点个数. 没有有效输入时为 0.
    #[inline]
    pub fn n_known_points(&self) -> usize {
        if !self.is_valid() {
            return 0;
        }
        self.known_points.len()
    }

    /// 按确定顺序排列的已知点线性索引.
    #[inline]
    pub fn known_points(&self) -> &[usize] {
        &self.known_points
    }

    /// 网格几何.
    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// 驱动图像取值上限.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 体素 `p` 的状态. `p` 越界时 panic.
    #[inline]
    pub fn status(&self, p: Ijk) -> FmStatus {
        self.nodes[self.grid.index(p)].status
    }

    /// 体素 `p` 的到达时间. 未到达时为 [`INF`]. `p` 越界时 panic.
    #[inline]
    pub fn arrival_time(&self, p: Ijk) -> f32 {
        self.nodes[self.grid.index(p)].t
    }

    /// 输出标签的只读视图, `(z, h, w)` 排列.
    pub fn label_map(&self) -> ArrayView3<'_, i16> {
        // 该操作不会生成 `Err`, 可直接 unwrap.
        ArrayView3::from_shape(self.grid.shape(), &self.out_data).unwrap()
    }

    /// 取出输出标签, `(z, h, w)` 排列.
    pub fn into_label_map(self) -> Array3<i16> {
        // 该操作不会生成 `Err`, 可直接 unwrap.
        Array3::from_shape_vec(self.grid.shape(), self.out_data).unwrap()
    }

    /// 活动标签.
    #[inline]
    pub fn label(&self) -> i16 {
        self.label
    }

    /// 设置 [`Self::show`] 写入输出标签的值.
    #[inline]
    pub fn set_active_label(&mut self, label: i16) {
        self.label = label;
    }

    /// 当前阶段.
    #[inline]
    pub fn mode(&self) -> MarchMode {
        self.mode
    }

    /// 已经显示到的已知点位置.
    #[inline]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// 当前参数.
    #[inline]
    pub fn params(&self) -> &MarchParams {
        &self.params
    }

    /// 整体替换参数. 平滑系数同时写入两个统计模型.
    pub fn set_params(&mut self, params: MarchParams) {
        self.params = params;
        self.pdf_intensity
            .set_sigma2_smooth_pdf(params.sigma2_smooth_pdf);
        self.pdf_inhomo.set_sigma2_smooth_pdf(params.sigma2_smooth_pdf);
    }

    /// 设置波前扩展邻域.
    #[inline]
    pub fn set_connectivity(&mut self, connectivity: Connectivity) {
        self.params.connectivity = connectivity;
    }

    /// 按名字调整参数. 见 [`Tweak`].
    pub fn tweak(&mut self, name: &str, value: f64) -> FmResult<()> {
        let tweak = name.parse::<Tweak>().map_err(|e| {
            error!("tweak parameter '{name}' not recognized");
            e
        })?;
        self.params.apply(tweak, value);
        if tweak == Tweak::Sigma2SmoothPdf {
            self.pdf_intensity.set_sigma2_smooth_pdf(value);
            self.pdf_inhomo.set_sigma2_smooth_pdf(value);
        }
        Ok(())
    }

    /// 中值强度的统计模型.
    #[inline]
    pub fn intensity_model(&self) -> &StatisticalModel {
        &self.pdf_intensity
    }

    /// 不均匀度的统计模型.
    #[inline]
    pub fn inhomogeneity_model(&self) -> &StatisticalModel {
        &self.pdf_inhomo
    }
}

/// 诊断实现块
impl FastMarching {
    /// 检查最小堆的两条不变量.
    #[inline]
    pub fn check_heap(&self) -> Result<(), HeapViolation> {
        self.heap.validate(&self.nodes)
    }

    /// 同 [`Self::check_heap`], 但把破坏点记录到日志并返回 `bool`.
    pub fn min_heap_is_sorted(&self) -> bool {
        match self.check_heap() {
            Ok(()) => true,
            Err(violation) => {
                error!(
                    "min-heap invariant broken (size {}): {violation:?}",
                    self.heap.len()
                );
                false
            }
        }
    }

    /// `"主版本.次版本 \t(日期)"`.
    pub fn version_string() -> String {
        format!("{MAJOR_VERSION}.{MINOR_VERSION} \t({DATE_VERSION})")
    }

    /// 主版本号.
    #[inline]
    pub fn major_version() -> u32 {
        MAJOR_VERSION
    }

    /// 体素 `p` 的 "父亲": 6 个面邻居中到达时间最小的那个.
    ///
    /// 只考虑面邻居, 沿对角线回溯会得到拓扑上不一致的路径.
    /// `p` 位于边界带, 或没有任何已到达的面邻居时返回 `None`.
    pub fn father_of(&self, p: Ijk) -> Option<Ijk> {
        if self.grid.in_band(p) {
            return None;
        }
        let index = self.grid.index(p);
        let mut t_min = INF;
        let mut father = None;
        for n in 1..=FACE_Z_PLUS {
            let nb = self.grid.neighbour(index, n);
            if self.nodes[nb].t < t_min {
                t_min = self.nodes[nb].t;
                father = Some(nb);
            }
        }
        father.map(|i| self.grid.ijk(i))
    }

    /// 从 `p` 沿父亲回溯, 直到到达时间为 0 的种子. 路径包含两端.
    ///
    /// `p` 尚未到达时返回空路径. 回溯在到达时间不再严格下降时停止.
    pub fn trace_to_seed(&self, p: Ijk) -> Vec<Ijk> {
        let mut path = Vec::new();
        let mut t = self.arrival_time(p);
        if t >= INF {
            return path;
        }

        let mut current = p;
        path.push(current);
        while t > 0.0 {
            let Some(father) = self.father_of(current) else {
                break;
            };
            let t_father = self.arrival_time(father);
            if t_father >= t {
                break;
            }
            path.push(father);
            current = father;
            t = t_father;
        }
        path
    }
}

impl fmt::Display for FastMarching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y, z) = self.grid.dims();
        let [dx, dy, dz] = self.grid.spacing();
        writeln!(f, "FastMarching {}", Self::version_string())?;
        writeln!(f, "    dims: {x} x {y} x {z}")?;
        writeln!(f, "    spacing: {dx} x {dy} x {dz}")?;
        writeln!(f, "    depth: {}", self.depth)?;
        writeln!(f, "    label: {}", self.label)?;
        writeln!(f, "    mode: {:?}", self.mode)?;
        writeln!(f, "    known points: {}", self.n_known_points())?;
        write!(f, "    valid seeds: {}", self.n_valid_seeds())
    }
}
