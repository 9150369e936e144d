#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 3D CT 体素网格上的交互式 Fast Marching 分割引擎,
//! 以及驱动引擎速度函数的在线统计模型.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 引擎只接受单通道 `i16` 驱动图像 (与 CT HU 值的常见存储方式一致).
//!   其它标量类型会使引擎进入 "输入无效" 状态, 直到重新调用 `init`.
//! 2. 引擎内部不做任何线程同步. 同一引擎实例的所有调用必须顺序进行.
//! 3. 非期望的数值情况 (速度非有限, 二次方程退化, 堆为空) 均在局部被吸收,
//!   不会以 `Err` 或 panic 的形式传出.
//!
//! # 开发计划
//!
//! ### 在线统计模型 ✅
//!
//! 有界滑动窗口 + 自适应带宽的高斯核平滑直方图, 样本不足时退化为高斯密度.
//!
//! 实现位于 `ct-march/src/stat_model.rs`.
//!
//! ### 体素网格与 26-邻域偏移表 ✅
//!
//! 实现位于 `ct-march/src/grid.rs`.
//!
//! ### Fast Marching 主循环 ✅
//!
//! 带双向索引的二叉最小堆, 迎风格式的二次 Eikonal 求解, 种子管理.
//!
//! 实现位于 `ct-march/src/march/*`.
//!
//! ### 可回退的结果浏览 (scrub) 与 "泄漏" 重放 ✅
//!
//! `show(r)` 在已知点历史上前进/后退, 之后继续演化时会先撤销被回退的点.
//!
//! 实现位于 `ct-march/src/march/show.rs`.
//!
//! ### NIfTI 输入 ✅
//!
//! 读取扫描与种子标签, 由 header 计算 RAS -> IJK 仿射矩阵.
//!
//! 实现位于 `ct-march/src/volume/*`.
//!
//! ### 邻域统计量的并行预计算 ✅
//!
//! 需要打开 `rayon` feature.

/// 三维索引, 按 `(z, h, w)` 排列, 与 `ndarray::Array3` 的下标一致.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

mod error;
pub use error::{FmError, FmResult};

pub mod grid;
pub use grid::{Grid, Ijk};

pub mod stat_model;
pub use stat_model::StatisticalModel;

mod params;
pub use params::{Connectivity, MarchParams, Tweak};

pub mod march;
pub use march::{Evolution, FastMarching, FmStatus, HeapViolation, MarchMode};

pub mod volume;
pub use volume::{NiftiVolume, ScalarType, VolumeData};

pub mod prelude;
