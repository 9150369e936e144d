//! 运行时错误.

use crate::{Ijk, ScalarType};
use thiserror::Error;

/// 引擎配置或调用错误.
///
/// 数值上的退化情况 (速度非有限, 二次方程无实根, 堆为空) 不属于错误,
/// 它们在局部被吸收.
#[derive(Debug, Error)]
pub enum FmError {
    /// 引擎尚未成功 `init`, 或驱动图像无效.
    #[error("engine has no valid inputs")]
    NotInitialized,

    /// 网格维度或体素间距不合法.
    #[error("invalid grid geometry: dims {dims:?}, spacing {spacing:?}")]
    InvalidGeometry {
        /// `(dim_x, dim_y, dim_z)`.
        dims: (usize, usize, usize),
        /// `(dx, dy, dz)`.
        spacing: [f64; 3],
    },

    /// 数据形状与网格不一致. 形状按 `(z, h, w)` 给出.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 网格形状.
        expected: (usize, usize, usize),
        /// 实际数据形状.
        found: (usize, usize, usize),
    },

    /// 不支持的标量类型.
    #[error("unsupported scalar type {0:?}")]
    UnsupportedScalarType(ScalarType),

    /// 图像不是单通道的. 参数为实际通道数.
    #[error("image has {0} scalar components instead of 1")]
    ComponentCount(usize),

    /// 种子不在网格内部区域.
    #[error("seed {0:?} is outside the image volume")]
    SeedOutOfRange(Ijk),

    /// 演化开始时没有任何待种植的种子.
    #[error("no seed points to start the evolution from")]
    NoSeeds,

    /// 未知的可调参数名.
    #[error("tweak parameter '{0}' not recognized")]
    UnknownTweak(String),

    /// `show` 的比例不在 `[0, 1]` 内.
    #[error("show ratio {0} is outside [0, 1]")]
    InvalidScrubRatio(f32),

    /// NIfTI 读取错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),
}

/// 引擎运行时错误.
pub type FmResult<T> = Result<T, FmError>;
