//! 通用常量.

/// "无穷大" 到达时间. 该值在 `f32` 下是有限的,
/// 因此 `INF - INF == 0`, 二次方程系数的构造不会产生 NaN.
pub const INF: f32 = 1e20;

/// 网格每个面上永久标记为 `Out` 的边界带宽度 (体素数).
pub const BAND_OUT: usize = 3;

/// 输出标签中背景的体素值.
pub const LABEL_BACKGROUND: i16 = 0;

/// 速度的数值调理系数.
pub const SPEED_SCALE: f64 = 1e10;

/// 速度下限. 保证 `距离 / 速度` 远小于 [`INF`].
pub const MIN_SPEED: f64 = 1.0 / (INF as f64 / 1e6);

/// 当窗口样本数小于 `GAUSSIAN_FALLBACK_FACTOR * sqrt(variance)` 时,
/// 统计模型使用高斯密度而非直方图.
pub const GAUSSIAN_FALLBACK_FACTOR: f64 = 50.0;

/// 统计模型自动更新频率的下限.
pub const MIN_UPDATE_RATE: usize = 10;

/// 进度回调的粒度. 每次演化最多回调这么多次.
pub const GRANULARITY_PROGRESS: usize = 50;

/// 引擎主版本号.
pub const MAJOR_VERSION: u32 = 3;

/// 引擎次版本号.
pub const MINOR_VERSION: u32 = 1;

/// 引擎版本日期.
pub const DATE_VERSION: &str = "2003-1-27";
