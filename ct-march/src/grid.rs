//! 体素网格几何: 维度, 间距, 线性索引以及 26-邻域偏移表.
//!
//! 线性索引按 `index = i + j * dim_x + k * dim_x * dim_y` 计算,
//! 与 `(z, h, w)` 排列的 `ndarray::Array3` 的内存顺序一致.

use crate::consts::BAND_OUT;
use crate::{FmError, FmResult, Idx3d};
use itertools::iproduct;

/// 邻居 0 是体素自身.
pub const NEIGHBOUR_SELF: usize = 0;

/// `-y` 面邻居.
pub const FACE_Y_MINUS: usize = 1;

/// `+x` 面邻居.
pub const FACE_X_PLUS: usize = 2;

/// `+y` 面邻居.
pub const FACE_Y_PLUS: usize = 3;

/// `-x` 面邻居.
pub const FACE_X_MINUS: usize = 4;

/// `-z` 面邻居.
pub const FACE_Z_MINUS: usize = 5;

/// `+z` 面邻居.
pub const FACE_Z_PLUS: usize = 6;

/// 面邻居个数.
pub const N_FACES: usize = 6;

/// 全邻域 (3x3x3 去掉中心) 邻居个数.
pub const N_FULL: usize = 26;

/// 27 个方向 `(di, dj, dk)`. 顺序固定: 自身, 6 个面, 12 条棱, 8 个角.
const DIRECTIONS: [(i8, i8, i8); 27] = [
    (0, 0, 0),
    // 面
    (0, -1, 0),
    (1, 0, 0),
    (0, 1, 0),
    (-1, 0, 0),
    (0, 0, -1),
    (0, 0, 1),
    // 棱
    (0, -1, 1),
    (0, -1, -1),
    (0, 1, 1),
    (0, 1, -1),
    (-1, 0, 1),
    (-1, 0, -1),
    (1, 0, 1),
    (1, 0, -1),
    (1, -1, 0),
    (1, 1, 0),
    (-1, 1, 0),
    (-1, -1, 0),
    // 角
    (1, -1, -1),
    (1, -1, 1),
    (1, 1, -1),
    (1, 1, 1),
    (-1, 1, -1),
    (-1, 1, 1),
    (-1, -1, -1),
    (-1, -1, 1),
];

/// 体素坐标 `(i, j, k)`, 分别对应 x (宽), y (高), z (切片) 方向.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Ijk {
    /// x 方向.
    pub i: usize,
    /// y 方向.
    pub j: usize,
    /// z 方向.
    pub k: usize,
}

impl Ijk {
    /// 构建体素坐标.
    #[inline]
    pub const fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    /// 转换为 `(z, h, w)` 格式的 `ndarray` 下标.
    #[inline]
    pub const fn to_zhw(self) -> Idx3d {
        (self.k, self.j, self.i)
    }

    /// 由 `(z, h, w)` 格式的 `ndarray` 下标构建.
    #[inline]
    pub const fn from_zhw((z, h, w): Idx3d) -> Self {
        Self { i: w, j: h, k: z }
    }
}

/// 体素网格几何. 创建后不可变.
#[derive(Clone, Debug)]
pub struct Grid {
    dim_x: usize,
    dim_y: usize,
    dim_z: usize,
    dim_xy: usize,
    dim_xyz: usize,
    spacing: [f64; 3],
    inv_d2: [f64; 3],
    shift: [isize; 27],
    distance: [f64; 27],
}

impl Grid {
    /// 由维度 `(dim_x, dim_y, dim_z)` 和体素间距 `[dx, dy, dz]` 构建网格.
    ///
    /// 维度必须非零, 间距必须为正的有限值, 否则返回 `Err(FmError::InvalidGeometry)`.
    pub fn new(dims: (usize, usize, usize), spacing: [f64; 3]) -> FmResult<Self> {
        let (dim_x, dim_y, dim_z) = dims;
        let bad_dims = dim_x == 0 || dim_y == 0 || dim_z == 0;
        let bad_spacing = spacing.iter().any(|d| !d.is_finite() || *d <= 0.0);
        if bad_dims || bad_spacing || isize::try_from(dim_x * dim_y * dim_z).is_err() {
            return Err(FmError::InvalidGeometry { dims, spacing });
        }

        let dim_xy = dim_x * dim_y;
        let [dx, dy, dz] = spacing;

        let mut shift = [0isize; 27];
        let mut distance = [0.0f64; 27];
        for (n, &(di, dj, dk)) in DIRECTIONS.iter().enumerate() {
            let (di, dj, dk) = (di as isize, dj as isize, dk as isize);
            shift[n] = di + dj * dim_x as isize + dk * dim_xy as isize;
            distance[n] = ((di * di) as f64 * dx * dx
                + (dj * dj) as f64 * dy * dy
                + (dk * dk) as f64 * dz * dz)
                .sqrt();
        }

        Ok(Self {
            dim_x,
            dim_y,
            dim_z,
            dim_xy,
            dim_xyz: dim_xy * dim_z,
            spacing,
            inv_d2: [1.0 / (dx * dx), 1.0 / (dy * dy), 1.0 / (dz * dz)],
            shift,
            distance,
        })
    }

    /// `(dim_x, dim_y, dim_z)`.
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.dim_x, self.dim_y, self.dim_z)
    }

    /// `(z, h, w)` 格式的数据形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (self.dim_z, self.dim_y, self.dim_x)
    }

    /// 体素总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.dim_xyz
    }

    /// 网格是否为空. 由 [`Self::new`] 构建的网格永远非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dim_xyz == 0
    }

    /// `[dx, dy, dz]`, 单位通常为毫米.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// `[1/dx^2, 1/dy^2, 1/dz^2]`.
    #[inline]
    pub(crate) fn inv_spacing2(&self) -> [f64; 3] {
        self.inv_d2
    }

    /// 坐标对应的线性索引. 坐标越界时结果无意义.
    #[inline]
    pub fn index(&self, p: Ijk) -> usize {
        p.i + p.j * self.dim_x + p.k * self.dim_xy
    }

    /// 线性索引对应的坐标.
    #[inline]
    pub fn ijk(&self, index: usize) -> Ijk {
        Ijk {
            i: index % self.dim_x,
            j: (index / self.dim_x) % self.dim_y,
            k: index / self.dim_xy,
        }
    }

    /// 坐标是否可以作为种子: 每个轴上满足 `1 <= c <= dim - 2`,
    /// 即完整的 27-邻域都在网格内.
    #[inline]
    pub fn is_seedable(&self, p: Ijk) -> bool {
        let ok = |c: usize, dim: usize| c >= 1 && c + 1 < dim;
        ok(p.i, self.dim_x) && ok(p.j, self.dim_y) && ok(p.k, self.dim_z)
    }

    /// 坐标是否位于宽度为 [`BAND_OUT`] 的边界带内.
    #[inline]
    pub fn in_band(&self, p: Ijk) -> bool {
        let out = |c: usize, dim: usize| c < BAND_OUT || c + BAND_OUT >= dim;
        out(p.i, self.dim_x) || out(p.j, self.dim_y) || out(p.k, self.dim_z)
    }

    /// 按内存顺序迭代所有坐标.
    pub fn iter_ijk(&self) -> impl Iterator<Item = Ijk> {
        iproduct!(0..self.dim_z, 0..self.dim_y, 0..self.dim_x).map(|(k, j, i)| Ijk { i, j, k })
    }

    /// 线性索引 `index` 的第 `n` 个邻居 (`0..=26`).
    ///
    /// 调用者需保证 `index` 不在网格最外层, 否则结果无意义.
    #[inline]
    pub fn neighbour(&self, index: usize, n: usize) -> usize {
        index.wrapping_add_signed(self.shift[n])
    }

    /// 到第 `n` 个邻居的物理距离.
    #[inline]
    pub fn distance(&self, n: usize) -> f64 {
        self.distance[n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_grid_invalid_geometry() {
        assert!(Grid::new((0, 4, 4), [1.0; 3]).is_err());
        assert!(Grid::new((4, 4, 4), [1.0, 0.0, 1.0]).is_err());
        assert!(Grid::new((4, 4, 4), [1.0, 1.0, f64::NAN]).is_err());
        assert!(Grid::new((4, 4, 4), [1.0, 1.0, -2.0]).is_err());
        assert!(Grid::new((4, 4, 4), [0.5, 1.0, 2.5]).is_ok());
    }

    #[test]
    fn test_index_round_trip() {
        let g = Grid::new((7, 5, 3), [1.0; 3]).unwrap();
        assert_eq!(g.index(Ijk::new(1, 2, 1)), 1 + 2 * 7 + 35);
        for (expected, p) in g.iter_ijk().enumerate() {
            assert_eq!(g.index(p), expected);
            assert_eq!(g.ijk(expected), p);
        }
        assert_eq!(g.iter_ijk().count(), g.len());
    }

    /// 每个偏移都必须落在与方向表一致的坐标上.
    #[test]
    fn test_neighbour_shift_matches_direction() {
        let g = Grid::new((9, 8, 7), [0.7, 1.1, 2.5]).unwrap();
        let center = Ijk::new(4, 4, 3);
        let c = g.index(center);
        for (n, &(di, dj, dk)) in DIRECTIONS.iter().enumerate() {
            let p = g.ijk(g.neighbour(c, n));
            assert_eq!(p.i as isize - center.i as isize, di as isize);
            assert_eq!(p.j as isize - center.j as isize, dj as isize);
            assert_eq!(p.k as isize - center.k as isize, dk as isize);
        }
    }

    #[test]
    fn test_anisotropic_distances() {
        let (dx, dy, dz) = (0.7, 1.1, 2.5);
        let g = Grid::new((9, 8, 7), [dx, dy, dz]).unwrap();
        assert!(f64_eq(g.distance(NEIGHBOUR_SELF), 0.0));
        assert!(f64_eq(g.distance(FACE_Y_MINUS), dy));
        assert!(f64_eq(g.distance(FACE_X_PLUS), dx));
        assert!(f64_eq(g.distance(FACE_Z_PLUS), dz));
        // 棱 7: (0, -1, 1)
        assert!(f64_eq(g.distance(7), (dy * dy + dz * dz).sqrt()));
        // 棱 15: (1, -1, 0)
        assert!(f64_eq(g.distance(15), (dx * dx + dy * dy).sqrt()));
        for n in 19..=N_FULL {
            assert!(f64_eq(g.distance(n), (dx * dx + dy * dy + dz * dz).sqrt()));
        }
    }

    #[test]
    fn test_seedable_and_band() {
        let g = Grid::new((10, 10, 10), [1.0; 3]).unwrap();
        assert!(!g.is_seedable(Ijk::new(0, 5, 5)));
        assert!(g.is_seedable(Ijk::new(1, 5, 5)));
        assert!(g.is_seedable(Ijk::new(8, 8, 8)));
        assert!(!g.is_seedable(Ijk::new(9, 5, 5)));

        assert!(g.in_band(Ijk::new(2, 5, 5)));
        assert!(!g.in_band(Ijk::new(3, 5, 5)));
        assert!(!g.in_band(Ijk::new(6, 6, 6)));
        assert!(g.in_band(Ijk::new(6, 7, 6)));

        let interior = g.iter_ijk().filter(|p| !g.in_band(*p)).count();
        assert_eq!(interior, 4 * 4 * 4);
    }

    #[test]
    fn test_zhw_conversion() {
        let p = Ijk::new(1, 2, 3);
        assert_eq!(p.to_zhw(), (3, 2, 1));
        assert_eq!(Ijk::from_zhw((3, 2, 1)), p);
    }
}
