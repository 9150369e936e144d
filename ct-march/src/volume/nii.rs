use std::path::Path;

use log::{debug, error};
use ndarray::{Array3, Axis};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::{ScalarType, VolumeData};
use crate::{FmError, FmResult, Idx3d};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 4x4 仿射矩阵, 行优先.
pub type Affine = [[f64; 4]; 4];

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 读取 `$volume` 为 `$t` 类型的 `(z, h, w)` 数组. 多余的长度为 1 的维度被去掉.
macro_rules! read_as {
    ($volume:expr, $t:ty, $shape:expr) => {{
        let mut data = $volume.into_ndarray::<$t>()?;
        while data.ndim() > 3 {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = data.permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        Array3::<$t>::from_shape_vec($shape, data.into_raw_vec()).unwrap()
    }};
}

/// nii 格式的单通道 3D 图像, 包括 header 和体素数据.
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    header: BoxedHeader,
    data: VolumeData,
}

impl NiftiVolume {
    /// 打开 nii 文件. 支持 `u8`, `i16`, `u16`, `f32` 体素.
    ///
    /// 多通道图像返回 `Err(FmError::ComponentCount)`,
    /// 其它体素类型返回 `Err(FmError::UnsupportedScalarType)`.
    pub fn open<P: AsRef<Path>>(path: P) -> FmResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // dim[4..] 之积为每个体素的分量个数.
        let rank = (header.dim[0] as usize).clamp(3, 7);
        let components: usize = header.dim[4..=rank]
            .iter()
            .map(|&d| (d as usize).max(1))
            .product();
        if components != 1 {
            error!("{:?} has {components} components per voxel", path.as_ref());
            return Err(FmError::ComponentCount(components));
        }

        let shape = get_shape_from_header(&header);
        let volume = obj.into_volume();
        let data = match ScalarType::from_nifti_code(header.datatype) {
            ScalarType::I16 => VolumeData::I16(read_as!(volume, i16, shape)),
            ScalarType::U16 => VolumeData::U16(read_as!(volume, u16, shape)),
            ScalarType::U8 => VolumeData::U8(read_as!(volume, u8, shape)),
            ScalarType::F32 => VolumeData::F32(read_as!(volume, f32, shape)),
            other => return Err(FmError::UnsupportedScalarType(other)),
        };
        debug!("{:?} opened: {:?} {:?}", path.as_ref(), data.scalar_type(), shape);

        Ok(Self { header, data })
    }

    /// 由 header 和数据直接构建.
    ///
    /// # 注意
    ///
    /// 该方法不检查两者是否一致, 你应仅将其用于实验目的.
    pub fn with_header(header: NiftiHeader, data: VolumeData) -> Self {
        Self {
            header: Box::new(header),
            data,
        }
    }

    /// 获取 header 部分.
    #[inline]
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// `(dim_x, dim_y, dim_z)`.
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        let (z, h, w) = get_shape_from_header(&self.header);
        (w, h, z)
    }

    /// 体素间距 `[dx, dy, dz]`, 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        let [_, dx, dy, dz, ..] = self.header.pixdim;
        [dx as f64, dy as f64, dz as f64]
    }

    /// IJK -> RAS 仿射矩阵.
    ///
    /// 优先使用 sform (`sform_code > 0`), 其次 qform (`qform_code > 0`),
    /// 都没有时退化为以体素间距为对角元的矩阵.
    pub fn ijk_to_ras(&self) -> Affine {
        let h = &self.header;
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(|v| v as f64);
            return [
                row(&h.srow_x),
                row(&h.srow_y),
                row(&h.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ];
        }

        let [dx, dy, dz] = self.spacing();
        if h.qform_code > 0 {
            let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
            let r = [
                [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
                [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
                [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
            ];
            let offset = [h.quatern_x as f64, h.quatern_y as f64, h.quatern_z as f64];
            let mut m = [[0.0; 4]; 4];
            for i in 0..3 {
                m[i] = [r[i][0] * dx, r[i][1] * dy, r[i][2] * dz * qfac, offset[i]];
            }
            m[3][3] = 1.0;
            return m;
        }

        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// RAS -> IJK 仿射矩阵, 即 [`Self::ijk_to_ras`] 的逆. 矩阵奇异时返回 `None`.
    pub fn ras_to_ijk(&self) -> Option<Affine> {
        invert_affine(&self.ijk_to_ras())
    }

    /// 获取体素数据.
    #[inline]
    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    /// 取出体素数据.
    #[inline]
    pub fn into_data(self) -> VolumeData {
        self.data
    }
}

/// 求最后一行为 `[0, 0, 0, 1]` 的仿射矩阵的逆.
fn invert_affine(m: &Affine) -> Option<Affine> {
    let a = |i: usize, j: usize| m[i][j];
    let cof = |i0: usize, i1: usize, j0: usize, j1: usize| a(i0, j0) * a(i1, j1) - a(i0, j1) * a(i1, j0);

    // 3x3 伴随矩阵.
    let adj = [
        [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    let det = a(0, 0) * adj[0][0] + a(0, 1) * adj[1][0] + a(0, 2) * adj[2][0];
    if det == 0.0 || !det.is_finite() {
        return None;
    }

    let mut inv = [[0.0; 4]; 4];
    for i in 0..3 {
        for j in 0..3 {
            inv[i][j] = adj[i][j] / det;
        }
        inv[i][3] = -(0..3).map(|j| inv[i][j] * m[j][3]).sum::<f64>();
    }
    inv[3][3] = 1.0;
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn apply(m: &Affine, p: [f64; 3]) -> [f64; 3] {
        let row = |r: &[f64; 4]| r[0] * p[0] + r[1] * p[1] + r[2] * p[2] + r[3];
        [row(&m[0]), row(&m[1]), row(&m[2])]
    }

    fn volume_with(header: NiftiHeader) -> NiftiVolume {
        NiftiVolume::with_header(header, VolumeData::I16(Array3::zeros((4, 3, 2))))
    }

    #[test]
    fn test_dims_and_spacing() {
        let mut header = NiftiHeader::default();
        header.dim = [3, 2, 3, 4, 1, 1, 1, 1];
        header.pixdim = [1.0, 0.5, 0.75, 2.5, 1.0, 1.0, 1.0, 1.0];
        let v = volume_with(header);
        assert_eq!(v.dims(), (2, 3, 4));
        assert_eq!(v.spacing(), [0.5, 0.75, 2.5]);
        assert_eq!(v.data().shape(), (4, 3, 2));
    }

    #[test]
    fn test_affine_sform() {
        let mut header = NiftiHeader::default();
        header.sform_code = 1;
        header.qform_code = 1;
        header.srow_x = [1.0, 0.0, 0.0, 10.0];
        header.srow_y = [0.0, 2.0, 0.0, 20.0];
        header.srow_z = [0.0, 0.0, 4.0, 30.0];
        let v = volume_with(header);

        let m = v.ijk_to_ras();
        assert_eq!(apply(&m, [1.0, 1.0, 1.0]), [11.0, 22.0, 34.0]);

        let inv = v.ras_to_ijk().unwrap();
        let p = apply(&inv, [11.0, 22.0, 34.0]);
        assert!(p.iter().all(|&c| f64_eq(c, 1.0)));
    }

    #[test]
    fn test_affine_qform() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 1;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        // 绕 z 轴旋转 180 度.
        header.quatern_d = 1.0;
        header.quatern_x = 5.0;
        header.quatern_y = 6.0;
        header.quatern_z = 7.0;
        let v = volume_with(header);

        let m = v.ijk_to_ras();
        let p = apply(&m, [1.0, 1.0, 1.0]);
        assert!(f64_eq(p[0], 3.0) && f64_eq(p[1], 3.0) && f64_eq(p[2], 11.0));

        let inv = v.ras_to_ijk().unwrap();
        let q = apply(&inv, p);
        assert!(q.iter().all(|&c| f64_eq(c, 1.0)));
    }

    #[test]
    fn test_affine_fallback_and_singular() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 0;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0];
        let v = volume_with(header.clone());
        assert_eq!(apply(&v.ijk_to_ras(), [1.0, 1.0, 1.0]), [2.0, 3.0, 4.0]);

        header.pixdim[2] = 0.0;
        assert!(volume_with(header).ras_to_ijk().is_none());
    }

    #[test]
    fn test_open_drops_unit_axes() {
        use nifti::writer::WriterOptions;

        // [W, H, z, t] = [2, 3, 4, 1].
        let written = ndarray::Array4::<i16>::from_shape_fn((2, 3, 4, 1), |(x, y, z, _)| {
            (x + 10 * y + 100 * z) as i16
        });
        let path = std::env::temp_dir().join(format!("ct-march-unit-axes-{}.nii", std::process::id()));
        WriterOptions::new(&path).write_nifti(&written).unwrap();

        let v = NiftiVolume::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(v.dims(), (2, 3, 4));
        let data = v.data().as_i16().unwrap();
        assert_eq!(data.dim(), (4, 3, 2));
        assert_eq!(data[(3, 2, 1)], 321);
        assert_eq!(data[(1, 0, 1)], 101);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            NiftiVolume::open("/definitely/not/here.nii"),
            Err(FmError::Nifti(_))
        ));
    }
}
