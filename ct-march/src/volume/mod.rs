//! 引擎的输入图像.
//!
//! 所有数据均以 `(z, h, w)` 排列的 `Array3` 保存, 与 [`crate::Grid`] 的线性索引一致.

use ndarray::Array3;
use num::Zero;

use crate::{Idx3d, Ijk};

mod nii;

pub use nii::NiftiVolume;

/// 体素标量类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScalarType {
    /// `i16`. 驱动图像唯一接受的类型.
    I16,
    /// `u16`.
    U16,
    /// `u8`.
    U8,
    /// `f32`.
    F32,
    /// 其它类型, 参数为 NIfTI datatype 代码.
    Other(i16),
}

impl ScalarType {
    /// 由 NIfTI header 中的 datatype 代码得到标量类型.
    pub fn from_nifti_code(code: i16) -> Self {
        match code {
            2 => ScalarType::U8,
            4 => ScalarType::I16,
            16 => ScalarType::F32,
            512 => ScalarType::U16,
            other => ScalarType::Other(other),
        }
    }
}

/// 单通道 3D 图像.
#[derive(Clone, Debug)]
pub enum VolumeData {
    /// `i16` 图像.
    I16(Array3<i16>),
    /// `u16` 图像.
    U16(Array3<u16>),
    /// `u8` 图像.
    U8(Array3<u8>),
    /// `f32` 图像.
    F32(Array3<f32>),
}

#[inline]
fn nonzero<T: Zero>(data: &Array3<T>) -> Vec<Ijk> {
    data.indexed_iter()
        .filter(|(_, v)| !v.is_zero())
        .map(|(zhw, _)| Ijk::from_zhw(zhw))
        .collect()
}

impl VolumeData {
    /// 标量类型.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            VolumeData::I16(_) => ScalarType::I16,
            VolumeData::U16(_) => ScalarType::U16,
            VolumeData::U8(_) => ScalarType::U8,
            VolumeData::F32(_) => ScalarType::F32,
        }
    }

    /// `(z, h, w)` 格式的形状.
    pub fn shape(&self) -> Idx3d {
        match self {
            VolumeData::I16(a) => a.dim(),
            VolumeData::U16(a) => a.dim(),
            VolumeData::U8(a) => a.dim(),
            VolumeData::F32(a) => a.dim(),
        }
    }

    /// 按内存顺序列出所有非零体素的坐标.
    pub fn nonzero_ijk(&self) -> Vec<Ijk> {
        match self {
            VolumeData::I16(a) => nonzero(a),
            VolumeData::U16(a) => nonzero(a),
            VolumeData::U8(a) => nonzero(a),
            VolumeData::F32(a) => nonzero(a),
        }
    }

    /// 若为 `i16` 图像, 返回其引用.
    #[inline]
    pub fn as_i16(&self) -> Option<&Array3<i16>> {
        match self {
            VolumeData::I16(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Array3<i16>> for VolumeData {
    fn from(value: Array3<i16>) -> Self {
        VolumeData::I16(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_codes() {
        assert_eq!(ScalarType::from_nifti_code(4), ScalarType::I16);
        assert_eq!(ScalarType::from_nifti_code(512), ScalarType::U16);
        assert_eq!(ScalarType::from_nifti_code(2), ScalarType::U8);
        assert_eq!(ScalarType::from_nifti_code(16), ScalarType::F32);
        assert_eq!(ScalarType::from_nifti_code(64), ScalarType::Other(64));
    }

    #[test]
    fn test_nonzero_ijk() {
        let mut a = Array3::<u16>::zeros((3, 4, 5));
        a[(2, 1, 0)] = 9;
        a[(0, 3, 4)] = 1;
        let v = VolumeData::U16(a);
        assert_eq!(v.shape(), (3, 4, 5));
        assert_eq!(v.scalar_type(), ScalarType::U16);
        assert_eq!(v.nonzero_ijk(), vec![Ijk::new(4, 3, 0), Ijk::new(0, 1, 2)]);
        assert!(v.as_i16().is_none());

        let f = VolumeData::F32(Array3::from_elem((2, 2, 2), 0.5));
        assert_eq!(f.nonzero_ijk().len(), 8);
    }
}
