//! 消融实验依赖的通用组件.

use ct_march::VolumeData;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 将 `i16` 扫描平移到以 0 为下界的区间, 返回平移后的扫描和引擎需要的 `depth`.
///
/// 超出 `i16` 范围的差值被截断. 扫描不是 `i16` 时返回 `None`.
pub fn shift_to_non_negative(scan: &VolumeData) -> Option<(VolumeData, usize)> {
    let data = scan.as_i16()?;
    let min = data.iter().copied().min().unwrap_or(0) as i32;
    let shifted = data.mapv(|v| (v as i32 - min).min(i16::MAX as i32) as i16);
    let depth = shifted.iter().copied().max().unwrap_or(0) as usize + 1;
    Some((VolumeData::I16(shifted), depth))
}
