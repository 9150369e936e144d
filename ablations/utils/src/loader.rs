//! 对 `ct_march::NiftiVolume` 的更一层封装. 提供更直接的实验数据加载器.

use ct_march::{FmResult, NiftiVolume, VolumeData};
use std::env;
use std::path::{Path, PathBuf};

/// 默认的演化步数.
pub const DEFAULT_STEPS: usize = 200_000;

/// 一次实验的输入: 扫描和种子标签.
#[derive(Debug)]
pub struct Case {
    /// 扫描, 带 header.
    pub scan: NiftiVolume,

    /// 种子标签. 非零体素即种子.
    pub seeds: VolumeData,
}

/// `$HOME/dataset/fm/<name>`.
fn home_dataset_file(name: &str) -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("dataset")
        .join("fm")
        .join(name)
}

/// 获取扫描路径.
///
/// 1. 若环境变量 `$FM_SCAN` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/fm/scan.nii`.
pub fn scan_path_from_env_or_home() -> PathBuf {
    match env::var("FM_SCAN") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => home_dataset_file("scan.nii"),
    }
}

/// 获取种子标签路径.
///
/// 1. 若环境变量 `$FM_SEEDS` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/fm/seeds.nii`.
pub fn seeds_path_from_env_or_home() -> PathBuf {
    match env::var("FM_SEEDS") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => home_dataset_file("seeds.nii"),
    }
}

/// 演化步数. 取 `$FM_STEPS`, 无法解析时为 [`DEFAULT_STEPS`].
pub fn steps_from_env() -> usize {
    env::var("FM_STEPS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_STEPS)
}

/// 加载扫描和种子标签.
pub fn load_case<P: AsRef<Path>, Q: AsRef<Path>>(scan: P, seeds: Q) -> FmResult<Case> {
    let scan = NiftiVolume::open(scan)?;
    let seeds = NiftiVolume::open(seeds)?.into_data();
    Ok(Case { scan, seeds })
}

/// 从 `$FM_SCAN`/`$FM_SEEDS` 或者 `$HOME/dataset/fm` 下加载实验数据.
#[inline]
pub fn load_case_from_env_or_home() -> FmResult<Case> {
    load_case(scan_path_from_env_or_home(), seeds_path_from_env_or_home())
}
