//! 引擎可调参数.

use crate::grid::{N_FACES, N_FULL};
use crate::FmError;
use std::str::FromStr;

/// 波前扩展时考察的邻域.
///
/// 只影响 `step` 的邻居发现, 撤销回退点, `compute_t` 的退化分支以及
/// `init_new_expansion`. 种子种植永远使用 26-邻域, 二次方程永远使用 6 个面邻居.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Connectivity {
    /// 6 个面邻居.
    #[default]
    Face6,

    /// 3x3x3 去掉中心的 26 个邻居.
    Full26,
}

impl Connectivity {
    /// 邻居个数.
    #[inline]
    pub const fn count(self) -> usize {
        match self {
            Connectivity::Face6 => N_FACES,
            Connectivity::Full26 => N_FULL,
        }
    }
}

/// 引擎参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarchParams {
    /// 直方图平滑带宽与样本方差之比. 同时作用于两个统计模型.
    pub sigma2_smooth_pdf: f64,

    /// 速度函数的指数.
    pub power_speed: f64,

    /// 波前扩展邻域.
    pub connectivity: Connectivity,
}

impl Default for MarchParams {
    fn default() -> Self {
        Self {
            sigma2_smooth_pdf: 1.0,
            power_speed: 1.0,
            connectivity: Connectivity::Face6,
        }
    }
}

/// 可以通过名字调整的参数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tweak {
    /// `"sigma2SmoothPDF"`.
    Sigma2SmoothPdf,

    /// `"powerSpeed"`.
    PowerSpeed,
}

impl FromStr for Tweak {
    type Err = FmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sigma2SmoothPDF" => Ok(Tweak::Sigma2SmoothPdf),
            "powerSpeed" => Ok(Tweak::PowerSpeed),
            _ => Err(FmError::UnknownTweak(s.to_string())),
        }
    }
}

impl MarchParams {
    /// 将 `value` 写入 `tweak` 对应的字段.
    #[inline]
    pub fn apply(&mut self, tweak: Tweak, value: f64) {
        match tweak {
            Tweak::Sigma2SmoothPdf => self.sigma2_smooth_pdf = value,
            Tweak::PowerSpeed => self.power_speed = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tweak_names() {
        assert_eq!("sigma2SmoothPDF".parse::<Tweak>().unwrap(), Tweak::Sigma2SmoothPdf);
        assert_eq!("powerSpeed".parse::<Tweak>().unwrap(), Tweak::PowerSpeed);
        let err = "speedPower".parse::<Tweak>().unwrap_err();
        assert!(matches!(err, FmError::UnknownTweak(name) if name == "speedPower"));
    }

    #[test]
    fn test_apply() {
        let mut p = MarchParams::default();
        assert_eq!(p.connectivity.count(), 6);
        p.apply(Tweak::PowerSpeed, 0.5);
        p.apply(Tweak::Sigma2SmoothPdf, 4.0);
        assert_eq!(p.power_speed, 0.5);
        assert_eq!(p.sigma2_smooth_pdf, 4.0);
        assert_eq!(Connectivity::Full26.count(), 26);
    }
}
