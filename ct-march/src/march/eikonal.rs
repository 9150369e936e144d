//! 速度函数与迎风格式的 Eikonal 更新.

use super::node::FmStatus;
use super::FastMarching;
use crate::consts::{INF, MIN_SPEED, SPEED_SCALE};
use crate::grid::{
    FACE_X_MINUS, FACE_X_PLUS, FACE_Y_MINUS, FACE_Y_PLUS, FACE_Z_MINUS, FACE_Z_PLUS,
};
use log::{error, warn};

/// Eikonal 实现块
impl FastMarching {
    /// `index` 处的传播速度.
    ///
    /// `(P_I(median)^2 * P_H(inhomogeneity))^power_speed * 1e10`.
    /// 非有限值被替换为 1 (只警告一次), 结果不小于 [`MIN_SPEED`].
    pub(crate) fn speed(&mut self, index: usize) -> f64 {
        let (med, inh) = self.median_inhomo(index);
        let p_i = self.pdf_intensity.value(med);
        let p_h = self.pdf_inhomo.value(inh);

        let mut s = (p_i * p_i * p_h).powf(self.params.power_speed) * SPEED_SCALE;
        if !s.is_finite() {
            if !self.speed_warned {
                warn!("speed at voxel {index} is not finite, using 1.0 instead");
                self.speed_warned = true;
            }
            s = 1.0;
        }
        s.max(MIN_SPEED)
    }

    /// 由 6 个面邻居的到达时间求解 `index` 处的到达时间.
    ///
    /// 每个轴只有在 "向内传播" (`Dm > 0 || Dp < 0`) 时才参与, 且取较早的那一侧.
    /// 方程退化 (没有参与的轴, 或判别式为负) 时,
    /// 退化为 `min(T_n + d_n / s)`, 其中 `n` 取遍当前邻域中 `Trial` 或 `Known` 的邻居.
    pub(crate) fn compute_t(&mut self, index: usize) -> f32 {
        let s = self.speed(index);
        let [inv_dx2, inv_dy2, inv_dz2] = self.grid.inv_spacing2();

        let t_at = |n: usize| self.nodes[self.grid.neighbour(index, n)].t as f64;
        let tij = self.nodes[index].t as f64;

        let mut a = 0.0;
        let mut b = 0.0;
        let mut c = -1.0 / (s * s);
        for (minus, plus, inv_d2) in [
            (FACE_X_MINUS, FACE_X_PLUS, inv_dx2),
            (FACE_Y_MINUS, FACE_Y_PLUS, inv_dy2),
            (FACE_Z_MINUS, FACE_Z_PLUS, inv_dz2),
        ] {
            let (tm, tp) = (t_at(minus), t_at(plus));
            let (dm, dp) = (tij - tm, tp - tij);
            if dm > 0.0 || dp < 0.0 {
                let tn = if dm > -dp { tm } else { tp };
                a += inv_d2;
                b += -2.0 * tn * inv_d2;
                c += tn * tn * inv_d2;
            }
        }

        let discr = b * b - 4.0 * a * c;
        if a == 0.0 || discr < 0.0 {
            return self.neighbour_min_t(index, s);
        }

        // 因果性要求取较大的根.
        ((-b + discr.sqrt()) / (2.0 * a)) as f32
    }

    fn neighbour_min_t(&self, index: usize, s: f64) -> f32 {
        let mut t = INF as f64;
        for n in 1..=self.params.connectivity.count() {
            let nb = &self.nodes[self.grid.neighbour(index, n)];
            if matches!(nb.status, FmStatus::Trial | FmStatus::Known) {
                t = t.min(nb.t as f64 + self.grid.distance(n) / s);
            }
        }
        if t < INF as f64 {
            t as f32
        } else {
            error!("voxel {index} has no reached neighbour to derive an arrival time from");
            INF
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{INF, MIN_SPEED};
    use crate::grid::{FACE_X_MINUS, FACE_Y_MINUS, FACE_Z_PLUS};
    use crate::march::node::FmStatus;
    use crate::march::tests::{engine_with, uniform_engine};
    use crate::Ijk;

    fn rel_eq(a: f64, b: f64) -> bool {
        ((a - b) / b).abs() < 1e-5
    }

    #[test]
    fn test_speed_uniform() {
        let mut fm = uniform_engine(10);
        let index = fm.grid.index(Ijk::new(5, 5, 5));
        fm.collect_info(index);
        fm.pdf_intensity.update();
        fm.pdf_inhomo.update();

        // 1 个样本, 方差下限为 1: 两个模型都返回峰值 1 / sqrt(2 pi).
        let peak = 1.0 / (2.0 * std::f64::consts::PI).sqrt();
        let expected = peak * peak * peak * 1e10;
        assert!(rel_eq(fm.speed(index), expected));
    }

    #[test]
    fn test_speed_clamped() {
        let mut fm = uniform_engine(10);
        let index = fm.grid.index(Ijk::new(5, 5, 5));
        // 模型均值为 0, 方差为 1, 中值 100 处的密度在 f64 下下溢为 0.
        fm.pdf_inhomo.update();
        assert_eq!(fm.speed(index), MIN_SPEED);

        fm.params.power_speed = f64::NAN;
        assert_eq!(fm.speed(index), 1.0);
        assert!(fm.speed_warned);
    }

    #[test]
    fn test_one_sided_update() {
        let mut fm = engine_with(10, |_| 100, 256);
        let p = fm.grid.index(Ijk::new(5, 5, 5));
        let xm = fm.grid.neighbour(p, FACE_X_MINUS);
        fm.nodes[xm].t = 0.0;
        fm.nodes[xm].status = FmStatus::Known;

        let s = fm.speed(p);
        let t = fm.compute_t(p) as f64;
        assert!(rel_eq(t, 1.0 / s));
    }

    #[test]
    fn test_two_sided_update() {
        let mut fm = engine_with(10, |_| 100, 256);
        let p = fm.grid.index(Ijk::new(5, 5, 5));
        for n in [FACE_X_MINUS, FACE_Y_MINUS] {
            let nb = fm.grid.neighbour(p, n);
            fm.nodes[nb].t = 0.0;
            fm.nodes[nb].status = FmStatus::Known;
        }

        // 2 T^2 = 1 / s^2.
        let s = fm.speed(p);
        let t = fm.compute_t(p) as f64;
        assert!(rel_eq(t, 1.0 / (s * 2f64.sqrt())));
    }

    #[test]
    fn test_anisotropic_update() {
        let mut fm = engine_with(10, |_| 100, 256);
        fm.grid = crate::Grid::new((10, 10, 10), [1.0, 1.0, 2.5]).unwrap();
        let p = fm.grid.index(Ijk::new(5, 5, 5));
        let zp = fm.grid.neighbour(p, FACE_Z_PLUS);
        fm.nodes[zp].t = 0.0;
        fm.nodes[zp].status = FmStatus::Known;

        // T^2 / dz^2 = 1 / s^2.
        let s = fm.speed(p);
        let t = fm.compute_t(p) as f64;
        assert!(rel_eq(t, 2.5 / s));
    }

    #[test]
    fn test_isolated_voxel() {
        let mut fm = engine_with(10, |_| 100, 256);
        let p = fm.grid.index(Ijk::new(5, 5, 5));
        assert_eq!(fm.compute_t(p), INF);
    }
}
