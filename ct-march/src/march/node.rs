use crate::consts::INF;

/// 体素在 Fast Marching 中的状态.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FmStatus {
    /// 已被其它标签占据, 波前不会进入.
    Done,

    /// 到达时间已确定.
    Known,

    /// 位于波前 (在最小堆中), 到达时间为暂定值.
    Trial,

    /// 尚未被波前触及.
    Far,

    /// 边界带体素, 永远不参与计算.
    Out,
}

/// 单个体素的动态状态.
#[derive(Copy, Clone, Debug)]
pub(crate) struct FmNode {
    pub status: FmStatus,

    /// 到达时间. 未定义时为 [`INF`].
    pub t: f32,

    /// 该体素在最小堆数组中的位置. 不在堆中时为 `None`.
    pub leaf: Option<usize>,
}

impl FmNode {
    pub const FAR: FmNode = FmNode {
        status: FmStatus::Far,
        t: INF,
        leaf: None,
    };
}
