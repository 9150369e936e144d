//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Ijk};

pub use crate::{FmError, FmResult};

pub use crate::grid::Grid;
pub use crate::march::{Evolution, FastMarching, FmStatus, MarchMode};
pub use crate::params::{Connectivity, MarchParams, Tweak};
pub use crate::stat_model::StatisticalModel;
pub use crate::volume::{NiftiVolume, ScalarType, VolumeData};

pub use crate::consts::{INF, LABEL_BACKGROUND};
