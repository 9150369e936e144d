//! 程序运行函数.

use crate::profile::Profile;
use crate::result::AblationResult;
use ct_march::prelude::*;
use log::info;
use ndarray::Array3;
use std::thread;
use std::time::Instant;
use utils::loader::{self, Case};

/// 引擎需要的全部输入. 各线程共享.
struct Inputs {
    dims: (usize, usize, usize),
    spacing: [f64; 3],
    ras_to_ijk: Option<[[f64; 4]; 4]>,
    depth: usize,
    scan: VolumeData,
    seeds: VolumeData,
    steps: usize,
}

impl Inputs {
    fn prepare(case: Case, steps: usize) -> Self {
        let (scan, depth) =
            utils::shift_to_non_negative(case.scan.data()).expect("Scan must be stored as i16");
        Self {
            dims: case.scan.dims(),
            spacing: case.scan.spacing(),
            ras_to_ijk: case.scan.ras_to_ijk(),
            depth,
            scan,
            seeds: case.seeds,
            steps,
        }
    }
}

/// 用 `connectivity` 演化一次.
fn march(inputs: &Inputs, connectivity: Connectivity) -> FmResult<Profile> {
    let since = Instant::now();
    let mut fm = FastMarching::new(inputs.dims, inputs.depth, inputs.spacing)?;
    if let Some(m) = inputs.ras_to_ijk {
        fm.set_ras_to_ijk(m);
    }
    fm.set_connectivity(connectivity);
    fm.set_volumes(&inputs.scan, Array3::zeros(inputs.scan.shape()).view())?;
    fm.precompute_neighbourhood_stats();

    let seeds = fm.add_seeds_from_image(&inputs.seeds)?;
    let evolution = fm.evolve_with_progress(inputs.steps, |p| {
        info!("{connectivity:?}: {:.0}%", p * 100.0);
    })?;
    fm.show(1.0)?;

    let labelled = fm
        .label_map()
        .iter()
        .filter(|&&v| v != LABEL_BACKGROUND)
        .count();
    let model = fm.intensity_model();

    Ok(Profile {
        seeds,
        steps: evolution.steps,
        exhausted: evolution.exhausted,
        last_arrival: evolution.last_arrival,
        labelled,
        intensity: (model.mean(), model.variance()),
        clamped: model.clamped_count() + fm.inhomogeneity_model().clamped_count(),
        elapsed: since.elapsed(),
    })
}

/// 实际运行.
pub fn run() -> AblationResult {
    let case = loader::load_case_from_env_or_home().expect("Loading scan/seeds error");
    let inputs = Inputs::prepare(case, loader::steps_from_env());
    info!(
        "{:?} voxels, depth {}, {} steps",
        inputs.dims, inputs.depth, inputs.steps
    );

    println!("Running ablation studies...");
    let connectivities = [Connectivity::Face6, Connectivity::Full26];
    let names = ["face6", "full26"];
    let inputs = &inputs;

    let profiles: Vec<FmResult<Profile>> = if utils::cpus() > 1 {
        thread::scope(|s| {
            let handles = connectivities.map(|c| s.spawn(move || march(inputs, c)));
            handles
                .into_iter()
                .map(|th| th.join().expect("Thread joining error"))
                .collect()
        })
    } else {
        connectivities.iter().map(|&c| march(inputs, c)).collect()
    };

    AblationResult::from_iter(names.into_iter().zip(profiles))
}
