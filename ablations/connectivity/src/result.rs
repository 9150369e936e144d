//! 实验结果.

use crate::profile::Profile;
use ct_march::FmResult;
use std::io::{self, Write};

/// 将 `profile` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, p: &Profile, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Profile `{name}`:")?;
    writeln!(w, "{S4}Seeds added: {}", p.seeds)?;
    writeln!(w, "{S4}Steps: {} (exhausted: {})", p.steps, p.exhausted)?;
    writeln!(
        w,
        "{S4}Last arrival time: {}",
        f64_to_display(p.last_arrival.map(f64::from))
    )?;
    writeln!(w, "{S4}Labelled voxels: {}", p.labelled)?;
    writeln!(
        w,
        "{S4}Intensity model: mean {:.3}, variance {:.3}",
        p.intensity.0, p.intensity.1
    )?;
    writeln!(w, "{S4}Clamped realizations: {}", p.clamped)?;
    writeln!(w, "{S4}Total time: {} us", p.elapsed.as_micros())?;
    write!(
        w,
        "{S4}Average step time: {} us",
        f64_to_display(p.avg_step_us())
    )?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    data: Vec<(&'static str, FmResult<Profile>)>,
}

impl AblationResult {
    pub fn from_iter<I: IntoIterator<Item = (&'static str, FmResult<Profile>)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, profile) in self.data.iter() {
            match profile {
                Ok(p) => {
                    describe_into(key, p, &mut buf).unwrap();
                    println!("{}", String::from_utf8_lossy(&buf));
                    buf.clear();
                }
                Err(e) => println!("Profile `{key}` failed: {e}"),
            }

            utils::sep();
        }
    }
}
