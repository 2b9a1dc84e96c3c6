use std::fmt::Write as _;
use std::path::Path;

use crate::job::{JobDescriptor, OutputLayout};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSettings {
    pub account: String,
    pub queue: String,
    pub wall_time: String,
    pub email: Option<String>,
    pub omp_num_threads: usize,
    pub run_command: String,
    pub executable: String,
    pub build_command: String,
    // Run after the solver as
    // `<cmd> <output_dir> <base_path> <region>/<job_name> <prefix> --gauges <n>`.
    pub max_surge_command: Option<String>,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        ScriptSettings {
            account: "apam".to_string(),
            queue: String::new(),
            wall_time: "10:30:00".to_string(),
            email: None,
            omp_num_threads: num_cpus::get(),
            run_command: "python $CLAW/clawutil/src/python/clawutil/runclaw.py".to_string(),
            executable: "xgeoclaw".to_string(),
            build_command: "make .exe".to_string(),
            max_surge_command: None,
        }
    }
}

/// `(restart, overwrite)`. Always complements.
pub fn restart_flags(restart: bool) -> (&'static str, &'static str) {
    if restart { ("T", "F") } else { ("F", "T") }
}

pub fn render(
    job: &JobDescriptor,
    layout: &OutputLayout,
    settings: &ScriptSettings,
    base_path: &Path,
) -> String {
    let mut script = String::new();
    // Writing into a String cannot fail.
    let _ = write_script(&mut script, job, layout, settings, base_path);
    script
}

fn write_script(
    s: &mut String,
    job: &JobDescriptor,
    layout: &OutputLayout,
    settings: &ScriptSettings,
    base_path: &Path,
) -> std::fmt::Result {
    let (restart, overwrite) = restart_flags(job.is_restart());
    writeln!(s, "#!/bin/sh")?;
    writeln!(s, "#SBATCH --account {:<18} # Job account", settings.account)?;
    writeln!(s, "#SBATCH -J {:<24} # Job name", job.prefix)?;
    writeln!(s, "#SBATCH -o {:<24} # Job log", layout.log_path.display())?;
    writeln!(s, "#SBATCH -n 1                        # Total number of tasks")?;
    writeln!(s, "#SBATCH -N 1                        # Total number of nodes")?;
    writeln!(s, "#SBATCH -p {:<24} # queue", settings.queue)?;
    writeln!(s, "#SBATCH -t {:<24} # run time (hh:mm:ss)", settings.wall_time)?;
    if let Some(email) = &settings.email {
        writeln!(s, "#SBATCH --mail-user={}", email)?;
    }
    writeln!(s)?;
    writeln!(s, "# OpenMP controls")?;
    writeln!(s, "export OMP_NUM_THREADS={}", settings.omp_num_threads)?;
    writeln!(s)?;
    writeln!(s, "{} # Construct executable", settings.build_command)?;
    writeln!(s)?;
    writeln!(s, "# Run command")?;
    writeln!(
        s,
        "{} {} {} {} {} {} True",
        settings.run_command,
        settings.executable,
        layout.output_dir.display(),
        overwrite,
        restart,
        layout.data_dir.display()
    )?;
    // Gauge-less regions have nothing to extract.
    let gauges = job.solver.gauges.len();
    if let Some(cmd) = settings.max_surge_command.as_ref().filter(|_| gauges > 0) {
        writeln!(s)?;
        writeln!(s, "# Extract maximum surge")?;
        writeln!(
            s,
            "{} {} {} {}/{} {} --gauges {}",
            cmd,
            layout.output_dir.display(),
            base_path.display(),
            job.region,
            job.name,
            job.prefix,
            gauges
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobParams;
    use crate::region::RegionProfile;
    use crate::solver::WindModel;
    use crate::track::tests::hourly_track;
    use std::sync::Arc;

    fn job(restart: bool, tracks: &Path, region: RegionProfile) -> JobDescriptor {
        let mut params = JobParams::new(WindModel::Slosh, 3, Arc::new(region), tracks);
        params.restart = restart;
        let track = hourly_track("t", &[30.0, 31.0]);
        JobDescriptor::build(42, track, WindModel::Slosh, &params).unwrap()
    }

    #[test]
    fn flags_are_complements() {
        for restart in [true, false] {
            let (r, o) = restart_flags(restart);
            assert_eq!(r == "T", o == "F");
            assert_ne!(r, o);
        }
    }

    #[test]
    fn script_carries_directives_and_run_line() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(false, dir.path(), RegionProfile::square_basin());
        let base = Path::new("/scratch");
        let layout = job.layout(base);
        let settings = ScriptSettings {
            email: Some("someone@example.org".to_string()),
            omp_num_threads: 8,
            queue: "short".to_string(),
            ..ScriptSettings::default()
        };

        let script = render(&job, &layout, &settings, base);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("#SBATCH -J 0042"));
        assert!(script.contains("#SBATCH -p short"));
        assert!(script.contains("#SBATCH --mail-user=someone@example.org"));
        assert!(script.contains("export OMP_NUM_THREADS=8"));
        assert!(script.contains("make .exe"));
        let run_line = format!(
            "xgeoclaw {} T F {} True",
            layout.output_dir.display(),
            layout.data_dir.display()
        );
        assert!(script.contains(&run_line), "{script}");
        assert!(!script.contains("Extract maximum surge"));
    }

    #[test]
    fn restart_job_flips_flags_and_omits_mail_without_email() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(true, dir.path(), RegionProfile::mumbai());
        let base = Path::new("/scratch");
        let layout = job.layout(base);
        let settings = ScriptSettings {
            max_surge_command: Some("surge_rs max-surge".to_string()),
            ..ScriptSettings::default()
        };

        let script = render(&job, &layout, &settings, base);
        assert!(script.contains(&format!(" {} F T ", layout.output_dir.display())));
        assert!(!script.contains("--mail-user"));
        assert!(script.contains(&format!(
            "surge_rs max-surge {} /scratch Mumbai/SLOSH-amr3 0042 --gauges 4",
            layout.output_dir.display()
        )));
    }

    #[test]
    fn max_surge_step_is_skipped_without_gauges() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(false, dir.path(), RegionProfile::square_basin());
        let base = Path::new("/scratch");
        let settings = ScriptSettings {
            max_surge_command: Some("surge_rs max-surge".to_string()),
            ..ScriptSettings::default()
        };

        let script = render(&job, &job.layout(base), &settings, base);
        assert!(!script.contains("max-surge"), "{script}");
    }
}
