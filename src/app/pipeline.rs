//! The batch pipeline: discover files, process each in parallel, then do all
//! output aggregation on the calling thread.
//!
//! Per-file processing (load, segment, fit, render) runs on a rayon pool.
//! Everything that touches shared output state (sorting records, writing the
//! two summary CSVs, updating the failed-transit sidecar) happens afterwards
//! on one thread, so no file-level work ever contends on the exports.
//!
//! Failure layers:
//! - file-level errors (unreadable, malformed, bad ephemeris) mark that file
//!   failed and the run continues; the process exits 1 at the end.
//! - transit-level fit failures record the transit without fitted values and
//!   land in the sidecar; the plot is still rendered from the initial guess.
//!   Windows too sparse to plot at all are counted and the run continues.
//! - output errors (unwritable directory, failed PNG/CSV writes) abort the
//!   run with exit code 2.

use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{LightCurve, RunConfig, TransitWindow};
use crate::error::AppError;
use crate::fit::{fit_global_shape, fit_transit_t0, rms_residuals, FitOptions};
use crate::io::export::{
    write_curves_csv, write_transits_csv, CurveRecord, TransitRecord, CURVES_CSV, TRANSITS_CSV,
};
use crate::io::failed::{self, FailedTransits};
use crate::io::loader::load_light_curve;
use crate::model::ModelParams;
use crate::plot::{plot_filename, render_transit, PlotSpec, RenderOutcome};
use crate::report::{FileOutcome, FileStatus};
use crate::segment::segment;

/// Everything one file contributes to the run.
struct FileOutput {
    outcome: FileOutcome,
    transit_records: Vec<TransitRecord>,
    curve_record: Option<CurveRecord>,
    /// Replacement sidecar entry for this file (empty clears it).
    failed_indices: Option<Vec<usize>>,
}

/// Dry-run planning: load and segment only, no output of any kind.
pub fn plan(config: &RunConfig) -> Result<Vec<FileOutcome>, AppError> {
    let files = discover_files(config)?;
    let mut outcomes = Vec::with_capacity(files.len());
    for file in &files {
        let outcome = match load_and_segment(config, file) {
            Ok((_, windows)) => FileOutcome {
                file: file.clone(),
                status: FileStatus::Ok,
                transits: windows.len(),
                plots_written: 0,
                plots_skipped: 0,
                unfitted: 0,
                error: None,
            },
            Err(e) => failed_outcome(file, e),
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Run the full pipeline and return per-file outcomes.
pub fn run(config: &RunConfig) -> Result<Vec<FileOutcome>, AppError> {
    let files = discover_files(config)?;
    info!(count = files.len(), "processing input files");

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "cannot create output directory '{}': {e}",
                config.output_dir.display()
            ),
        )
    })?;

    let mut sidecar = failed::load(&config.output_dir);

    let outputs: Result<Vec<FileOutput>, AppError> = in_pool(config.jobs, || {
        files
            .par_iter()
            .map(|file| process_file(config, file, &sidecar))
            .collect()
    })?;
    let outputs = outputs?;

    // Single-threaded aggregation from here on.
    let mut transit_records = Vec::new();
    let mut curve_records = Vec::new();
    let mut outcomes = Vec::with_capacity(outputs.len());

    for output in outputs {
        transit_records.extend(output.transit_records);
        if let Some(record) = output.curve_record {
            curve_records.push(record);
        }
        if let Some(indices) = output.failed_indices {
            if indices.is_empty() {
                sidecar.remove(&output.outcome.file);
            } else {
                sidecar.insert(output.outcome.file.clone(), indices);
            }
        }
        outcomes.push(output.outcome);
    }

    transit_records.sort_by(|a, b| (&a.file, a.transit_index).cmp(&(&b.file, b.transit_index)));
    curve_records.sort_by(|a, b| a.file.cmp(&b.file));

    // Both tables are replaced wholesale every run, even when empty, so stale
    // rows from earlier runs can never linger.
    write_transits_csv(&config.output_dir.join(TRANSITS_CSV), &transit_records)?;
    write_curves_csv(&config.output_dir.join(CURVES_CSV), &curve_records)?;
    failed::store(&config.output_dir, &sidecar)?;

    Ok(outcomes)
}

/// Run `op` on a dedicated pool when a thread count was requested, otherwise
/// on the global pool.
fn in_pool<T: Send>(jobs: Option<usize>, op: impl FnOnce() -> T + Send) -> Result<T, AppError> {
    match jobs {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n.max(1))
                .build()
                .map_err(|e| AppError::new(2, format!("cannot build worker pool: {e}")))?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

/// Sorted basenames of the files to process.
fn discover_files(config: &RunConfig) -> Result<Vec<String>, AppError> {
    if !config.files.is_empty() {
        let mut files = config.files.clone();
        files.sort();
        files.dedup();
        return Ok(files);
    }

    let entries = std::fs::read_dir(&config.input_dir).map_err(|e| {
        AppError::new(
            2,
            format!(
                "cannot read input directory '{}': {e}",
                config.input_dir.display()
            ),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            AppError::new(2, format!("cannot read input directory entry: {e}"))
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
            if let Some(name) = path.file_name() {
                files.push(name.to_string_lossy().into_owned());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn load_and_segment(
    config: &RunConfig,
    file: &str,
) -> Result<(LightCurve, Vec<TransitWindow>), String> {
    let path = config.input_dir.join(file);
    let curve = load_light_curve(&path).map_err(|e| e.to_string())?;
    let seg = segment(&curve, config.window_mult).map_err(|e| e.to_string())?;
    Ok((curve, seg.windows))
}

fn failed_outcome(file: &str, error: String) -> FileOutcome {
    warn!(file, %error, "skipping file");
    FileOutcome {
        file: file.to_string(),
        status: FileStatus::Failed,
        transits: 0,
        plots_written: 0,
        plots_skipped: 0,
        unfitted: 0,
        error: Some(error),
    }
}

fn process_file(
    config: &RunConfig,
    file: &str,
    sidecar: &FailedTransits,
) -> Result<FileOutput, AppError> {
    let path = config.input_dir.join(file);
    let curve = match load_light_curve(&path) {
        Ok(curve) => curve,
        Err(e) => {
            return Ok(FileOutput {
                outcome: failed_outcome(file, e.to_string()),
                transit_records: Vec::new(),
                curve_record: None,
                failed_indices: None,
            });
        }
    };
    let seg = match segment(&curve, config.window_mult) {
        Ok(seg) => seg,
        Err(e) => {
            return Ok(FileOutput {
                outcome: failed_outcome(file, e.to_string()),
                transit_records: Vec::new(),
                curve_record: None,
                failed_indices: None,
            });
        }
    };

    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());

    let opts = FitOptions::default();
    let (rp_fitted, a_fitted) = if config.skip_fitting {
        (curve.params.rp, curve.params.a)
    } else {
        fit_global_shape(&curve, &seg.windows, &opts)
    };

    let previously_failed: HashSet<usize> = sidecar
        .get(file)
        .map(|v| v.iter().copied().collect())
        .unwrap_or_default();

    let mut transit_records = Vec::with_capacity(seg.windows.len());
    let mut failed_now = Vec::new();
    let mut plots_written = 0;
    let mut plots_skipped = 0;
    let mut unfitted = 0;

    for window in &seg.windows {
        let base = ModelParams::from_orbital(&curve.params, window.t0_expected, rp_fitted, a_fitted);

        let t0_fitted = if config.skip_fitting {
            None
        } else if !config.force && previously_failed.contains(&window.index) {
            // Known-bad from an earlier run; don't burn time refitting.
            failed_now.push(window.index);
            None
        } else {
            match fit_transit_t0(window, &base, curve.params.duration_d, &opts) {
                Ok(t0) => Some(t0),
                Err(e) => {
                    warn!(file, transit = window.index, error = %e, "fit failed");
                    failed_now.push(window.index);
                    None
                }
            }
        };

        let model = base.with_t0(t0_fitted.unwrap_or(window.t0_expected));
        let rms = t0_fitted.and_then(|t0| rms_residuals(window, &base, t0));
        if t0_fitted.is_none() {
            unfitted += 1;
        }

        let mut plot_file = plot_filename(&stem, window.index);
        let spec = PlotSpec {
            window,
            model: &model,
            width: config.plot_width,
            height: config.plot_height,
        };
        match render_transit(&config.output_dir.join(&plot_file), &spec, config.force)? {
            RenderOutcome::Written => plots_written += 1,
            RenderOutcome::Skipped => plots_skipped += 1,
            RenderOutcome::NoData => {
                // Nothing on disk for this transit; the row keeps an empty
                // plot reference.
                plots_skipped += 1;
                plot_file.clear();
            }
        }

        transit_records.push(TransitRecord {
            file: file.to_string(),
            transit_index: window.index,
            t0_expected: window.t0_expected,
            t0_fitted,
            ttv_minutes: t0_fitted.map(|t0| (t0 - window.t0_expected) * 1440.0),
            rp_fitted,
            a_fitted,
            rms_residuals: rms,
            period: curve.params.period_d,
            duration: curve.params.duration_d,
            inc: curve.params.inc_deg,
            u1: curve.params.u1,
            u2: curve.params.u2,
            plot_file,
        });
    }

    let curve_record = CurveRecord {
        file: file.to_string(),
        data_type: curve.kind.as_str().to_string(),
        object_name: curve.params.object_name.clone(),
        time_min: curve.time_min(),
        time_max: curve.time_max(),
        expected_transits: seg.expected.len(),
        found_transits: seg.windows.len(),
        period: curve.params.period_d,
        epoch: curve.params.epoch_bjd,
        duration: curve.params.duration_d,
        rp: curve.params.rp,
        a: curve.params.a,
        inc: curve.params.inc_deg,
        u1: curve.params.u1,
        u2: curve.params.u2,
        star_radius: curve.params.star_radius_rsol,
        teff: curve.params.teff_k,
        logg: curve.params.logg,
        noise_sigma: curve.params.noise_sigma,
        gt_n_spots: curve.ground_truth.n_spots,
        gt_spot_size_min: curve.ground_truth.spot_size_min,
        gt_spot_size_max: curve.ground_truth.spot_size_max,
        gt_spot_contrast: curve.ground_truth.spot_contrast,
        gt_moon_radius: curve.ground_truth.moon_radius,
        gt_moon_period: curve.ground_truth.moon_period_d,
        gt_moon_a: curve.ground_truth.moon_a,
        gt_ttv_amplitude: curve.ground_truth.ttv_amplitude_d,
        gt_ttv_period: curve.ground_truth.ttv_period_orbits,
        gt_ttv_phase: curve.ground_truth.ttv_phase_rad,
    };

    info!(
        file,
        transits = seg.windows.len(),
        plots_written,
        plots_skipped,
        unfitted,
        "file processed"
    );

    Ok(FileOutput {
        outcome: FileOutcome {
            file: file.to_string(),
            status: FileStatus::Ok,
            transits: seg.windows.len(),
            plots_written,
            plots_skipped,
            unfitted,
            error: None,
        },
        transit_records,
        curve_record: Some(curve_record),
        // With fitting skipped nothing was learned about these transits, so
        // the sidecar entry is left as-is.
        failed_indices: (!config.skip_fitting).then_some(failed_now),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::model_flux_at;

    /// Synthetic light curve covering `transits` consecutive transits.
    fn write_input(dir: &Path, name: &str, period: f64, epoch: f64, transits: usize) {
        let model = ModelParams {
            t0: 0.0,
            period,
            rp: 0.1,
            a: 8.0,
            inc_deg: 89.0,
            u1: 0.4,
            u2: 0.1,
            ecc: 0.0,
            w_deg: 90.0,
            exp_time: 0.0,
            supersample: 1,
        };

        let mut body = String::new();
        body.push_str(&format!("# Orbit Period (days): {period}\n"));
        body.push_str(&format!("# Transit Epoch (BJD): {epoch}\n"));
        body.push_str("# Transit Duration (days): 0.12\n");
        body.push_str("# Planet Radius (R_planet/R_star): 0.1\n");
        body.push_str("# Semi-major Axis (a/R_star): 8.0\n");
        body.push_str("# Orbital Inclination (deg): 89.0\n");
        body.push_str("# Limb Darkening Coefficient u1: 0.4\n");
        body.push_str("# Limb Darkening Coefficient u2: 0.1\n");
        body.push_str("# Exposure Time (days): 0\n");
        body.push_str("# Type: real\n");
        body.push_str("Tiempo [BJDS],Flujo\n");

        let cadence = 5.0 / 60.0 / 24.0;
        let mut t = epoch - 0.1;
        while t <= epoch + (transits - 1) as f64 * period + 0.1 {
            // Nearest transit epoch for this sample.
            let k = ((t - epoch) / period).round();
            let f = model_flux_at(&model.with_t0(epoch + k * period), t);
            body.push_str(&format!("{t:.8},{f:.8}\n"));
            t += cadence;
        }
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn config(input: &Path, output: &Path) -> RunConfig {
        RunConfig {
            input_dir: input.to_path_buf(),
            output_dir: output.to_path_buf(),
            files: Vec::new(),
            plot_width: 320,
            plot_height: 240,
            window_mult: 1.25,
            jobs: Some(2),
            skip_fitting: false,
            force: false,
            dry_run: false,
        }
    }

    #[test]
    fn skip_fitting_run_produces_plots_and_tables() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 5);
        write_input(input.path(), "kplr002.csv", 3.0, 200.0, 3);

        let mut config = config(input.path(), output.path());
        config.skip_fitting = true;

        let outcomes = run(&config).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == FileStatus::Ok));

        for (stem, count) in [("kplr001", 5), ("kplr002", 3)] {
            for i in 0..count {
                assert!(
                    output.path().join(plot_filename(stem, i)).exists(),
                    "missing plot {stem} #{i}"
                );
            }
        }

        let mut reader = csv::Reader::from_path(output.path().join(TRANSITS_CSV)).unwrap();
        let transits: Vec<TransitRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(transits.len(), 8);
        // Skipped fitting: fitted columns empty, shape columns carry catalog.
        assert!(transits.iter().all(|r| r.t0_fitted.is_none()));
        assert!(transits.iter().all(|r| r.ttv_minutes.is_none()));
        assert!(transits.iter().all(|r| r.rp_fitted == 0.1 && r.a_fitted == 8.0));
        // Sorted by (file, index).
        assert_eq!(transits[0].file, "kplr001.csv");
        assert_eq!(transits[0].transit_index, 0);
        assert_eq!(transits[7].file, "kplr002.csv");
        assert_eq!(transits[7].transit_index, 2);

        let mut reader = csv::Reader::from_path(output.path().join(CURVES_CSV)).unwrap();
        let curves: Vec<CurveRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].expected_transits, 5);
        assert_eq!(curves[0].found_transits, 5);
    }

    #[test]
    fn second_run_skips_existing_plots_and_rewrites_identical_tables() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 3);

        let mut config = config(input.path(), output.path());
        config.skip_fitting = true;

        let first = run(&config).unwrap();
        assert_eq!(first[0].plots_written, 3);
        assert_eq!(first[0].plots_skipped, 0);
        let transits_before = std::fs::read(output.path().join(TRANSITS_CSV)).unwrap();

        let second = run(&config).unwrap();
        assert_eq!(second[0].plots_written, 0);
        assert_eq!(second[0].plots_skipped, 3);
        let transits_after = std::fs::read(output.path().join(TRANSITS_CSV)).unwrap();
        assert_eq!(transits_before, transits_after);
    }

    #[test]
    fn fitted_run_recovers_mid_times_near_ephemeris() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 3);

        let config = config(input.path(), output.path());
        let outcomes = run(&config).unwrap();
        assert_eq!(outcomes[0].unfitted, 0);

        let mut reader = csv::Reader::from_path(output.path().join(TRANSITS_CSV)).unwrap();
        let transits: Vec<TransitRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(transits.len(), 3);
        for record in &transits {
            let t0 = record.t0_fitted.expect("mid-time should be fitted");
            // Data was generated on the ephemeris, so TTVs are tiny.
            assert!((t0 - record.t0_expected).abs() < 2e-3);
            let ttv = record.ttv_minutes.unwrap();
            assert!((ttv - (t0 - record.t0_expected) * 1440.0).abs() < 1e-9);
            assert!(ttv.abs() < 3.0);
            assert!(record.rms_residuals.unwrap() < 1e-3);
        }
    }

    #[test]
    fn malformed_file_fails_alone() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "good.csv", 2.0, 100.0, 3);
        std::fs::write(input.path().join("bad.csv"), "# no period here\nTime,Flux\n1,1\n2,1\n")
            .unwrap();

        let mut config = config(input.path(), output.path());
        config.skip_fitting = true;

        let outcomes = run(&config).unwrap();
        let bad = outcomes.iter().find(|o| o.file == "bad.csv").unwrap();
        let good = outcomes.iter().find(|o| o.file == "good.csv").unwrap();
        assert_eq!(bad.status, FileStatus::Failed);
        assert!(bad.error.as_deref().unwrap().contains("period"));
        assert_eq!(good.status, FileStatus::Ok);
        assert_eq!(good.plots_written, 3);

        // The failed file contributes no rows.
        let mut reader = csv::Reader::from_path(output.path().join(CURVES_CSV)).unwrap();
        let curves: Vec<CurveRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(curves.len(), 1);
        assert_eq!(curves[0].file, "good.csv");
    }

    #[test]
    fn lone_sample_windows_are_counted_not_fatal() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        // Two samples fifty days apart on a 10-day period: each lands alone
        // in its own transit window, leaving nothing to span a plot axis.
        let body = "\
# Orbit Period (days): 10.0
# Transit Epoch (BJD): 100.0
# Transit Duration (days): 0.2
# Type: real
Tiempo [BJDS],Flujo
100.0,0.99
150.0,0.99
";
        std::fs::write(input.path().join("sparse.csv"), body).unwrap();

        let config = config(input.path(), output.path());
        let outcomes = run(&config).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, FileStatus::Ok);
        assert_eq!(outcomes[0].transits, 2);
        assert_eq!(outcomes[0].plots_written, 0);
        assert_eq!(outcomes[0].unfitted, 2);
        assert!(!output.path().join(plot_filename("sparse", 0)).exists());
        assert!(!output.path().join(plot_filename("sparse", 1)).exists());

        // Rows are still exported, with empty plot references.
        let mut reader = csv::Reader::from_path(output.path().join(TRANSITS_CSV)).unwrap();
        let transits: Vec<TransitRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(transits.len(), 2);
        assert!(transits.iter().all(|r| r.t0_fitted.is_none()));
        assert!(transits.iter().all(|r| r.plot_file.is_empty()));
    }

    #[test]
    fn explicit_file_list_restricts_the_run() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 3);
        write_input(input.path(), "kplr002.csv", 3.0, 200.0, 3);

        let mut config = config(input.path(), output.path());
        config.skip_fitting = true;
        config.files = vec!["kplr002.csv".to_string()];

        let outcomes = run(&config).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].file, "kplr002.csv");
        assert!(!output.path().join(plot_filename("kplr001", 0)).exists());
    }

    #[test]
    fn dry_run_plan_touches_nothing() {
        let input = tempfile::tempdir().unwrap();
        let output_dir: PathBuf = input.path().join("out");
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 3);

        let mut config = config(input.path(), &output_dir);
        config.dry_run = true;

        let outcomes = plan(&config).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].transits, 3);
        assert!(!output_dir.exists());
    }

    #[test]
    fn failed_sidecar_entries_are_skipped_until_forced() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_input(input.path(), "kplr001.csv", 2.0, 100.0, 3);

        // Pretend transit 1 failed on an earlier run.
        let mut sidecar = FailedTransits::new();
        sidecar.insert("kplr001.csv".to_string(), vec![1]);
        std::fs::create_dir_all(output.path()).unwrap();
        failed::store(output.path(), &sidecar).unwrap();

        let config = config(input.path(), output.path());
        let outcomes = run(&config).unwrap();
        assert_eq!(outcomes[0].unfitted, 1);

        // The sidecar still lists it after the run.
        let reloaded = failed::load(output.path());
        assert_eq!(reloaded.get("kplr001.csv"), Some(&vec![1]));

        // Force retries it; this clean synthetic transit fits fine, so the
        // entry is cleared.
        let mut forced = config.clone();
        forced.force = true;
        let outcomes = run(&forced).unwrap();
        assert_eq!(outcomes[0].unfitted, 0);
        let reloaded = failed::load(output.path());
        assert!(!reloaded.contains_key("kplr001.csv"));
    }
}
