//! Whole-night pipeline runs over synthetic FITS nights on disk.

use approx::assert_abs_diff_eq;
use tempfile::TempDir;

use nocturne_core::config::Config;
use nocturne_core::frame::output_stem;
use nocturne_core::io::fits::{read_fits, CardValue};
use nocturne_core::keywords::Telescope;
use nocturne_core::reduce::{create_masters, reduce_night, NightStatus, SkipReason, UnitOutcome};
use nocturne_core::timecorr::SECONDS_PER_DAY;

mod common;
use common::{date, night_dir, test_config, write_raw_frame, RawFrame};

const INSTRUMENT: &str = "FLI-PL16801";
const CONFIG_STR: &str = "x0-4_1bin_y0-4_1bin";

/// Bias 100, darks 200 counts over 10s, V flats 5100 counts over 3s.
/// A 20s light then reduces as (5300 - 100 - 20 * 10) / 1.0 = 5000.
fn populate_calibration_night(dir: &std::path::Path) {
    for i in 0..3 {
        write_raw_frame(
            &dir.join(format!("bias{i}.fits")),
            &RawFrame {
                value: 100.0,
                ..Default::default()
            },
        );
    }
    for i in 0..2 {
        write_raw_frame(
            &dir.join(format!("dark{i}.fits")),
            &RawFrame {
                image_type: "DARK",
                exposure: 10.0,
                value: 200.0,
                ..Default::default()
            },
        );
    }
    for i in 0..2 {
        write_raw_frame(
            &dir.join(format!("flat{i}.fits")),
            &RawFrame {
                image_type: "FLAT",
                exposure: 3.0,
                filter: Some("V"),
                value: 5100.0,
                ..Default::default()
            },
        );
    }
}

fn light_frame<'a>(readout_mode: Option<&'a str>) -> RawFrame<'a> {
    RawFrame {
        image_type: "LIGHT",
        exposure: 20.0,
        filter: Some("V"),
        object: Some("NGC1514"),
        julian_date: 2_459_000.5,
        readout_mode,
        value: 5300.0,
    }
}

fn master_path(config: &Config, role: &str, day: u32, filter: Option<&str>) -> std::path::PathBuf {
    let ymd = format!("202306{day:02}");
    let name = match filter {
        Some(f) => format!("{role}_C28_{INSTRUMENT}_{ymd}_{CONFIG_STR}_{f}.fits"),
        None => format!("{role}_C28_{INSTRUMENT}_{ymd}_{CONFIG_STR}.fits"),
    };
    config.cal.path.join("C28").join(name)
}

#[test]
fn full_night_reduces_one_light_frame() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());
    let night = night_dir(root.path(), date(2023, 6, 15));

    populate_calibration_night(&night);
    write_raw_frame(&night.join("light0.fits"), &light_frame(None));

    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(summary.status, NightStatus::Completed);
    assert_eq!(summary.written(), 1);
    assert_eq!(summary.skipped_units(), 0);

    // Masters archived under the night's date.
    assert!(master_path(&config, "Bias", 15, None).is_file());
    assert!(master_path(&config, "Dark", 15, None).is_file());
    assert!(master_path(&config, "Flat", 15, Some("V")).is_file());

    let dark = read_fits(&master_path(&config, "Dark", 15, None)).unwrap();
    assert_eq!(dark.header.real("EXPTIME"), Some(1.0));
    assert_abs_diff_eq!(dark.data[[0, 0]], 10.0, epsilon = 1e-4);

    let flat = read_fits(&master_path(&config, "Flat", 15, Some("V"))).unwrap();
    assert_abs_diff_eq!(flat.data.mean().unwrap(), 1.0, epsilon = 1e-5);

    let out = night.join("reduced").join("NGC1514_2459000_5_V_C28.fits");
    assert!(out.is_file());
    let reduced = read_fits(&out).unwrap();
    assert_abs_diff_eq!(reduced.data[[2, 2]], 5000.0, epsilon = 1e-2);
    assert_eq!(reduced.header.text("OBJECT"), Some("NGC1514"));
    assert_eq!(reduced.header.text("FILTER"), Some("V"));
    assert_eq!(
        reduced.header.text("DEBIAS"),
        master_path(&config, "Bias", 15, None)
            .file_name()
            .and_then(|n| n.to_str())
    );
    assert!(reduced.header.get("TIMECORR").is_none());
}

#[test]
fn missing_darks_skip_the_unit() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());
    let night = night_dir(root.path(), date(2023, 6, 15));

    for i in 0..3 {
        write_raw_frame(
            &night.join(format!("bias{i}.fits")),
            &RawFrame {
                value: 100.0,
                ..Default::default()
            },
        );
    }
    write_raw_frame(
        &night.join("flat0.fits"),
        &RawFrame {
            image_type: "FLAT",
            exposure: 3.0,
            filter: Some("V"),
            value: 5100.0,
            ..Default::default()
        },
    );
    write_raw_frame(&night.join("light0.fits"), &light_frame(None));

    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(summary.status, NightStatus::Completed);
    assert_eq!(summary.written(), 0);
    assert_eq!(summary.skipped_units(), 1);
    assert!(matches!(
        summary.units[0],
        UnitOutcome::Skipped {
            reason: SkipReason::MissingDark,
            ..
        }
    ));
    assert!(!night.join("reduced").join("NGC1514_2459000_5_V_C28.fits").exists());
}

#[test]
fn rbi_flood_readout_shifts_the_timestamp() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());
    let night = night_dir(root.path(), date(2023, 6, 15));

    populate_calibration_night(&night);
    write_raw_frame(
        &night.join("light0.fits"),
        &light_frame(Some("8 MHz (RBI Flood)")),
    );

    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(summary.written(), 1);

    let corrected_jd = 2_459_000.5 + 4.0 / SECONDS_PER_DAY;
    let stem = output_stem("NGC1514", corrected_jd, "V", Telescope::C28);
    let out = night.join("reduced").join(format!("{stem}.fits"));
    assert!(out.is_file());

    let reduced = read_fits(&out).unwrap();
    assert_eq!(reduced.header.get("TIMECORR"), Some(&CardValue::Logical(true)));
    let jd = reduced.header.real("JD").unwrap();
    assert_abs_diff_eq!(jd, corrected_jd, epsilon = 1e-8);
}

#[test]
fn rerun_without_overwrite_keeps_existing_outputs() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());
    let night = night_dir(root.path(), date(2023, 6, 15));

    populate_calibration_night(&night);
    write_raw_frame(&night.join("light0.fits"), &light_frame(None));

    let first = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(first.written(), 1);

    let bias_path = master_path(&config, "Bias", 15, None);
    let out = night.join("reduced").join("NGC1514_2459000_5_V_C28.fits");
    let bias_bytes = std::fs::read(&bias_path).unwrap();
    let out_bytes = std::fs::read(&out).unwrap();

    let second = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(second.written(), 0);
    assert!(second.units.iter().any(|u| matches!(
        u,
        UnitOutcome::Reduced {
            written: 0,
            kept_existing: 1,
            ..
        }
    )));

    assert_eq!(std::fs::read(&bias_path).unwrap(), bias_bytes);
    assert_eq!(std::fs::read(&out).unwrap(), out_bytes);
}

#[test]
fn lights_fall_back_to_a_neighboring_nights_masters() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    // Calibration frames only on the 14th.
    let cal_night = night_dir(root.path(), date(2023, 6, 14));
    populate_calibration_night(&cal_night);
    create_masters(&config, Telescope::C28, date(2023, 6, 14)).unwrap();
    assert!(master_path(&config, "Flat", 14, Some("V")).is_file());

    // The 15th holds nothing but science frames.
    let night = night_dir(root.path(), date(2023, 6, 15));
    write_raw_frame(&night.join("light0.fits"), &light_frame(None));

    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(summary.status, NightStatus::Completed);
    assert_eq!(summary.written(), 1);

    // No masters materialize for the 15th itself.
    assert!(!master_path(&config, "Bias", 15, None).exists());

    let out = night.join("reduced").join("NGC1514_2459000_5_V_C28.fits");
    let reduced = read_fits(&out).unwrap();
    assert_abs_diff_eq!(reduced.data[[1, 3]], 5000.0, epsilon = 1e-2);
    assert_eq!(
        reduced.header.text("DEDARK"),
        master_path(&config, "Dark", 14, None)
            .file_name()
            .and_then(|n| n.to_str())
    );
}

#[test]
fn absent_and_empty_nights_degrade_to_warnings() {
    let root = TempDir::new().unwrap();
    let config = test_config(root.path());

    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    assert_eq!(summary.status, NightStatus::MissingNightFolder);
    assert!(summary.units.is_empty());

    night_dir(root.path(), date(2023, 6, 16));
    let summary = reduce_night(&config, Telescope::C28, date(2023, 6, 16)).unwrap();
    assert_eq!(summary.status, NightStatus::NoScienceFrames);

    // create_masters tolerates both cases too.
    create_masters(&config, Telescope::C28, date(2023, 6, 15)).unwrap();
    create_masters(&config, Telescope::C28, date(2023, 6, 16)).unwrap();
}
