use std::fs;

use event_study::Error;
use event_study::baseline::BaselineKind;
use event_study::config::load_config_path;
use event_study::models::window_spec::{Direction, WindowOffset};
use tempfile::TempDir;

#[test]
fn loads_a_study_file_from_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("study.toml");
    fs::write(
        &path,
        r#"
[calendar]
timezone = "Europe/London"
session_open = "08:00"
session_close = "16:30"

[baseline]
modes = ["pre_event", "prior_day", "pre_event"]

[windows.Post_2H]
offset = "2h"
direction = "post"

[windows.pre_3d]
offset = "3D"
direction = "pre"
"#,
    )
    .expect("write config");

    let cfg = load_config_path(&path).expect("config loads");
    let specs = cfg.window_specs();
    assert_eq!(specs[0].name, "post_2h");
    assert_eq!(specs[0].offset, WindowOffset::Hours(2));
    assert_eq!(specs[1].offset, WindowOffset::TradingDays(3));
    assert_eq!(specs[1].direction, Direction::Pre);
    assert_eq!(
        cfg.baseline.modes,
        vec![BaselineKind::PreEvent, BaselineKind::PriorDay]
    );

    let cal = cfg.session_calendar().expect("calendar");
    assert_eq!(cal.tz(), chrono_tz::Europe::London);
    assert_eq!(cal.session_open().to_string(), "08:00:00");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = load_config_path(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn bundled_demo_config_is_valid() {
    let cfg = load_config_path(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/study.toml"))
        .expect("demo config loads");
    let names: Vec<_> = cfg.windows.keys().map(String::as_str).collect();
    assert_eq!(names, ["pre_1d", "post_30m", "post_2h", "post_1d", "post_3d"]);
    assert!(cfg.strategy.is_some());
    assert_eq!(cfg.filter.min_confidence, Some(0.5));
}
