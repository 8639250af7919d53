use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use log::LevelFilter;
use tempfile::NamedTempFile;

use framewatch::config::FramewatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FRAMEWATCH_CONFIG",
        "FRAMEWATCH_OUTPUT_DIR",
        "FRAMEWATCH_RESULTS_FILE",
        "FRAMEWATCH_WORKERS",
        "FRAMEWATCH_LOG_LEVEL",
        "FRAMEWATCH_INTERMEDIATE",
        "FRAMEWATCH_DETECTOR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        output_dir = "/var/lib/framewatch"
        results_file = "targets.jsonl"
        intermediate = true
        detector = "motion"
        log_level = "warn"

        [pipeline]
        workers = 3
        ingest_capacity = 40
        poll_interval_ms = 10
        initial_latency_ms = 250.0
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("FRAMEWATCH_CONFIG", file.path());
    std::env::set_var("FRAMEWATCH_WORKERS", "6");
    std::env::set_var("FRAMEWATCH_INTERMEDIATE", "off");

    let cfg = FramewatchConfig::load().expect("load config");

    assert_eq!(cfg.output_dir, PathBuf::from("/var/lib/framewatch"));
    assert_eq!(cfg.results_file, "targets.jsonl");
    assert_eq!(
        cfg.results_path(),
        PathBuf::from("/var/lib/framewatch/targets.jsonl")
    );
    assert!(!cfg.intermediate);
    assert_eq!(cfg.detector, "motion");
    assert_eq!(cfg.log_level, LevelFilter::Warn);
    assert_eq!(cfg.workers, 6);
    assert_eq!(cfg.ingest_capacity, 40);
    assert_eq!(cfg.poll_interval, Duration::from_millis(10));
    assert_eq!(cfg.initial_latency_ms, 250.0);

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.workers, 6);
    assert_eq!(settings.ingest_capacity, 40);

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FramewatchConfig::load().expect("load defaults");

    assert_eq!(cfg.output_dir, PathBuf::from("./"));
    assert_eq!(cfg.results_file, "detections.jsonl");
    assert_eq!(cfg.detector, "color");
    assert_eq!(cfg.ingest_capacity, 20);
    assert_eq!(cfg.poll_interval, Duration::from_millis(30));
    assert_eq!(cfg.initial_latency_ms, 1000.0);
    assert!(cfg.workers >= 1);
    assert!(!cfg.intermediate);
}

#[test]
fn rejects_unknown_keys_and_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"buffer_size = 20\n").expect("write config");
    assert!(FramewatchConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[pipeline]\nworkers = 0\n").expect("write config");
    let err = FramewatchConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("workers must be greater than zero"));

    std::env::set_var("FRAMEWATCH_LOG_LEVEL", "loud");
    assert!(FramewatchConfig::load().is_err());

    clear_env();
}
