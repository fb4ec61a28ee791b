use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use presence_monitor::config::{AggregatorConfig, MonitorConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PRESENCE_CONFIG",
        "PRESENCE_AGGREGATOR_URL",
        "PRESENCE_TRANSPORT",
        "PRESENCE_SOURCES",
        "PRESENCE_SELECT",
        "PRESENCE_CAPTURE_TIMEOUT_MS",
        "PRESENCE_CYCLE_INTERVAL_MS",
        "PRESENCE_DISCOVERY_WAIT_MS",
        "PRESENCE_REPORT_TIMEOUT_MS",
        "PRESENCE_DETECTION_THRESHOLD",
        "PRESENCE_DETECTOR",
        "PRESENCE_MODEL_PATH",
        "PRESENCE_BIND_IP",
        "PRESENCE_BIND_PORT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "monitor": {
            "aggregator_url": "http://10.0.0.5:5000/presence",
            "sources": ["stub://Board1", "stub://Board2"],
            "select": [2],
            "capture_timeout_ms": 250,
            "detection_threshold": 0.7
        },
        "aggregator": {
            "bind_ip": "127.0.0.1",
            "bind_port": 5050
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("PRESENCE_CONFIG", file.path());
    std::env::set_var("PRESENCE_CYCLE_INTERVAL_MS", "300");
    std::env::set_var("PRESENCE_SELECT", "1, 2");
    std::env::set_var("PRESENCE_BIND_PORT", "6000");

    let cfg = MonitorConfig::load().expect("load monitor config");
    assert_eq!(cfg.aggregator_url, "http://10.0.0.5:5000/presence");
    assert_eq!(cfg.sources, vec!["stub://Board1", "stub://Board2"]);
    assert_eq!(cfg.select, Some(vec![1, 2]));
    assert_eq!(cfg.capture_timeout, Duration::from_millis(250));
    assert_eq!(cfg.cycle_interval, Duration::from_millis(300));
    assert_eq!(cfg.discovery_wait, Duration::from_millis(1000));
    assert_eq!(cfg.detection_threshold, 0.7);

    let agg = AggregatorConfig::load().expect("load aggregator config");
    assert_eq!(agg.bind_addr().unwrap().to_string(), "127.0.0.1:6000");

    clear_env();
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[monitor]
transport = "synthetic"
sources = ["stub://CamA"]
cycle_interval_ms = 2000

[aggregator]
bind_port = 8080
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = MonitorConfig::load_from(file.path()).expect("load monitor config");
    assert_eq!(cfg.sources, vec!["stub://CamA"]);
    assert_eq!(cfg.cycle_interval, Duration::from_secs(2));
    assert_eq!(cfg.aggregator_url, "http://localhost:5000/presence");

    let agg = AggregatorConfig::load_from(file.path()).expect("load aggregator config");
    assert_eq!(agg.bind_ip, "0.0.0.0");
    assert_eq!(agg.bind_port, 8080);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PRESENCE_DETECTION_THRESHOLD", "2.0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("PRESENCE_CAPTURE_TIMEOUT_MS", "soon");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("PRESENCE_CAPTURE_TIMEOUT_MS", "0");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("PRESENCE_BIND_IP", "not-an-ip");
    assert!(AggregatorConfig::load().is_err());
    clear_env();
}
