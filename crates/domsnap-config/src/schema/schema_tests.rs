use super::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.browser.endpoint, "http://localhost:9222");
    assert_eq!(config.capture.viewport_expansion, 0);
    assert_eq!(config.action.settle_delay_ms, 100);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_browser_config_default() {
    let browser = BrowserConfig::default();
    assert_eq!(browser.request_timeout_secs, 30);
}

#[test]
fn test_capture_config_default() {
    let capture = CaptureConfig::default();
    assert!(!capture.render_overlay);
    assert!(!capture.debug);
    assert_eq!(capture.stability_timeout_ms, 5000);
    assert_eq!(capture.stability_quiet_ms, 500);
    assert_eq!(capture.debounce_ms, 500);
    assert_eq!(capture.min_capture_interval_ms, 1000);
    assert_eq!(capture.overlay_throttle_ms, 16);
}

#[test]
fn test_action_config_default() {
    let action = ActionConfig::default();
    assert_eq!(action.action_delay_ms, 100);
    assert!(action.include_dynamic_attributes);
}

#[test]
fn test_serialize_config_default_order() {
    let serialize = SerializeConfig::default();
    assert_eq!(serialize.include_attributes.len(), 10);
    assert_eq!(serialize.include_attributes[0], "id");
    assert_eq!(serialize.include_attributes[9], "href");
}

#[test]
fn test_logging_config_default() {
    let logging = LoggingConfig::default();
    assert!(!logging.json);
    assert_eq!(logging.directory, PathBuf::from("~/.domsnap/logs"));
}

#[test]
fn test_partial_section_keeps_defaults() {
    let config: Config = toml::from_str(
        r#"
        [capture]
        debug = true
        "#,
    )
    .unwrap();
    assert!(config.capture.debug);
    assert_eq!(config.capture.overlay_throttle_ms, 16);
    assert_eq!(config.serialize.include_attributes.len(), 10);
}

#[test]
fn test_config_serialization_roundtrip() {
    let mut config = Config::default();
    config.capture.viewport_expansion = -1;
    config.serialize.include_attributes = vec!["role".to_string()];

    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.capture.viewport_expansion, -1);
    assert_eq!(parsed.serialize.include_attributes, vec!["role"]);
}

#[test]
fn test_config_json_serialization() {
    let config = Config::default();
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["browser"]["endpoint"], "http://localhost:9222");
    assert_eq!(json["action"]["include_dynamic_attributes"], true);
}
