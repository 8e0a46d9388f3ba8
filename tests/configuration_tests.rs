use rs2_flow::*;

#[test]
fn test_merge_config_defaults() {
    let config = MergeConfig::default();
    assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    assert_eq!(config.concurrency, None);
    assert!(config.validate().is_ok());
}

#[test]
fn test_merge_config_builder() {
    let config = MergeConfig::new().buffer_size(0).concurrency(4);
    assert_eq!(config.buffer_size, 0);
    assert_eq!(config.concurrency, Some(4));
    assert!(config.validate().is_ok());

    let invalid = MergeConfig::new().concurrency(0);
    assert!(matches!(invalid.validate(), Err(FlowError::Config(_))));
}

#[test]
fn test_merge_config_from_json() {
    let config = MergeConfig::from_json(r#"{"buffer_size": 1, "concurrency": 8}"#).unwrap();
    assert_eq!(config, MergeConfig::new().buffer_size(1).concurrency(8));

    // Missing fields keep their defaults
    let partial = MergeConfig::from_json(r#"{"concurrency": 2}"#).unwrap();
    assert_eq!(partial.buffer_size, DEFAULT_BUFFER_SIZE);

    assert!(matches!(
        MergeConfig::from_json(r#"{"concurrency": 0}"#),
        Err(FlowError::Config(_))
    ));
    assert!(matches!(
        MergeConfig::from_json(r#"{"buffer_size": -1}"#),
        Err(FlowError::Config(_))
    ));
}

#[test]
fn test_merge_config_round_trips_through_serde() {
    let config = MergeConfig::new().buffer_size(3);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(MergeConfig::from_json(&json).unwrap(), config);
}

#[test]
fn test_retry_policy_defaults() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries(), 3);
    assert_eq!(
        policy.delay_for(1),
        Some(std::time::Duration::from_millis(100))
    );
}
