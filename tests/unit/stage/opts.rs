use super::*;

#[test]
fn defaults_are_valid() {
    let opts = StageOpts::default();
    assert_eq!(opts.interpolation, InterpolationType::Linear);
    assert_eq!(opts.max_composition_depth, 64);
    assert_eq!(opts.default_time_codes_per_second, 24.0);
    assert!(!opts.session_layer);
    opts.validate().unwrap();
}

#[test]
fn partial_json_fills_in_defaults() {
    let opts: StageOpts = serde_json::from_str(
        r#"{"max_composition_depth": 8, "variant_fallbacks": {"lod": ["high", "low"]}}"#,
    )
    .unwrap();
    assert_eq!(opts.max_composition_depth, 8);
    assert_eq!(opts.variant_fallbacks["lod"], vec!["high", "low"]);
    assert_eq!(opts.interpolation, InterpolationType::Linear);

    let compose = opts.compose_opts();
    assert_eq!(compose.max_depth, 8);
    assert_eq!(compose.variant_fallbacks.len(), 1);
}

#[test]
fn validate_rejects_bad_ranges() {
    let zero_depth = StageOpts {
        max_composition_depth: 0,
        ..StageOpts::default()
    };
    assert!(zero_depth.validate().is_err());

    let bad_rate = StageOpts {
        default_time_codes_per_second: 0.0,
        ..StageOpts::default()
    };
    let err = bad_rate.validate().unwrap_err().to_string();
    assert!(err.starts_with("validation error:"));

    let mut empty_fallback = StageOpts::default();
    empty_fallback
        .variant_fallbacks
        .insert("lod".to_string(), vec![String::new()]);
    assert!(empty_fallback.validate().is_err());
}
