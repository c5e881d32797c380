//! Tests for typed properties and Config
//!
//! These tests verify:
//! - Parsing of every type tag
//! - Rejection of missing / unknown tags
//! - Config overlay on top of defaults
//! - Config load fallback when the file is missing

use densekv::config::{Config, DATABASE_PROPERTIES};
use densekv::props::{Properties, PropertyValue};
use densekv::DenseError;
use tempfile::TempDir;

// =============================================================================
// Property Value Tests
// =============================================================================

#[test]
fn test_parse_every_tag() {
    assert_eq!(PropertyValue::parse("long:-42").unwrap(), PropertyValue::Long(-42));
    assert_eq!(PropertyValue::parse("int:7").unwrap(), PropertyValue::Int(7));
    assert_eq!(PropertyValue::parse("byte:255").unwrap(), PropertyValue::Byte(255));
    assert_eq!(PropertyValue::parse("bool:true").unwrap(), PropertyValue::Bool(true));
    assert_eq!(
        PropertyValue::parse("string:hello world").unwrap(),
        PropertyValue::Str("hello world".to_string())
    );
    assert_eq!(
        PropertyValue::parse("class:many-to-one").unwrap(),
        PropertyValue::Class("many-to-one".to_string())
    );
}

#[test]
fn test_display_includes_tag() {
    assert_eq!(PropertyValue::Long(5).to_string(), "long:5");
    assert_eq!(PropertyValue::Class("set".into()).to_string(), "class:set");
}

#[test]
fn test_missing_tag_rejected() {
    let err = PropertyValue::parse("12").unwrap_err();
    assert!(matches!(err, DenseError::Config(_)));
}

#[test]
fn test_unknown_tag_rejected() {
    let err = PropertyValue::parse("double:1.5").unwrap_err();
    assert!(matches!(err, DenseError::Config(_)));
}

#[test]
fn test_bad_number_rejected() {
    assert!(PropertyValue::parse("byte:300").is_err());
    assert!(PropertyValue::parse("long:abc").is_err());
}

#[test]
fn test_empty_class_rejected() {
    assert!(PropertyValue::parse("class:").is_err());
}

// =============================================================================
// Properties Tests
// =============================================================================

#[test]
fn test_properties_skip_comments_and_blanks() {
    let text = "# header\n\npersistent = bool:false\n  # indented comment\nsetcache.depth = int:8\n";
    let props = Properties::parse(text).unwrap();

    assert_eq!(props.len(), 2);
    assert_eq!(props.get_bool("persistent"), Some(false));
    assert_eq!(props.get_long("setcache.depth"), Some(8));
}

#[test]
fn test_properties_line_without_equals() {
    let err = Properties::parse("persistent bool:true").unwrap_err();
    assert!(err.to_string().contains("line 1"));
}

#[test]
fn test_get_long_accepts_integer_tags() {
    let props = Properties::parse("a = long:1\nb = int:2\nc = byte:3\nd = string:4").unwrap();
    assert_eq!(props.get_long("a"), Some(1));
    assert_eq!(props.get_long("b"), Some(2));
    assert_eq!(props.get_long("c"), Some(3));
    assert_eq!(props.get_long("d"), None);
    assert_eq!(props.get_str("d"), Some("4"));
}

#[test]
fn test_properties_save_and_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.properties");

    let mut props = Properties::new();
    props.set("map.kind", PropertyValue::Class("list".into()));
    props.set("map.window", PropertyValue::Long(1024));
    props.save(&path).unwrap();

    let loaded = Properties::load(&path).unwrap();
    assert_eq!(loaded, props);
    assert_eq!(loaded.get_class("map.kind"), Some("list"));
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_overlay_on_defaults() {
    let props = Properties::parse("keystore.window.fixed = long:128\npersistent = bool:false").unwrap();
    let config = Config::from_properties(&props);

    assert_eq!(config.fixed_window_keys, 128);
    assert!(!config.persistent);
    assert_eq!(config.list_window_keys, Config::default().list_window_keys);
}

#[test]
fn test_config_properties_round_trip() {
    let config = Config::builder()
        .fixed_window_keys(32)
        .set_cache_depth(3)
        .free_slot_capacity(10)
        .build();

    let back = Config::from_properties(&config.to_properties());
    assert_eq!(back.fixed_window_keys, 32);
    assert_eq!(back.set_cache_depth, 3);
    assert_eq!(back.free_slot_capacity, 10);
}

#[test]
fn test_config_load_missing_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::load(temp.path());

    assert_eq!(config.data_dir, temp.path());
    assert_eq!(config.set_cache_capacity, Config::default().set_cache_capacity);
}

#[test]
fn test_config_save_then_load() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .list_minimum_slot(8)
        .build();
    config.save().unwrap();

    assert!(temp.path().join(DATABASE_PROPERTIES).exists());
    let loaded = Config::load(temp.path());
    assert_eq!(loaded, config);
}

#[test]
fn test_builder_clamps_zero_spans() {
    let config = Config::builder().set_window_keys(0).build();
    assert_eq!(config.set_window_keys, 1);
}
