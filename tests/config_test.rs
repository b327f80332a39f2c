//! Integration tests for Settings loading: defaults, TOML file, NTREE_* env vars.
//!
//! Env overrides are exercised in a single test so parallel tests in this
//! binary never observe each other's variables.

use std::fs;

use tempfile::TempDir;

use ntree::config::Settings;
use ntree::{Tree, TreeError};

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("ntree.toml");
    fs::write(&path, content).unwrap();
    path
}

// ============================================================
// Settings::load() file layer
// ============================================================

#[test]
fn given_config_file_when_load_then_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
id_prefix = "node"
id_scope_len = 0
"#,
    );

    let settings = Settings::load(Some(&path)).expect("load settings");

    assert_eq!(settings.id_prefix, "node");
    assert_eq!(settings.id_scope_len, 0);
    assert_eq!(settings.indent, Settings::default().indent);
}

#[test]
fn given_missing_file_when_load_then_config_error() {
    let dir = TempDir::new().unwrap();
    let result = Settings::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(TreeError::Config { .. })));
}

#[test]
fn given_invalid_toml_when_load_then_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "id_prefix = [unclosed");
    let result = Settings::load(Some(&path));
    assert!(matches!(result, Err(TreeError::Config { .. })));
}

#[test]
fn given_template_when_written_and_loaded_then_yields_defaults_for_file_layer() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, &Settings::template());

    let settings = Settings::load(Some(&path)).expect("load settings");

    assert_eq!(settings.id_scope_len, Settings::default().id_scope_len);
}

// ============================================================
// Trees built from settings
// ============================================================

#[test]
fn given_unscoped_prefix_when_building_tree_then_ids_follow_settings() {
    let settings = Settings {
        id_prefix: "k".into(),
        id_scope_len: 0,
        ..Settings::default()
    };
    let mut tree = Tree::with_settings(&settings);
    tree.append_child("a").unwrap();
    tree.append_child("b").unwrap();

    let ids: Vec<_> = tree.ids().into_iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, vec!["k-1", "k-2"]);
}

#[test]
fn given_readonly_settings_when_building_tree_then_appends_fail() {
    let settings = Settings {
        readonly: true,
        ..Settings::default()
    };
    let mut tree = Tree::with_settings(&settings);
    assert!(tree.readonly());
    assert!(matches!(
        tree.append_child("a"),
        Err(TreeError::ReadonlyViolation(_))
    ));
}

#[test]
fn given_settings_when_rendering_toml_then_lists_every_key() {
    let text = Settings::default().to_toml().unwrap();
    for key in ["id_prefix", "id_scope_len", "indent", "readonly"] {
        assert!(text.contains(key), "missing {key}");
    }
}
