//! NTREE_* environment overrides, isolated in their own test binary.

use std::fs;

use tempfile::TempDir;

use ntree::config::Settings;

#[test]
fn given_env_vars_when_load_then_env_wins_over_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ntree.toml");
    fs::write(&path, "id_prefix = \"file\"\nindent = 3\n").unwrap();

    std::env::set_var("NTREE_ID_PREFIX", "env");
    std::env::set_var("NTREE_READONLY", "true");
    let settings = Settings::load(Some(&path));
    std::env::remove_var("NTREE_ID_PREFIX");
    std::env::remove_var("NTREE_READONLY");

    let settings = settings.expect("load settings");
    assert_eq!(settings.id_prefix, "env");
    assert!(settings.readonly);
    assert_eq!(settings.indent, 3, "file value survives where env is silent");
}
