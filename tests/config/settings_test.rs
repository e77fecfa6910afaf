//! Settings files, dataset resolution and flat key lookup.

use std::env;
use std::fs;

use xmlbridge::config::{ConfigSource, PropertiesSource, Settings, SettingsError};
use xmlbridge::rewrite::{RuleChain, RuleSpec};
use xmlbridge::xml::SourceEncoding;

const CONFIG: &str = r#"
[database]
path = "${XB_SETTINGS_HOME}/bridge.db"

[schema]
varchar_threshold = 128

[datasets.quest]
directories = "${XB_SETTINGS_HOME}/quest, ${XB_SETTINGS_HOME}/quest_event"

[datasets.world]
directories = ["${XB_SETTINGS_HOME}/world"]

[transfer]
batch_size = 200
workers = 4

[analysis]
min_confidence = 0.5

[[ai.rules]]
kind = "mapping"
field = "grade"
map = { "1" = "common", "2" = "rare" }

[[ai.rules]]
kind = "text_style"
field = "name"
style = "upper"
"#;

#[test]
fn test_load_from_environment_path() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().to_string_lossy().to_string();
    env::set_var("XB_SETTINGS_HOME", &home);

    for (sub, file) in [
        ("quest", "a.xml"),
        ("quest/deep", "b.xml"),
        ("quest_event", "c.xml"),
        ("quest", "notes.txt"),
    ] {
        fs::create_dir_all(dir.path().join(sub)).unwrap();
        fs::write(dir.path().join(sub).join(file), "<quest/>").unwrap();
    }
    let config_path = dir.path().join("bridge.toml");
    fs::write(&config_path, CONFIG).unwrap();

    env::set_var("XMLBRIDGE_CONFIG", &config_path);
    let settings = Settings::load().unwrap();
    env::remove_var("XMLBRIDGE_CONFIG");

    assert_eq!(
        settings.database.resolved_path().unwrap(),
        dir.path().join("bridge.db")
    );
    assert_eq!(settings.schema.inference_config().varchar_threshold, 128);
    assert_eq!(settings.transfer.batch_size, 200);
    assert_eq!(settings.transfer.workers, 4);
    assert_eq!(settings.analysis.min_confidence, 0.5);
    assert_eq!(settings.analysis.min_source_coverage, 0.6);

    assert_eq!(
        settings.dataset_dirs("quest").unwrap(),
        vec![dir.path().join("quest"), dir.path().join("quest_event")]
    );
    let files = settings.dataset_files("quest").unwrap();
    assert_eq!(
        files,
        vec![
            dir.path().join("quest/a.xml"),
            dir.path().join("quest/deep/b.xml"),
            dir.path().join("quest_event/c.xml"),
        ]
    );

    assert_eq!(settings.dataset_encoding("quest").unwrap(), SourceEncoding::Utf8);
    assert_eq!(settings.dataset_encoding("world").unwrap(), SourceEncoding::Utf16Le);

    let chain = RuleChain::from_specs(&settings.ai.rules).unwrap();
    assert_eq!(chain.len(), 2);
    assert!(matches!(settings.ai.rules[0], RuleSpec::Mapping { .. }));

    env::remove_var("XB_SETTINGS_HOME");
}

#[test]
fn test_missing_file_and_unknown_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        Settings::from_file(&missing),
        Err(SettingsError::FileNotFound(p)) if p == missing
    ));

    let settings = Settings::parse("[datasets.npc]\n").unwrap();
    assert!(matches!(
        settings.dataset_dirs("quest"),
        Err(SettingsError::DatasetNotFound(name)) if name == "quest"
    ));
    assert!(matches!(
        settings.dataset_dirs("npc"),
        Err(SettingsError::NoDirectories(name)) if name == "npc"
    ));
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        Settings::parse("[transfer]\nworkers = 0\n"),
        Err(SettingsError::InvalidConfig(_))
    ));
    assert!(matches!(
        Settings::parse("[transfer]\nbatch_size = \"many\"\n"),
        Err(SettingsError::ParseError(_))
    ));

    let settings = Settings::parse("[datasets.quest]\ndirectories = [\"q\"]\nencoding = \"latin-1\"\n").unwrap();
    assert!(matches!(
        settings.dataset_encoding("quest"),
        Err(SettingsError::InvalidConfig(_))
    ));
}

#[test]
fn test_flat_lookup_sources() {
    let settings = Settings::parse(
        "[datasets.item]\ndirectories = [\"data/item\", \"data/item_extra\"]\n[transfer]\npage_size = 250\n",
    )
    .unwrap();
    assert_eq!(settings.get("transfer.page_size").as_deref(), Some("250"));
    assert_eq!(
        settings.get_list("datasets.item.directories"),
        vec!["data/item", "data/item_extra"]
    );
    assert_eq!(settings.get("ai.model").as_deref(), Some("echo"));
    assert_eq!(settings.get("transfer"), None);
    assert_eq!(settings.get("transfer.nothing"), None);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.properties");
    fs::write(
        &path,
        "# exported by the launcher\nxml.base.quest = data/quest, data/event\n! legacy\ndb.url: sqlite://bridge.db\n",
    )
    .unwrap();
    let mut props = PropertiesSource::from_file(&path).unwrap();
    assert_eq!(props.get_list("xml.base.quest"), vec!["data/quest", "data/event"]);
    assert_eq!(props.get("db.url").as_deref(), Some("sqlite://bridge.db"));
    props.insert("db.url", "other.db");
    assert_eq!(props.get("db.url").as_deref(), Some("other.db"));
    assert!(props.get_list("missing").is_empty());
}
