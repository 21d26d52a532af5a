use palette::config::{resolve_slots, ConfigMap};
use palette::ConfigurationError;
use std::collections::BTreeMap;
use std::io::Write;
use tempfile::Builder;

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_json_with_env_expansion() {
    std::env::set_var("PALETTE_TEST_OPENAI_KEY", "sk-from-env");
    let file = write_temp(
        ".json",
        r#"{
            "provider_1": "ollama", "agent_1": "llama3",
            "system_message_1": "write", "description_1": "writer",
            "provider_2": "openai", "agent_2": "gpt-4o-mini",
            "system_message_2": "review", "description_2": "reviewer",
            "api_key_2": "${PALETTE_TEST_OPENAI_KEY}",
            "token_threshold": 2000
        }"#,
    );

    let config = ConfigMap::load(file.path()).unwrap();
    assert_eq!(config.get_str("api_key_2").as_deref(), Some("sk-from-env"));
    assert_eq!(config.get_usize("token_threshold").unwrap(), Some(2000));

    let slots = resolve_slots(&BTreeMap::new(), &config).unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[1].client.api_key.as_deref(), Some("sk-from-env"));
}

#[test]
fn test_load_yaml_and_yml() {
    let yaml = "\
provider_1: ollama
agent_1: llama3
system_message_1: write
description_1: writer
provider_2: ollama
agent_2: mistral
system_message_2: review
description_2: reviewer
behaviour_2: judge
termination_text: APPROVE
";
    for suffix in [".yaml", ".YML"] {
        let file = write_temp(suffix, yaml);
        let config = ConfigMap::load(file.path()).unwrap();
        assert_eq!(config.get_str("termination_text").as_deref(), Some("APPROVE"));
        let slots = resolve_slots(&BTreeMap::new(), &config).unwrap();
        assert_eq!(slots[1].name, "judge");
        assert_eq!(slots[1].client.model, "mistral");
    }
}

#[test]
fn test_unset_variables_expand_to_empty_and_count_as_missing() {
    std::env::remove_var("PALETTE_TEST_UNSET_MESSAGE");
    let file = write_temp(
        ".json",
        r#"{
            "provider_1": "ollama", "agent_1": "llama3",
            "system_message_1": "write", "description_1": "writer",
            "provider_2": "ollama", "agent_2": "llama3",
            "system_message_2": "${PALETTE_TEST_UNSET_MESSAGE}", "description_2": "reviewer"
        }"#,
    );
    let config = ConfigMap::load(file.path()).unwrap();
    assert_eq!(
        resolve_slots(&BTreeMap::new(), &config),
        Err(ConfigurationError::MissingFields(vec![
            "system_message_2".to_string()
        ]))
    );
}

#[test]
fn test_rejects_unknown_extensions_and_bad_files() {
    let toml = write_temp(".toml", "provider_1 = 'ollama'");
    assert!(matches!(
        ConfigMap::load(toml.path()),
        Err(ConfigurationError::File(msg)) if msg.contains("Unsupported config file format")
    ));

    let broken = write_temp(".json", "{ not json");
    assert!(matches!(
        ConfigMap::load(broken.path()),
        Err(ConfigurationError::File(msg)) if msg.contains("invalid JSON")
    ));

    let list = write_temp(".yaml", "- a\n- b\n");
    assert!(matches!(
        ConfigMap::load(list.path()),
        Err(ConfigurationError::File(msg)) if msg.contains("mapping")
    ));

    assert!(matches!(
        ConfigMap::load("/definitely/not/here.json"),
        Err(ConfigurationError::File(_))
    ));
}
