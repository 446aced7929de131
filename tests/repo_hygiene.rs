use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

fn is_placeholder_secret(value: &str) -> bool {
    let normalized = value
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_lowercase();
    normalized.is_empty()
        || normalized == "null"
        || normalized == "none"
        || normalized == "replace_me"
        || normalized.contains("replace_me")
        || normalized == "changeme"
        || normalized.contains("example")
        || normalized.contains("placeholder")
        || normalized.contains("dummy")
        || normalized.contains("test")
}

fn candidate_config_files() -> Vec<PathBuf> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut files = vec![root.join(".env"), root.join(".env.example")];
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with("config")
                && name.ends_with(".toml")
            {
                files.push(path);
            }
        }
    }
    files
}

/// Fail CI if config files contain 64-hex private keys or obvious secrets.
#[test]
fn no_committed_hex_keys_in_configs() {
    let hex_key = Regex::new(r"0x?[a-fA-F0-9]{64}").unwrap();
    let secret_field = Regex::new(
        r#"(?i)\b(private_key|email_pass|api_key|mnemonic)\b\s*[:=]\s*([^\s#]+)"#,
    )
    .unwrap();

    for path in candidate_config_files() {
        let Ok(body) = fs::read_to_string(&path) else {
            continue;
        };
        assert!(
            !hex_key.is_match(&body),
            "{} appears to contain a raw private key",
            path.display()
        );
        for caps in secret_field.captures_iter(&body) {
            let value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            assert!(
                is_placeholder_secret(value),
                "{} has a non-placeholder value for '{}'",
                path.display(),
                caps.get(1).map(|m| m.as_str()).unwrap_or("?")
            );
        }
    }
}
