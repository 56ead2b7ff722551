// build.rs

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

const FALLBACK_LANG: &str = "en";

fn main() {
    // --- 1. Pick the message catalog ---
    // `lang_*` features win over ENVLOCK_LANG, which wins over English.
    let mut active_langs: Vec<String> = env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_LANG_")
                .map(|l| l.to_lowercase())
        })
        .collect();
    active_langs.sort();

    let lang = match active_langs.first() {
        Some(first) => {
            if active_langs.len() > 1 {
                println!(
                    "cargo:warning=Multiple language features enabled ({:?}). Using '{}'.",
                    active_langs, first
                );
            }
            first.clone()
        }
        None => env::var("ENVLOCK_LANG").unwrap_or_else(|_| FALLBACK_LANG.to_string()),
    };

    println!("cargo:rustc-env=ENVLOCK_LANG_EFFECTIVE={}", lang);
    println!("cargo:rerun-if-env-changed=ENVLOCK_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    // --- 2. English is always loaded; other languages only overlay it ---
    let fallback_path = format!("locales/{}.toml", FALLBACK_LANG);
    let fallback_content = fs::read_to_string(&fallback_path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", fallback_path, e));
    let mut translations: BTreeMap<String, String> = toml::from_str(&fallback_content)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", fallback_path, e));

    if lang != FALLBACK_LANG {
        let lang_path = format!("locales/{}.toml", lang);
        match fs::read_to_string(&lang_path) {
            Ok(content) => {
                let overlay: BTreeMap<String, String> = toml::from_str(&content)
                    .unwrap_or_else(|e| panic!("Failed to parse {}: {}", lang_path, e));
                for (key, value) in overlay {
                    if !translations.contains_key(&key) {
                        println!(
                            "cargo:warning=Key '{}' in {} has no English entry and is ignored.",
                            key, lang_path
                        );
                        continue;
                    }
                    translations.insert(key, value);
                }
            }
            Err(_) => println!(
                "cargo:warning=Language file '{}' not found. Falling back to '{}'.",
                lang_path, FALLBACK_LANG
            ),
        }
    }

    // --- 3. Generate the `t!` macro ---
    // Sorted keys keep the generated file identical between builds.
    let mut macro_code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, value) in &translations {
        let escaped_value = value.replace('\\', "\\\\").replace('"', "\\\"");
        macro_code.push_str(&format!(
            "    (\"{}\") => {{ \"{}\" }};\n",
            key, escaped_value
        ));
    }
    macro_code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    macro_code.push('}');

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("translations.rs");
    fs::write(&dest_path, macro_code).expect("Failed to write translations.rs");
}
