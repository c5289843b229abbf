// src/template.rs

//! `${token}` substitution for database scripts and property values
//!
//! Only tokens declared in the replacer map are substituted. Anything else
//! that looks like a token (`${unknown}`) is left exactly as written so a
//! script author can spot it in the executed statement.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static token pattern"))
}

/// Replace every `${key}` whose key is present in `replacer`
pub fn substitute(text: &str, replacer: &HashMap<String, String>) -> String {
    if replacer.is_empty() || !text.contains("${") {
        return text.to_string();
    }

    token_pattern()
        .replace_all(text, |caps: &Captures| match replacer.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
