// src/properties.rs

//! Line-preserving properties file reader and rewriter
//!
//! The server's main configuration is a classic `key=value` properties file
//! that operators annotate by hand. The setup must change a handful of keys
//! (database connection, update timestamps) without disturbing anything else,
//! so this module keeps every physical line of the original file and only
//! regenerates the entries whose keys were explicitly set.
//!
//! Supported syntax:
//! - `#` and `!` comment lines, blank lines
//! - `=`, `:` or whitespace between key and value
//! - `\` at end of line continues the logical line (leading whitespace of the
//!   continuation is dropped)
//! - escapes `\\`, `\n`, `\t`, `\r`, `\f`, `\uXXXX`, and a backslash before
//!   any other character standing for that character
//!
//! Values that are regular expressions (component module patterns) need
//! their backslashes kept; [`PropertiesFile::get_raw`] returns a value as
//! written.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One logical `key=value` entry and the physical lines it occupies
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
    /// Value text before unescaping, continuation lines joined
    raw_value: String,
    first_line: usize,
    line_count: usize,
}

/// A parsed properties file that remembers its original text
#[derive(Debug, Clone, Default)]
pub struct PropertiesFile {
    /// Physical lines including their terminators
    lines: Vec<String>,
    entries: Vec<Entry>,
    /// Keys set through `set`, in the order they were first set
    tracked: Vec<(String, String)>,
}

impl PropertiesFile {
    /// Create an empty properties file
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a properties file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        let parsed = Self::parse(&text);
        debug!(
            "Loaded {} properties from {}",
            parsed.entries.len(),
            path.display()
        );
        Ok(parsed)
    }

    /// Parse properties text
    pub fn parse(text: &str) -> Self {
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
        let mut entries = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let first = strip_terminator(&lines[i]).trim_start();
            if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
                i += 1;
                continue;
            }

            let start = i;
            let mut logical = String::new();
            let mut current = first.to_string();
            loop {
                if ends_with_continuation(&current) && i + 1 < lines.len() {
                    current.pop();
                    logical.push_str(&current);
                    i += 1;
                    current = strip_terminator(&lines[i]).trim_start().to_string();
                } else {
                    if ends_with_continuation(&current) {
                        current.pop();
                    }
                    logical.push_str(&current);
                    break;
                }
            }
            i += 1;

            let (key, raw_value) = split_key_value(&logical);
            entries.push(Entry {
                key,
                value: unescape(&raw_value),
                raw_value,
                first_line: start,
                line_count: i - start,
            });
        }

        Self {
            lines,
            entries,
            tracked: Vec::new(),
        }
    }

    /// Get the value of a key; later definitions override earlier ones
    pub fn get(&self, key: &str) -> Option<&str> {
        if let Some((_, value)) = self.tracked.iter().find(|(k, _)| k == key) {
            return Some(value.as_str());
        }
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Get a value as written, without resolving escapes
    ///
    /// Values set through `set` are returned unchanged.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        if let Some((_, value)) = self.tracked.iter().find(|(k, _)| k == key) {
            return Some(value.as_str());
        }
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.raw_value.as_str())
    }

    /// All distinct keys, in order of first appearance (set keys last)
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let file_keys = self.entries.iter().map(|e| e.key.as_str());
        let set_keys = self.tracked.iter().map(|(k, _)| k.as_str());
        for key in file_keys.chain(set_keys) {
            if seen.insert(key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Set a value and mark the key for rewriting on save
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.tracked.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.tracked.push((key, value)),
        }
    }

    /// Whether any key has been set since loading
    pub fn is_modified(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Keys that will be rewritten on save
    pub fn tracked_keys(&self) -> Vec<&str> {
        self.tracked.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Render the rewritten file
    ///
    /// The first definition of each tracked key is replaced in place, later
    /// definitions of it are dropped, and tracked keys missing from the file
    /// are appended. All other lines are emitted unchanged.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(String::len).sum());
        let mut written: HashSet<&str> = HashSet::new();
        let mut entry_iter = self.entries.iter().peekable();

        let mut i = 0;
        while i < self.lines.len() {
            let entry = match entry_iter.peek() {
                Some(e) if e.first_line == i => entry_iter.next(),
                _ => None,
            };

            let Some(entry) = entry else {
                out.push_str(&self.lines[i]);
                i += 1;
                continue;
            };

            match self.tracked.iter().find(|(k, _)| *k == entry.key) {
                Some((key, value)) => {
                    if written.insert(key.as_str()) {
                        let last = &self.lines[entry.first_line + entry.line_count - 1];
                        out.push_str(&format_entry(key, value));
                        out.push_str(terminator(last));
                    }
                }
                None => {
                    for line in &self.lines[i..i + entry.line_count] {
                        out.push_str(line);
                    }
                }
            }
            i += entry.line_count;
        }

        for (key, value) in &self.tracked {
            if written.contains(key.as_str()) {
                continue;
            }
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&format_entry(key, value));
            out.push('\n');
        }

        out
    }

    /// Write the rewritten file, replacing `path` atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.render().as_bytes())?;
        tmp.persist(path)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;

        info!(
            "Saved {} with {} updated key(s)",
            path.display(),
            self.tracked.len()
        );
        Ok(())
    }
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}

fn terminator(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// A line continues when it ends with an odd number of backslashes
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_key_value(logical: &str) -> (String, String) {
    let chars: Vec<char> = logical.chars().collect();
    let mut key_end = chars.len();
    let mut idx = 0;
    while idx < chars.len() {
        match chars[idx] {
            '\\' => idx += 2,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = idx;
                break;
            }
            _ => idx += 1,
        }
    }

    let key_end = key_end.min(chars.len());
    let mut value_start = key_end;
    while value_start < chars.len() && matches!(chars[value_start], ' ' | '\t' | '\x0c') {
        value_start += 1;
    }
    if value_start < chars.len() && matches!(chars[value_start], '=' | ':') {
        value_start += 1;
        while value_start < chars.len() && matches!(chars[value_start], ' ' | '\t' | '\x0c') {
            value_start += 1;
        }
    }

    let key: String = chars[..key_end].iter().collect();
    let value: String = chars[value_start..].iter().collect();
    (unescape(&key), value)
}

/// Consume the four hex digits of a `\uXXXX` escape, if they are there
fn hex_unit(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<u16> {
    let digits: String = chars.clone().take(4).collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let unit = u16::from_str_radix(&digits, 16).ok()?;
    chars.nth(3);
    Some(unit)
}

fn flush_units(units: &mut Vec<u16>, out: &mut String) {
    out.extend(
        char::decode_utf16(units.drain(..)).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)),
    );
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    // `\uXXXX` code units, held back so surrogate pairs decode together
    let mut units: Vec<u16> = Vec::new();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'u') {
            chars.next();
            match hex_unit(&mut chars) {
                Some(unit) => units.push(unit),
                None => {
                    flush_units(&mut units, &mut out);
                    out.push_str("\\u");
                }
            }
            continue;
        }

        flush_units(&mut units, &mut out);
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    flush_units(&mut units, &mut out);
    out
}

fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (idx, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' if is_key => {
                out.push('\\');
                out.push(c);
            }
            '#' | '!' if is_key && idx == 0 => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || idx == 0 => out.push_str("\\ "),
            c if c.is_control() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn format_entry(key: &str, value: &str) -> String {
    format!("{}={}", escape(key, true), escape(value, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Main server configuration
db.pool.default.jdbcDriver=org.sqlite.JDBC
db.pool.default.jdbcUrl = jdbc:sqlite:/tmp/old.db

! legacy comment style
module.list=a,\\
    b,\\
    c
servlet.mapping: /cms/*
empty.value=
";

    #[test]
    fn test_parse_separators_and_continuations() {
        let props = PropertiesFile::parse(SAMPLE);
        assert_eq!(props.get("db.pool.default.jdbcDriver"), Some("org.sqlite.JDBC"));
        assert_eq!(
            props.get("db.pool.default.jdbcUrl"),
            Some("jdbc:sqlite:/tmp/old.db")
        );
        assert_eq!(props.get("module.list"), Some("a,b,c"));
        assert_eq!(props.get("servlet.mapping"), Some("/cms/*"));
        assert_eq!(props.get("empty.value"), Some(""));
        assert_eq!(props.get("missing"), None);
    }

    #[test]
    fn test_untouched_round_trip_is_byte_identical() {
        let props = PropertiesFile::parse(SAMPLE);
        assert!(!props.is_modified());
        assert_eq!(props.render(), SAMPLE);

        let crlf = "a=1\r\n# note\r\nb = two \\\r\n  lines\r\nno-terminator=x";
        assert_eq!(PropertiesFile::parse(crlf).render(), crlf);
    }

    #[test]
    fn test_tracked_key_replaced_in_place() {
        let mut props = PropertiesFile::parse(SAMPLE);
        props.set("db.pool.default.jdbcUrl", "jdbc:sqlite:/var/lib/cms/cms.db");
        let out = props.render();

        assert!(out.contains("db.pool.default.jdbcUrl=jdbc:sqlite:/var/lib/cms/cms.db\n"));
        assert!(!out.contains("old.db"));
        // Everything else survives verbatim
        assert!(out.starts_with("# Main server configuration\n"));
        assert!(out.contains("! legacy comment style\n"));
        assert!(out.contains("module.list=a,\\\n    b,\\\n    c\n"));
        assert!(out.contains("servlet.mapping: /cms/*\n"));
    }

    #[test]
    fn test_tracked_continuation_entry_collapses() {
        let mut props = PropertiesFile::parse(SAMPLE);
        props.set("module.list", "x,y");
        let out = props.render();
        assert!(out.contains("module.list=x,y\nservlet.mapping"));
        assert!(!out.contains("    b,"));
    }

    #[test]
    fn test_new_key_appended() {
        let mut props = PropertiesFile::parse("a=1");
        props.set("b", "2");
        assert_eq!(props.render(), "a=1\nb=2\n");
    }

    #[test]
    fn test_duplicate_tracked_key_written_once() {
        let mut props = PropertiesFile::parse("k=1\nother=x\nk=2\n");
        assert_eq!(props.get("k"), Some("2"));
        props.set("k", "3");
        assert_eq!(props.render(), "k=3\nother=x\n");
    }

    #[test]
    fn test_escaping_of_written_values() {
        let mut props = PropertiesFile::new();
        props.set("path", "C:\\cms\\data");
        props.set("key with:colon", " leading");
        let out = props.render();
        assert!(out.contains("path=C:\\\\cms\\\\data\n"));
        assert!(out.contains("key\\ with\\:colon=\\ leading\n"));

        let reparsed = PropertiesFile::parse(&out);
        assert_eq!(reparsed.get("path"), Some("C:\\cms\\data"));
        assert_eq!(reparsed.get("key with:colon"), Some(" leading"));
    }

    #[test]
    fn test_unicode_escapes_decoded() {
        let props = PropertiesFile::parse(
            "title=Gr\\u00fc\\u00dfe\nemoji=\\uD83D\\uDE00!\nbroken=\\u12g4\nkey\\u0041=x\n",
        );
        assert_eq!(props.get("title"), Some("Grüße"));
        assert_eq!(props.get("emoji"), Some("\u{1F600}!"));
        assert_eq!(props.get("broken"), Some("\\u12g4"));
        assert_eq!(props.get("keyA"), Some("x"));
    }

    #[test]
    fn test_control_characters_written_as_unicode_escapes() {
        let mut props = PropertiesFile::new();
        props.set("bell", "a\u{7}b");
        let out = props.render();
        assert_eq!(out, "bell=a\\u0007b\n");
        assert_eq!(PropertiesFile::parse(&out).get("bell"), Some("a\u{7}b"));
    }

    #[test]
    fn test_get_raw_keeps_backslashes() {
        let mut props = PropertiesFile::parse("pattern=org\\.example\\.(a|b)\n");
        assert_eq!(props.get("pattern"), Some("org.example.(a|b)"));
        assert_eq!(props.get_raw("pattern"), Some("org\\.example\\.(a|b)"));
        assert_eq!(props.get_raw("missing"), None);

        props.set("pattern", "x\\.y");
        assert_eq!(props.get_raw("pattern"), Some("x\\.y"));
    }

    #[test]
    fn test_escaped_trailing_backslash_is_not_continuation() {
        let props = PropertiesFile::parse("dir=C:\\\\\nnext=1\n");
        assert_eq!(props.get("dir"), Some("C:\\"));
        assert_eq!(props.get("next"), Some("1"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cms.properties");
        fs::write(&path, SAMPLE).unwrap();

        let mut props = PropertiesFile::load(&path).unwrap();
        props.set("setup.last_update", "2024-01-01");
        props.save(&path).unwrap();

        let reloaded = PropertiesFile::load(&path).unwrap();
        assert_eq!(reloaded.get("setup.last_update"), Some("2024-01-01"));
        assert_eq!(reloaded.get("module.list"), Some("a,b,c"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PropertiesFile::load("/nonexistent/cms.properties");
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_keys_order() {
        let mut props = PropertiesFile::parse("b=1\na=2\nb=3\n");
        props.set("c", "4");
        assert_eq!(props.keys(), vec!["b", "a", "c"]);
        assert_eq!(props.tracked_keys(), vec!["c"]);
    }
}
