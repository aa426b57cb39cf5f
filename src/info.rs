// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: info  —  settings artifact writer / reader
//
//  One record per line, in a CMake-script compatible form:
//
//      # Comment
//      set(AG_MULTI_CONFIG "TRUE")
//      set(AG_HEADERS "/src/a.h;/src/b.h")                 ← list
//      set(AG_MOC_INCLUDES_Debug "/src/inc")               ← per-config
//      set(AG_UIC_OPTIONS_OPTIONS "{-tr;i18n}<SEP>{-a}")   ← nested lists
//
//  Values are quoted with `\`, `"` and `$` escaped and newlines written as
//  `\n`, so every record stays on one line. Inside a list item a literal
//  `\` is written as `\\` and a literal `;` as `\;`. Readers ignore keys
//  they do not know.
// ─────────────────────────────────────────────────────────────────────────────

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use indexmap::IndexMap;
use tempfile::NamedTempFile;

use crate::config::ConfigValue;
use crate::error::{AutogenError, Result};
use crate::paths;

/// Separator between groups of a nested list.
pub const NESTED_SEP: &str = "<SEP>";

#[derive(Debug, Default, Clone)]
pub struct InfoWriter {
    buf: String,
}

impl InfoWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(&mut self, text: &str) {
        self.buf.push_str("# ");
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn write(&mut self, key: &str, value: &str) {
        self.buf.push_str("set(");
        self.buf.push_str(key);
        self.buf.push(' ');
        self.buf.push_str(&quote(value));
        self.buf.push_str(")\n");
    }

    pub fn write_bool(&mut self, key: &str, value: bool) {
        self.write(key, if value { "TRUE" } else { "FALSE" });
    }

    pub fn write_uint(&mut self, key: &str, value: u64) {
        self.write(key, &value.to_string());
    }

    pub fn write_strings<I, S>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write(key, &list_join(items));
    }

    pub fn write_paths<I, P>(&mut self, key: &str, items: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.write_strings(key, items.into_iter().map(|p| paths::display(p.as_ref())));
    }

    pub fn write_path(&mut self, key: &str, path: &Path) {
        self.write(key, &paths::display(path));
    }

    /// `KEY_<CONFIG> value` for every entry of the map.
    pub fn write_config<'v, I>(&mut self, key: &str, map: I)
    where
        I: IntoIterator<Item = (&'v String, &'v String)>,
    {
        for (config, value) in map {
            self.write(&config_key(key, config), value);
        }
    }

    /// Shared record plus one record per configuration when the value varies.
    pub fn write_config_value(&mut self, key: &str, value: &ConfigValue<String>) {
        self.write(key, &value.default);
        self.write_config(key, &value.per_config);
    }

    pub fn write_config_strings(&mut self, key: &str, value: &ConfigValue<Vec<String>>) {
        self.write_strings(key, &value.default);
        for (config, items) in &value.per_config {
            self.write_strings(&config_key(key, config), items);
        }
    }

    pub fn write_nested_lists(&mut self, key: &str, lists: &[Vec<String>]) {
        let groups: Vec<String> = lists.iter()
            .map(|list| format!("{{{}}}", list_join(list)))
            .collect();
        self.write(key, &groups.join(NESTED_SEP));
    }

    pub fn contents(&self) -> &str {
        &self.buf
    }

    /// Persist the buffer to `path` atomically. Returns false when the file
    /// already held exactly these bytes and was left untouched.
    pub fn commit(&self, path: &Path) -> Result<bool> {
        write_atomic(path, self.buf.as_bytes())
    }
}

pub fn config_key(key: &str, config: &str) -> String {
    format!("{key}_{config}")
}

fn list_join<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter()
        .map(|s| s.as_ref().replace('\\', "\\\\").replace(';', "\\;"))
        .collect::<Vec<_>>()
        .join(";")
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"'  => out.push_str("\\\""),
            '$'  => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            c    => out.push(c),
        }
    }
    out.push('"');
    out
}

// ─────────────────────────────────────────────────────────────────────────────
//  Atomic write
// ─────────────────────────────────────────────────────────────────────────────

/// Write `data` through a freshly created sibling temp file and rename it
/// over `path`, so readers never observe a partial artifact.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<bool> {
    let fail = |source: io::Error| AutogenError::SettingsWrite { path: path.to_path_buf(), source };

    if let Ok(existing) = fs::read(path) {
        if existing == data {
            return Ok(false);
        }
    }

    let parent = path.parent().ok_or_else(|| {
        fail(io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"))
    })?;
    fs::create_dir_all(parent).map_err(fail)?;

    // Unique sibling name, so concurrent writers never share a temp file
    let mut tmp = NamedTempFile::new_in(parent).map_err(fail)?;
    tmp.write_all(data).and_then(|_| tmp.as_file().sync_all()).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
//  Reader
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct InfoReader {
    values: IndexMap<String, String>,
}

impl InfoReader {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| AutogenError::read(path, e))?;
        Ok(Self::parse(&text))
    }

    /// Lines that are not well-formed `set(KEY "value")` records are skipped.
    pub fn parse(text: &str) -> Self {
        let values = text.lines().filter_map(parse_record).collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The per-config record if present, else the shared one.
    pub fn get_config(&self, key: &str, config: &str) -> Option<&str> {
        self.get(&config_key(key, config)).or_else(|| self.get(key))
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("TRUE" | "ON" | "1"))
    }

    pub fn get_uint(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).map(list_split).unwrap_or_default()
    }

    pub fn get_nested(&self, key: &str) -> Vec<Vec<String>> {
        let Some(raw) = self.get(key) else { return Vec::new() };
        if raw.is_empty() {
            return Vec::new();
        }
        raw.split(NESTED_SEP)
            .map(|group| {
                let inner = group.strip_prefix('{').and_then(|g| g.strip_suffix('}')).unwrap_or(group);
                list_split(inner)
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

fn parse_record(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix("set(")?.strip_suffix(')')?;
    let (key, value) = rest.split_once(' ')?;
    Some((key.to_owned(), unquote(value)?))
}

fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn list_split(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    let mut items = Vec::new();
    let mut cur = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => cur.push(escaped),
                None => cur.push('\\'),
            },
            ';' => items.push(std::mem::take(&mut cur)),
            c => cur.push(c),
        }
    }
    items.push(cur);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn scalar_records_are_escaped() {
        let mut w = InfoWriter::new();
        w.comment("Meta");
        w.write("AG_VERBOSITY", "");
        w.write("AG_ODD", "a \"b\" $c \\d");
        assert_eq!(
            w.contents(),
            "# Meta\nset(AG_VERBOSITY \"\")\nset(AG_ODD \"a \\\"b\\\" \\$c \\\\d\")\n"
        );

        let r = InfoReader::parse(w.contents());
        assert_eq!(r.get("AG_ODD"), Some("a \"b\" $c \\d"));
        assert_eq!(r.get("AG_VERBOSITY"), Some(""));
    }

    #[test]
    fn lists_keep_order_and_embedded_separators() {
        let mut w = InfoWriter::new();
        w.write_strings("L", ["z", "a;b", "m"]);
        w.write_strings("EMPTY", Vec::<String>::new());
        let r = InfoReader::parse(w.contents());
        assert_eq!(r.get_list("L"), vec!["z".to_string(), "a;b".into(), "m".into()]);
        assert!(r.get_list("EMPTY").is_empty());
    }

    #[test]
    fn trailing_backslash_does_not_swallow_the_separator() {
        let items = vec!["x\\".to_string(), "y".into(), "C:\\dir\\a;b".into()];
        let mut w = InfoWriter::new();
        w.write_strings("L", &items);
        w.write_nested_lists("N", &[items.clone()]);
        let r = InfoReader::parse(w.contents());
        assert_eq!(r.get_list("L"), items);
        assert_eq!(r.get_nested("N"), vec![items]);
    }

    #[test]
    fn loading_a_missing_file_names_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        let err = InfoReader::load(&path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn concurrent_commits_to_one_path_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.txt");

        std::thread::scope(|scope| {
            for i in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    for round in 0..20 {
                        let mut w = InfoWriter::new();
                        w.write("K", &format!("{i}-{round}"));
                        w.commit(path).unwrap();
                    }
                });
            }
        });

        let r = InfoReader::load(&path).unwrap();
        assert!(r.get("K").is_some());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn config_records_fall_back_to_shared_value() {
        let mut per_config = BTreeMap::new();
        per_config.insert("Debug".to_string(), vec!["/d".to_string()]);
        per_config.insert("Release".to_string(), vec!["/r".to_string()]);
        let value = ConfigValue { default: vec!["/d".to_string()], per_config };

        let mut w = InfoWriter::new();
        w.write_config_strings("INC", &value);
        w.write("OTHER", "x");
        let r = InfoReader::parse(w.contents());
        assert_eq!(r.get("INC_Debug"), Some("/d"));
        assert_eq!(r.get_config("INC", "Release"), Some("/r"));
        assert_eq!(r.get_config("OTHER", "Release"), Some("x"));
    }

    #[test]
    fn nested_lists_round_trip() {
        let lists = vec![
            vec!["-tr".to_string(), "i18n".to_string()],
            vec!["--no-protection".to_string()],
        ];
        let mut w = InfoWriter::new();
        w.write_nested_lists("N", &lists);
        assert!(w.contents().contains("{-tr;i18n}<SEP>{--no-protection}"));
        assert_eq!(InfoReader::parse(w.contents()).get_nested("N"), lists);
    }

    #[test]
    fn reader_ignores_unknown_lines() {
        let r = InfoReader::parse("garbage\n# comment\nset(A \"1\")\nset(B unquoted)\n");
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(r.get_uint("A"), Some(1));
    }

    #[test]
    fn commit_replaces_atomically_and_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("info.txt");

        let mut w = InfoWriter::new();
        w.write("K", "v1");
        assert!(w.commit(&path).unwrap());
        assert!(!w.commit(&path).unwrap());

        let mut w2 = InfoWriter::new();
        w2.write("K", "v2");
        assert!(w2.commit(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "set(K \"v2\")\n");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn commit_into_unwritable_location_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = write_atomic(&blocker.join("info.txt"), b"data").unwrap_err();
        assert!(matches!(err, AutogenError::SettingsWrite { .. }));
    }
}
