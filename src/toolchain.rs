// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: toolchain  —  Qt tool path resolution
//
//  Looks for a logical tool (`moc`, `uic`, `rcc`) in these locations, in order:
//
//  1. The Qt bin dir  (--qt-bin flag, else AUTOGEN_QT_BIN env var)
//  2. Every directory on PATH
//
//  Within a directory both `<tool>` and the distro-suffixed `<tool>-qt<major>`
//  spellings are tried. Target-level executable overrides are handled by the
//  generator configurators before a resolver is consulted.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Environment override for the Qt bin directory.
pub const QT_BIN_ENV: &str = "AUTOGEN_QT_BIN";

/// Given a logical tool name, return an invocable path.
pub trait ToolResolver: Sync {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Default)]
pub struct QtToolchain {
    bin_dir:     Option<PathBuf>,
    major:       u32,
    search_path: bool,
}

impl QtToolchain {
    pub fn new(bin_dir: Option<PathBuf>, major: u32) -> Self {
        Self { bin_dir, major, search_path: true }
    }

    /// Bin dir from AUTOGEN_QT_BIN, if set.
    pub fn from_env(major: u32) -> Self {
        let bin_dir = env::var_os(QT_BIN_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(bin_dir, major)
    }

    /// Find the bin dir of a Qt install below `prefix` (e.g. `/opt/Qt/5.15.2`)
    /// by looking for a `moc` executable at most four levels down.
    pub fn discover(prefix: &Path, major: u32) -> Option<Self> {
        let wanted = exe_name("moc");
        WalkDir::new(prefix)
            .max_depth(4)
            .sort_by_file_name()
            .into_iter()
            .flatten()
            .find(|e| e.file_type().is_file() && e.file_name().to_string_lossy() == wanted)
            .and_then(|e| e.path().parent().map(Path::to_path_buf))
            .map(|bin| Self::new(Some(bin), major))
    }

    /// Only look in the bin dir, never on PATH.
    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    pub fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    fn candidates(&self, name: &str) -> Vec<String> {
        let mut names = vec![exe_name(name)];
        if self.major > 0 {
            names.push(exe_name(&format!("{}-qt{}", name, self.major)));
        }
        names
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.bin_dir.iter().cloned().collect();
        if self.search_path {
            if let Some(path) = env::var_os("PATH") {
                dirs.extend(env::split_paths(&path));
            }
        }
        dirs
    }
}

impl ToolResolver for QtToolchain {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf> {
        let names = self.candidates(logical_name);
        self.search_dirs().into_iter().find_map(|dir| {
            names.iter()
                .map(|n| dir.join(n))
                .find(|p| p.is_file())
        })
    }
}

/// Fixed name → path table, for integrations that already know their tools.
#[derive(Debug, Clone, Default)]
pub struct ToolMap(BTreeMap<String, PathBuf>);

impl ToolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.0.insert(name.to_owned(), path.into());
        self
    }
}

impl ToolResolver for ToolMap {
    fn resolve(&self, logical_name: &str) -> Option<PathBuf> {
        self.0.get(logical_name).cloned()
    }
}

fn exe_name(name: &str) -> String {
    format!("{}{}", name, env::consts::EXE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn resolves_from_bin_dir_including_suffixed_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(exe_name("moc")));
        touch(&dir.path().join(exe_name("uic-qt5")));

        let tc = QtToolchain::new(Some(dir.path().to_path_buf()), 5).without_path_search();
        assert_eq!(tc.resolve("moc"), Some(dir.path().join(exe_name("moc"))));
        assert_eq!(tc.resolve("uic"), Some(dir.path().join(exe_name("uic-qt5"))));
        assert_eq!(tc.resolve("rcc"), None);
    }

    #[test]
    fn discovers_bin_dir_below_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("5.15.2").join("gcc_64").join("bin");
        touch(&bin.join(exe_name("moc")));

        let tc = QtToolchain::discover(dir.path(), 5).unwrap();
        assert_eq!(tc.bin_dir(), Some(bin.as_path()));
        assert!(QtToolchain::discover(&bin.join("missing"), 5).is_none());
    }

    #[test]
    fn tool_map_is_a_plain_lookup() {
        let map = ToolMap::new().with("rcc", "/qt/bin/rcc");
        assert_eq!(map.resolve("rcc"), Some(PathBuf::from("/qt/bin/rcc")));
        assert_eq!(map.resolve("moc"), None);
    }
}
