// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: paths
//
//  Lexical path helpers and the derived directory layout of one target.
//  Nothing here touches the filesystem.
//
//  Layout for target `app` with binary dir `/b`:
//
//      /b/.autogen/app.dir/        ← info dir (settings artifacts)
//      /b/app_autogen/             ← build dir (generated sources)
//      /b/app_autogen/include/     ← include dir
//      /b/app_autogen/include_Debug/   (multi-config only)
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::config::Configs;

/// Collapse `.` and `..` components without consulting the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                let leading = matches!(out.components().next_back(), Some(Component::ParentDir));
                if leading || (!out.pop() && !out.has_root()) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make `path` absolute against `base` and normalize it.
pub fn absolute(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// `dir/settings.txt` + `_Debug` → `dir/settings_Debug.txt`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None      => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Lossy string form used in every emitted record.
pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
//  Directories
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directories {
    pub info:           PathBuf,
    pub build:          PathBuf,
    pub work:           PathBuf,
    pub include:        PathBuf,
    /// Only populated for multi-config builds.
    pub config_include: BTreeMap<String, PathBuf>,
}

impl Directories {
    pub fn derive(
        target: &str,
        binary_dir: &Path,
        build_override: Option<&Path>,
        configs: &Configs,
    ) -> Self {
        let info = binary_dir.join(".autogen").join(format!("{target}.dir"));
        let build = match build_override {
            Some(dir) => absolute(binary_dir, dir),
            None      => binary_dir.join(format!("{target}_autogen")),
        };
        let include = build.join("include");

        let config_include = if configs.is_multi() {
            configs.names().iter()
                .map(|cfg| (cfg.clone(), build.join(format!("include_{cfg}"))))
                .collect()
        } else {
            BTreeMap::new()
        };

        Self {
            info,
            include,
            config_include,
            work: binary_dir.to_path_buf(),
            build,
        }
    }

    /// The general settings artifact of the target.
    pub fn info_file(&self) -> PathBuf {
        self.info.join("autogen_info.txt")
    }
}
