// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: config
//
//  Raw target description, loaded from an `autogen.toml` file (or built in
//  code by a build-system integration), plus the resolved per-target
//  context every phase reads.
//
//  autogen.toml format:
//
//      name        = "app"
//      source_dir  = "."             # relative to the toml file
//      binary_dir  = "build"
//      qt_version  = "5.15.2"
//      configs     = ["Debug", "Release"]
//      multi_config = true
//      parallel    = "AUTO"
//      sources     = [
//          "main.cpp", "widget.h", "res.qrc",
//          # detailed form, mixes with plain paths
//          { path = "form.ui", uic_options = ["--no-protection"] },
//      ]
//
//      [moc]
//      enabled  = true
//      includes = ["include"]
//      [moc.config_includes]
//      Release = ["include", "release"]
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AutogenError, Result};
use crate::paths::{self, Directories};

// ── TOML schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDescription {
    pub name:        String,
    pub source_dir:  PathBuf,
    pub binary_dir:  PathBuf,
    /// Overrides `<binary_dir>/<name>_autogen`.
    pub build_dir:   Option<PathBuf>,
    /// Declared configurations. For single-config builds the first entry is
    /// the build type.
    pub configs:     Vec<String>,
    pub multi_config: bool,
    pub qt_version:  String,
    pub verbosity:   String,
    /// `""` / `"AUTO"` → CPU count, an integer, or an opaque expression.
    pub parallel:    String,
    pub config_parallel: BTreeMap<String, String>,
    pub conflict_policy: ConflictPolicy,
    /// Names of build targets or files the umbrella step waits for.
    pub depends:     Vec<String>,
    /// The origin target's own target dependencies.
    pub origin_depends: Vec<String>,
    pub depend_origin: bool,
    pub global_autogen_target: bool,
    pub global_autorcc_target: bool,
    pub sources:     Vec<SourceSpec>,
    pub moc:         MocProps,
    pub uic:         UicProps,
    pub rcc:         RccProps,
}

/// A source list entry: a bare path or a table with per-file annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Path(PathBuf),
    Entry(SourceEntry),
}

impl SourceSpec {
    pub fn to_entry(&self) -> SourceEntry {
        match self {
            SourceSpec::Path(path) => SourceEntry { path: path.clone(), ..Default::default() },
            SourceSpec::Entry(entry) => entry.clone(),
        }
    }
}

impl From<SourceEntry> for SourceSpec {
    fn from(entry: SourceEntry) -> Self {
        SourceSpec::Entry(entry)
    }
}

impl From<&str> for SourceSpec {
    fn from(path: &str) -> Self {
        SourceSpec::Path(PathBuf::from(path))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceEntry {
    pub path:         PathBuf,
    /// Produced by another build step; not content-scanned here.
    pub generated:    bool,
    pub skip_autogen: bool,
    pub skip_moc:     bool,
    pub skip_uic:     bool,
    pub skip_rcc:     bool,
    /// Extra uic options for one `.ui` file.
    pub uic_options:  Vec<String>,
    /// Extra rcc options for one `.qrc` file.
    pub rcc_options:  Vec<String>,
    /// Fold this manifest into the umbrella step instead of its own step.
    pub rcc_aggregate: bool,
}

/// What to do with a file that needs both moc and uic processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    Error,
    PreferMoc,
}

/// Fields shared by every generator section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenSwitch {
    pub enabled:    bool,
    /// A missing executable aborts the target instead of disabling the generator.
    pub required:   bool,
    pub executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MocProps {
    #[serde(flatten)]
    pub switch:          GenSwitch,
    pub includes:        Vec<PathBuf>,
    pub config_includes: BTreeMap<String, Vec<PathBuf>>,
    pub defines:         Vec<String>,
    pub config_defines:  BTreeMap<String, Vec<String>>,
    pub options:         Vec<String>,
    pub macro_names:     Vec<String>,
    pub depend_filters:  Vec<String>,
    pub relaxed_mode:    bool,
    pub predefs_cmd:     Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UicProps {
    #[serde(flatten)]
    pub switch:         GenSwitch,
    pub options:        Vec<String>,
    pub config_options: BTreeMap<String, Vec<String>>,
    pub search_paths:   Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RccProps {
    #[serde(flatten)]
    pub switch:         GenSwitch,
    pub options:        Vec<String>,
    pub config_options: BTreeMap<String, Vec<String>>,
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Load a target description; relative directories resolve against the
/// file's own directory.
pub fn load_from_file(path: &Path) -> Result<TargetDescription> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AutogenError::config(format!("cannot read {}: {}", path.display(), e))
    })?;
    let mut desc = load_from_str(&raw, path)?;

    let base = path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = if base.is_absolute() {
        base
    } else {
        paths::absolute(&std::env::current_dir()?, &base)
    };

    desc.source_dir = paths::absolute(&base, &desc.source_dir);
    if desc.binary_dir.as_os_str().is_empty() {
        desc.binary_dir = desc.source_dir.join("build");
    } else {
        desc.binary_dir = paths::absolute(&base, &desc.binary_dir);
    }

    desc.validate()?;
    Ok(desc)
}

/// Parse a description from a TOML string (path is used only for errors).
pub fn load_from_str(toml_str: &str, path: &Path) -> Result<TargetDescription> {
    toml::from_str(toml_str).map_err(|e| {
        AutogenError::config(format!("malformed {}: {}", path.display(), e))
    })
}

impl TargetDescription {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AutogenError::config("target name is empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(AutogenError::config(format!("target name '{}' contains a path separator", self.name)));
        }
        for (what, dir) in [("source_dir", &self.source_dir), ("binary_dir", &self.binary_dir)] {
            if !dir.is_absolute() {
                return Err(AutogenError::config(format!("{what} must be absolute, got '{}'", dir.display())));
            }
        }
        if self.multi_config && self.configs.is_empty() {
            return Err(AutogenError::config("multi_config is set but no configs are declared"));
        }

        let mut seen = BTreeSet::new();
        for cfg in &self.configs {
            if cfg.is_empty() || !seen.insert(cfg.as_str()) {
                return Err(AutogenError::config(format!("invalid or duplicate config name '{cfg}'")));
            }
        }
        if self.sources.iter().any(|s| s.to_entry().path.as_os_str().is_empty()) {
            return Err(AutogenError::config("source entry without a path"));
        }

        let overrides = self.config_parallel.keys()
            .chain(self.moc.config_includes.keys())
            .chain(self.moc.config_defines.keys())
            .chain(self.uic.config_options.keys())
            .chain(self.rcc.config_options.keys());
        for cfg in overrides {
            if !seen.contains(cfg.as_str()) {
                return Err(AutogenError::config(format!("override for undeclared config '{cfg}'")));
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<SourceEntry> {
        self.sources.iter()
            .map(|spec| {
                let mut entry = spec.to_entry();
                entry.path = paths::absolute(&self.source_dir, &entry.path);
                entry
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Configurations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configs {
    /// Keys of every per-config record; `[""]` for single-config builds.
    names:      Vec<String>,
    build_type: String,
    multi:      bool,
}

impl Configs {
    pub fn new(declared: Vec<String>, multi: bool) -> Self {
        let multi = multi && !declared.is_empty();
        let build_type = declared.first().cloned().unwrap_or_default();
        let names = if multi { declared } else { vec![String::new()] };
        Self { names, build_type, multi }
    }

    pub fn from_description(desc: &TargetDescription) -> Self {
        Self::new(desc.configs.clone(), desc.multi_config)
    }

    pub fn is_multi(&self) -> bool { self.multi }

    pub fn names(&self) -> &[String] { &self.names }

    /// The configuration whose values fill the shared records.
    pub fn default_config(&self) -> &str { &self.build_type }

    fn lookup<'a>(&'a self, name: &'a str) -> &'a str {
        if self.multi { name } else { &self.build_type }
    }
}

/// A value that may differ per configuration.
///
/// `per_config` is empty when every configuration agrees; otherwise it holds
/// one entry for every declared configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigValue<T> {
    pub default:    T,
    pub per_config: BTreeMap<String, T>,
}

impl<T: Clone + PartialEq> ConfigValue<T> {
    pub fn shared(value: T) -> Self {
        Self { default: value, per_config: BTreeMap::new() }
    }

    pub fn resolve(configs: &Configs, shared: &T, overrides: &BTreeMap<String, T>) -> Self {
        let pick = |name: &str| overrides.get(name).unwrap_or(shared).clone();
        let per_config = configs.names().iter()
            .map(|name| (name.clone(), pick(configs.lookup(name))))
            .collect();
        Self { default: pick(configs.default_config()), per_config }.collapse()
    }

    pub fn map<U: Clone + PartialEq>(&self, mut f: impl FnMut(&T) -> U) -> ConfigValue<U> {
        ConfigValue {
            default:    f(&self.default),
            per_config: self.per_config.iter().map(|(k, v)| (k.clone(), f(v))).collect(),
        }
        .collapse()
    }

    pub fn collapse(mut self) -> Self {
        if self.per_config.values().all(|v| *v == self.default) {
            self.per_config.clear();
        }
        self
    }

    pub fn is_varying(&self) -> bool { !self.per_config.is_empty() }

    pub fn get(&self, config: &str) -> &T {
        self.per_config.get(config).unwrap_or(&self.default)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Qt version
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct QtVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl QtVersion {
    /// `"5.12.3"` → 5.12.3; an empty string means "no Qt found".
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 3 {
            return Err(AutogenError::config(format!("invalid Qt version '{s}'")));
        }
        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.parse()
                .map_err(|_| AutogenError::config(format!("invalid Qt version '{s}'")))?;
        }
        Ok(Self { major: nums[0], minor: nums[1], patch: nums[2] })
    }

    pub fn is_supported(&self) -> bool {
        (4..=6).contains(&self.major)
    }
}

impl fmt::Display for QtVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Context
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved, read-only inputs shared by every phase of one target.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub desc:    &'a TargetDescription,
    pub configs: Configs,
    pub qt:      QtVersion,
    pub dirs:    Directories,
    /// Source entries with absolute paths, in declaration order.
    pub sources: Vec<SourceEntry>,
}

impl<'a> Context<'a> {
    pub fn new(desc: &'a TargetDescription) -> Result<Self> {
        desc.validate()?;
        let configs = Configs::from_description(desc);
        let qt = QtVersion::parse(&desc.qt_version)?;
        let dirs = Directories::derive(&desc.name, &desc.binary_dir, desc.build_dir.as_deref(), &configs);
        Ok(Self { configs, qt, dirs, sources: desc.entries(), desc })
    }
}
