// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: generator  —  per-generator configuration
//
//  One configurator per generator kind decides enablement, resolves the
//  executable and gathers the kind-specific settings:
//
//    moc  skip set, include paths, defines, options, macro names, …
//    uic  skip set, options, search paths, per-form options
//    rcc  options, list options
//
//  Executable resolution: explicit target override → toolchain resolver →
//  ToolNotFound. A missing tool disables only that generator unless the
//  target marked it required.
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::classify::FileKind;
use crate::config::{ConfigValue, Context, GenSwitch, TargetDescription};
use crate::error::{AutogenError, Result};
use crate::paths;
use crate::toolchain::ToolResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenKind {
    Moc,
    Uic,
    Rcc,
}

impl GenKind {
    pub const ALL: [GenKind; 3] = [GenKind::Moc, GenKind::Uic, GenKind::Rcc];

    /// Logical tool name, also used as the resolver key.
    pub fn name(self) -> &'static str {
        match self {
            GenKind::Moc => "moc",
            GenKind::Uic => "uic",
            GenKind::Rcc => "rcc",
        }
    }

    pub fn upper(self) -> &'static str {
        match self {
            GenKind::Moc => "MOC",
            GenKind::Uic => "UIC",
            GenKind::Rcc => "RCC",
        }
    }
}

impl fmt::Display for GenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MocSettings {
    pub skip:           IndexSet<PathBuf>,
    pub includes:       ConfigValue<Vec<String>>,
    /// Sorted and deduplicated.
    pub defines:        ConfigValue<Vec<String>>,
    pub options:        Vec<String>,
    pub macro_names:    Vec<String>,
    pub depend_filters: Vec<String>,
    pub relaxed_mode:   bool,
    pub predefs_cmd:    Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UicSettings {
    pub skip:         IndexSet<PathBuf>,
    pub options:      ConfigValue<Vec<String>>,
    pub search_paths: Vec<String>,
    /// `.ui` files carrying their own options, in source order.
    pub file_options: Vec<(PathBuf, Vec<String>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RccSettings {
    pub options:      ConfigValue<Vec<String>>,
    /// Options that make rcc print a manifest's inputs.
    pub list_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GenSettings {
    Moc(MocSettings),
    Uic(UicSettings),
    Rcc(RccSettings),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorConfig {
    pub kind:       GenKind,
    pub enabled:    bool,
    pub required:   bool,
    pub executable: PathBuf,
    pub settings:   GenSettings,
}

impl GeneratorConfig {
    pub fn disabled(kind: GenKind) -> Self {
        let settings = match kind {
            GenKind::Moc => GenSettings::Moc(MocSettings::default()),
            GenKind::Uic => GenSettings::Uic(UicSettings::default()),
            GenKind::Rcc => GenSettings::Rcc(RccSettings::default()),
        };
        Self { kind, enabled: false, required: false, executable: PathBuf::new(), settings }
    }

    pub fn moc(&self) -> Option<&MocSettings> {
        match &self.settings {
            GenSettings::Moc(s) if self.enabled => Some(s),
            _ => None,
        }
    }

    pub fn uic(&self) -> Option<&UicSettings> {
        match &self.settings {
            GenSettings::Uic(s) if self.enabled => Some(s),
            _ => None,
        }
    }

    pub fn rcc(&self) -> Option<&RccSettings> {
        match &self.settings {
            GenSettings::Rcc(s) if self.enabled => Some(s),
            _ => None,
        }
    }

    /// True if the generator is enabled and `path` is not on its skip list.
    pub fn accepts(&self, path: &Path) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.settings {
            GenSettings::Moc(s) => !s.skip.contains(path),
            GenSettings::Uic(s) => !s.skip.contains(path),
            GenSettings::Rcc(_) => true,
        }
    }
}

/// The three configurators' results for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generators {
    pub moc: GeneratorConfig,
    pub uic: GeneratorConfig,
    pub rcc: GeneratorConfig,
}

impl Generators {
    pub fn get(&self, kind: GenKind) -> &GeneratorConfig {
        match kind {
            GenKind::Moc => &self.moc,
            GenKind::Uic => &self.uic,
            GenKind::Rcc => &self.rcc,
        }
    }

    pub fn enabled_kinds(&self) -> Vec<GenKind> {
        GenKind::ALL.into_iter().filter(|k| self.get(*k).enabled).collect()
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_kinds().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Configurators
// ─────────────────────────────────────────────────────────────────────────────

/// Configure one generator. A disabled generator yields `Ok` with
/// `enabled == false`; a missing executable yields `ToolNotFound`.
pub fn configure(kind: GenKind, ctx: &Context, resolver: &dyn ToolResolver) -> Result<GeneratorConfig> {
    let switch = switch_of(kind, ctx.desc);
    if !switch.enabled {
        return Ok(GeneratorConfig::disabled(kind));
    }

    let executable = resolve_executable(kind, switch, ctx, resolver)?;
    let settings = match kind {
        GenKind::Moc => GenSettings::Moc(configure_moc(ctx)),
        GenKind::Uic => GenSettings::Uic(configure_uic(ctx)),
        GenKind::Rcc => GenSettings::Rcc(configure_rcc(ctx)),
    };

    debug!(target_name = %ctx.desc.name, generator = %kind, executable = %executable.display(), "generator enabled");
    Ok(GeneratorConfig { kind, enabled: true, required: switch.required, executable, settings })
}

fn switch_of(kind: GenKind, desc: &TargetDescription) -> &GenSwitch {
    match kind {
        GenKind::Moc => &desc.moc.switch,
        GenKind::Uic => &desc.uic.switch,
        GenKind::Rcc => &desc.rcc.switch,
    }
}

fn resolve_executable(
    kind: GenKind,
    switch: &GenSwitch,
    ctx: &Context,
    resolver: &dyn ToolResolver,
) -> Result<PathBuf> {
    let not_found = |tool: String| AutogenError::ToolNotFound {
        generator: kind,
        tool,
        required: switch.required,
    };

    if !ctx.qt.is_supported() {
        return Err(not_found(format!("{} for unsupported Qt version {}", kind.name(), ctx.qt)));
    }

    // ── 1. Target-level override ───────────────────────────────────────────
    if let Some(exe) = &switch.executable {
        let exe = paths::absolute(&ctx.desc.source_dir, exe);
        return if exe.is_file() { Ok(exe) } else { Err(not_found(paths::display(&exe))) };
    }

    // ── 2. Toolchain default ───────────────────────────────────────────────
    resolver.resolve(kind.name())
        .ok_or_else(|| not_found(kind.name().to_owned()))
}

fn configure_moc(ctx: &Context) -> MocSettings {
    let props = &ctx.desc.moc;
    let source_dir = &ctx.desc.source_dir;

    let skip = ctx.sources.iter()
        .filter(|e| e.skip_moc || e.skip_autogen)
        .filter(|e| FileKind::of(&e.path).is_code())
        .map(|e| e.path.clone())
        .collect();

    let includes = ConfigValue::resolve(&ctx.configs, &props.includes, &props.config_includes)
        .map(|dirs| unique_paths(source_dir, dirs));

    let defines = ConfigValue::resolve(&ctx.configs, &props.defines, &props.config_defines)
        .map(|defs| {
            let mut defs = defs.clone();
            defs.sort();
            defs.dedup();
            defs
        });

    MocSettings {
        skip,
        includes,
        defines,
        options:        props.options.clone(),
        macro_names:    props.macro_names.clone(),
        depend_filters: props.depend_filters.clone(),
        relaxed_mode:   props.relaxed_mode,
        predefs_cmd:    props.predefs_cmd.clone(),
    }
}

fn configure_uic(ctx: &Context) -> UicSettings {
    let props = &ctx.desc.uic;

    let mut skip = IndexSet::new();
    let mut file_options = Vec::new();
    for entry in &ctx.sources {
        let kind = FileKind::of(&entry.path);
        let skipped = entry.skip_uic || entry.skip_autogen;
        if skipped && (kind.is_code() || kind == FileKind::Form) {
            skip.insert(entry.path.clone());
        } else if kind == FileKind::Form && !entry.uic_options.is_empty() {
            file_options.push((entry.path.clone(), entry.uic_options.clone()));
        }
    }

    UicSettings {
        skip,
        options: ConfigValue::resolve(&ctx.configs, &props.options, &props.config_options),
        search_paths: unique_paths(&ctx.desc.source_dir, &props.search_paths),
        file_options,
    }
}

fn configure_rcc(ctx: &Context) -> RccSettings {
    let props = &ctx.desc.rcc;
    let list_flag = if ctx.qt.major >= 5 { "--list" } else { "-list" };
    RccSettings {
        options: ConfigValue::resolve(&ctx.configs, &props.options, &props.config_options),
        list_options: vec![list_flag.to_owned()],
    }
}

/// Absolute, normalized, first occurrence wins.
fn unique_paths(base: &Path, dirs: &[PathBuf]) -> Vec<String> {
    dirs.iter()
        .map(|d| paths::display(&paths::absolute(base, d)))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SourceEntry, SourceSpec};
    use crate::toolchain::ToolMap;
    use pretty_assertions::assert_eq;

    fn tools() -> ToolMap {
        ToolMap::new()
            .with("moc", "/qt/bin/moc")
            .with("uic", "/qt/bin/uic")
            .with("rcc", "/qt/bin/rcc")
    }

    fn desc() -> TargetDescription {
        let mut d = TargetDescription {
            name: "app".into(),
            source_dir: "/src".into(),
            binary_dir: "/build".into(),
            qt_version: "5.15.2".into(),
            ..Default::default()
        };
        d.moc.switch.enabled = true;
        d.uic.switch.enabled = true;
        d.rcc.switch.enabled = true;
        d
    }

    #[test]
    fn disabled_generator_resolves_nothing() {
        let mut d = desc();
        d.uic.switch.enabled = false;
        let ctx = Context::new(&d).unwrap();
        let cfg = configure(GenKind::Uic, &ctx, &ToolMap::new()).unwrap();
        assert!(!cfg.enabled);
        assert!(cfg.uic().is_none());
    }

    #[test]
    fn toolchain_default_is_used_without_override() {
        let d = desc();
        let ctx = Context::new(&d).unwrap();
        let cfg = configure(GenKind::Moc, &ctx, &tools()).unwrap();
        assert_eq!(cfg.executable, PathBuf::from("/qt/bin/moc"));
    }

    #[test]
    fn explicit_override_wins_and_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("my-moc");
        std::fs::write(&custom, "").unwrap();

        let mut d = desc();
        d.moc.switch.executable = Some(custom.clone());
        let ctx = Context::new(&d).unwrap();
        assert_eq!(configure(GenKind::Moc, &ctx, &tools()).unwrap().executable, custom);

        d.moc.switch.executable = Some(dir.path().join("gone"));
        let ctx = Context::new(&d).unwrap();
        let err = configure(GenKind::Moc, &ctx, &tools()).unwrap_err();
        assert!(matches!(err, AutogenError::ToolNotFound { generator: GenKind::Moc, .. }));
    }

    #[test]
    fn missing_tool_respects_required_flag() {
        let mut d = desc();
        d.uic.switch.required = true;
        let ctx = Context::new(&d).unwrap();
        let resolver = ToolMap::new().with("moc", "/qt/bin/moc");

        let uic = configure(GenKind::Uic, &ctx, &resolver).unwrap_err();
        assert!(uic.is_fatal());
        let rcc = configure(GenKind::Rcc, &ctx, &resolver).unwrap_err();
        assert!(!rcc.is_fatal());
    }

    #[test]
    fn unsupported_qt_major_disables_generation() {
        let mut d = desc();
        d.qt_version = "3.3.8".into();
        let ctx = Context::new(&d).unwrap();
        let err = configure(GenKind::Moc, &ctx, &tools()).unwrap_err();
        assert!(err.to_string().contains("unsupported Qt version 3.3.8"));
    }

    #[test]
    fn moc_settings_vary_per_config() {
        let mut d = desc();
        d.configs = vec!["Debug".into(), "Release".into()];
        d.multi_config = true;
        d.moc.includes = vec!["inc".into(), "/abs".into(), "inc/../inc".into()];
        d.moc.config_includes.insert("Release".into(), vec!["rel".into()]);
        d.moc.defines = vec!["B".into(), "A".into(), "B".into()];

        let ctx = Context::new(&d).unwrap();
        let cfg = configure(GenKind::Moc, &ctx, &tools()).unwrap();
        let moc = cfg.moc().unwrap();

        assert_eq!(moc.includes.get("Debug"), &vec!["/src/inc".to_string(), "/abs".into()]);
        assert_eq!(moc.includes.get("Release"), &vec!["/src/rel".to_string()]);
        assert!(moc.includes.is_varying());
        assert_eq!(moc.defines, ConfigValue::shared(vec!["A".to_string(), "B".into()]));
    }

    #[test]
    fn skip_sets_and_form_options_come_from_annotations() {
        let mut d = desc();
        d.sources = vec![
            SourceSpec::from("a.h"),
            SourceEntry { path: "b.h".into(), skip_moc: true, ..Default::default() }.into(),
            SourceEntry { path: "c.cpp".into(), skip_autogen: true, ..Default::default() }.into(),
            SourceEntry { path: "f.ui".into(), uic_options: vec!["-tr".into(), "i18n".into()], ..Default::default() }.into(),
            SourceEntry { path: "g.ui".into(), skip_uic: true, ..Default::default() }.into(),
        ];
        let ctx = Context::new(&d).unwrap();
        let gens = Generators {
            moc: configure(GenKind::Moc, &ctx, &tools()).unwrap(),
            uic: configure(GenKind::Uic, &ctx, &tools()).unwrap(),
            rcc: configure(GenKind::Rcc, &ctx, &tools()).unwrap(),
        };

        let moc = gens.moc.moc().unwrap();
        assert_eq!(moc.skip.iter().collect::<Vec<_>>(), vec![Path::new("/src/b.h"), Path::new("/src/c.cpp")]);
        assert!(!gens.moc.accepts(Path::new("/src/b.h")));
        assert!(gens.moc.accepts(Path::new("/src/a.h")));

        let uic = gens.uic.uic().unwrap();
        assert_eq!(uic.skip.iter().collect::<Vec<_>>(), vec![Path::new("/src/c.cpp"), Path::new("/src/g.ui")]);
        assert_eq!(uic.file_options, vec![(PathBuf::from("/src/f.ui"), vec!["-tr".to_string(), "i18n".into()])]);
        assert_eq!(gens.enabled_kinds(), GenKind::ALL.to_vec());
    }

    #[test]
    fn rcc_list_option_follows_qt_major() {
        let mut d = desc();
        let ctx = Context::new(&d).unwrap();
        assert_eq!(configure(GenKind::Rcc, &ctx, &tools()).unwrap().rcc().unwrap().list_options, vec!["--list"]);

        d.qt_version = "4.8.7".into();
        let ctx = Context::new(&d).unwrap();
        assert_eq!(configure(GenKind::Rcc, &ctx, &tools()).unwrap().rcc().unwrap().list_options, vec!["-list"]);
    }
}
