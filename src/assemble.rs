// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: assemble  —  build steps and dependency edges
//
//  Turns the classified sources and planned manifests into:
//
//    <target>_autogen            umbrella step (moc, uic, aggregated rcc)
//    <target>_arcc_<name>        one step per individually built manifest
//
//  plus the edges wiring them into the surrounding build graph. Nothing is
//  applied to the graph here; `Plan::apply` does that once every artifact
//  has been written, so a fatal error never leaves a partial graph.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::thread;

use indexmap::IndexSet;
use serde::Serialize;
use tracing::debug;

use crate::classify::{Bucket, Classification, FileKind};
use crate::config::{ConfigValue, Context};
use crate::error::{AutogenError, Result};
use crate::generator::{GenKind, Generators};
use crate::paths::{self, Directories};
use crate::qrc::ResourceManifest;

/// Global target every umbrella step hangs off when requested.
pub const GLOBAL_AUTOGEN: &str = "autogen";
/// Global target every resource step hangs off when requested.
pub const GLOBAL_AUTORCC: &str = "autorcc";

/// Mutations the initializer needs from the surrounding build system.
///
/// Implementations translate steps and edges into their own rule format;
/// the initializer only decides what must exist.
pub trait BuildGraph {
    /// True if `name` is a known build target (as opposed to a file).
    fn has_target(&self, name: &str) -> bool;

    /// Create a custom build step.
    fn add_step(&mut self, step: &BuildStep);

    /// `dependent` must not start before `dependency` finished.
    fn add_dependency_edge(&mut self, dependent: &str, dependency: &str);

    /// Add a generated file to `target`'s compiled sources.
    fn add_generated_source(&mut self, target: &str, path: &Path, generator: GenKind);
}

/// In-memory graph that records every mutation, for tests and `plan` output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordingGraph {
    #[serde(skip)]
    known_targets: BTreeSet<String>,
    pub steps:             Vec<BuildStep>,
    pub edges:             Vec<(String, String)>,
    pub generated_sources: Vec<(String, PathBuf, GenKind)>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_targets.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn step(&self, name: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.edges.is_empty() && self.generated_sources.is_empty()
    }
}

impl BuildGraph for RecordingGraph {
    fn has_target(&self, name: &str) -> bool {
        self.known_targets.contains(name)
    }

    fn add_step(&mut self, step: &BuildStep) {
        self.known_targets.insert(step.name.clone());
        self.steps.push(step.clone());
    }

    fn add_dependency_edge(&mut self, dependent: &str, dependency: &str) {
        self.edges.push((dependent.to_owned(), dependency.to_owned()));
    }

    fn add_generated_source(&mut self, target: &str, path: &Path, generator: GenKind) {
        self.generated_sources.push((target.to_owned(), path.to_path_buf(), generator));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Steps and targets
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Umbrella,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStep {
    pub name:           String,
    pub kind:           StepKind,
    pub comment:        String,
    pub inputs:         Vec<PathBuf>,
    pub outputs:        Vec<PathBuf>,
    pub depend_files:   Vec<PathBuf>,
    pub depend_targets: Vec<String>,
    /// Artifacts the execution stage reads for this step.
    pub info_files:     Vec<PathBuf>,
}

/// The umbrella generation step of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutogenTarget {
    /// `<target>_autogen`
    pub name:              String,
    /// The target whose sources are processed.
    pub origin:            String,
    pub has_umbrella:      bool,
    /// Concurrent generator invocations, per configuration.
    pub parallel:          ConfigValue<String>,
    pub dirs:              Directories,
    pub info_file:         PathBuf,
    pub settings_file:     PathBuf,
    /// Multi-config only.
    pub config_settings_files: BTreeMap<String, PathBuf>,
    pub depend_files:      Vec<PathBuf>,
    pub depend_targets:    Vec<String>,
    pub headers:           Vec<PathBuf>,
    pub sources:           Vec<PathBuf>,
    pub headers_generated: Vec<PathBuf>,
    pub sources_generated: Vec<PathBuf>,
    /// `.ui` files processed by the umbrella step.
    pub forms:             Vec<PathBuf>,
    pub mocs_compilation:  Option<PathBuf>,
}

/// Everything the initializer wants from the build graph, in apply order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub origin:            String,
    pub steps:             Vec<BuildStep>,
    pub edges:             Vec<(String, String)>,
    pub generated_sources: Vec<(PathBuf, GenKind)>,
}

impl Plan {
    pub fn apply(&self, graph: &mut dyn BuildGraph) {
        for step in &self.steps {
            graph.add_step(step);
        }
        for (dependent, dependency) in &self.edges {
            graph.add_dependency_edge(dependent, dependency);
        }
        for (path, generator) in &self.generated_sources {
            graph.add_generated_source(&self.origin, path, *generator);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// `""` / `AUTO` → CPU count, integers pass through (minimum 1), anything else
/// is kept as an expression for the execution stage.
pub fn parallel_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1).to_string()
    } else if let Ok(n) = raw.parse::<u64>() {
        n.max(1).to_string()
    } else {
        raw.to_owned()
    }
}

pub fn assemble(
    ctx:            &Context,
    gens:           &Generators,
    classification: &Classification,
    manifests:      &[ResourceManifest],
    graph:          &dyn BuildGraph,
) -> Result<(AutogenTarget, Plan)> {
    let desc = ctx.desc;
    let dirs = &ctx.dirs;
    let origin = desc.name.clone();

    // ── Depends: build targets vs files ────────────────────────────────────
    let mut depend_targets: IndexSet<String> = IndexSet::new();
    let mut depend_files: IndexSet<PathBuf> = IndexSet::new();
    for dep in &desc.depends {
        if graph.has_target(dep) {
            depend_targets.insert(dep.clone());
        } else {
            depend_files.insert(paths::absolute(&desc.source_dir, Path::new(dep)));
        }
    }
    if desc.depend_origin {
        depend_targets.extend(desc.origin_depends.iter().cloned());
        if gens.rcc.enabled {
            depend_files.extend(manifests.iter().flat_map(|m| m.inputs.iter().cloned()));
        }
    }

    let (aggregated, individual): (Vec<&ResourceManifest>, Vec<&ResourceManifest>) =
        manifests.iter().partition(|m| m.aggregate);

    let has_umbrella = gens.moc.enabled || gens.uic.enabled || !aggregated.is_empty();
    let mocs_compilation = gens.moc.enabled.then(|| dirs.build.join("mocs_compilation.cpp"));

    // ── Our outputs must not double as listed inputs ──────────────────────
    let outputs: Vec<&Path> = mocs_compilation.iter().map(PathBuf::as_path)
        .chain(manifests.iter().map(|m| m.output_file.as_path()))
        .collect();
    for out in &outputs {
        if let Some(file) = classification.files.get(*out) {
            if !file.registered_output {
                return Err(AutogenError::ClassificationConflict {
                    path: out.to_path_buf(),
                    reason: "listed as a source but produced by this target's generation steps".into(),
                });
            }
        }
    }

    let settings_file = dirs.info.join("settings.txt");
    let config_settings_files: BTreeMap<String, PathBuf> = if ctx.configs.is_multi() {
        ctx.configs.names().iter()
            .map(|cfg| (cfg.clone(), paths::with_suffix(&settings_file, &format!("_{cfg}"))))
            .collect()
    } else {
        BTreeMap::new()
    };

    let target = AutogenTarget {
        name: format!("{origin}_autogen"),
        origin: origin.clone(),
        has_umbrella,
        parallel: ConfigValue::resolve(&ctx.configs, &desc.parallel, &desc.config_parallel)
            .map(|raw| parallel_value(raw)),
        dirs: dirs.clone(),
        info_file: dirs.info_file(),
        settings_file,
        config_settings_files,
        depend_files: depend_files.iter().cloned().collect(),
        depend_targets: depend_targets.iter().cloned().collect(),
        headers: classification.headers.iter().cloned().collect(),
        sources: classification.sources.iter().cloned().collect(),
        headers_generated: classification.headers_generated.iter().cloned().collect(),
        sources_generated: classification.sources_generated.iter().cloned().collect(),
        forms: classification.files.iter()
            .filter(|(_, f)| f.bucket == Bucket::Uic && f.kind == FileKind::Form)
            .map(|(p, _)| p.clone())
            .collect(),
        mocs_compilation,
    };

    let mut plan = Plan { origin: origin.clone(), ..Default::default() };

    // ── Umbrella step ──────────────────────────────────────────────────────
    if has_umbrella {
        let mut inputs: IndexSet<PathBuf> = IndexSet::new();
        inputs.insert(target.info_file.clone());
        inputs.extend(target.config_settings_files.values().cloned());
        inputs.extend(target.headers.iter().cloned());
        inputs.extend(target.sources.iter().cloned());
        inputs.extend(target.headers_generated.iter().cloned());
        inputs.extend(target.sources_generated.iter().cloned());
        inputs.extend(target.forms.iter().cloned());
        inputs.extend(aggregated.iter().map(|m| m.path.clone()));

        let mut files = depend_files.clone();
        files.extend(aggregated.iter().flat_map(|m| m.inputs.iter().cloned()));

        let mut outputs: Vec<PathBuf> = target.mocs_compilation.iter().cloned().collect();
        outputs.extend(aggregated.iter().map(|m| m.output_file.clone()));

        let mut info_files = vec![target.info_file.clone()];
        for m in &aggregated {
            info_files.extend(m.info_files().into_iter().map(|(_, p)| p.to_path_buf()));
        }

        let kinds: Vec<&str> = gens.enabled_kinds().into_iter()
            .filter(|k| *k != GenKind::Rcc || !aggregated.is_empty())
            .map(GenKind::upper)
            .collect();

        plan.steps.push(BuildStep {
            name: target.name.clone(),
            kind: StepKind::Umbrella,
            comment: format!("Automatic {} for target {}", kinds.join(" and "), origin),
            inputs: inputs.into_iter().collect(),
            outputs,
            depend_files: files.into_iter().collect(),
            depend_targets: target.depend_targets.clone(),
            info_files,
        });
        plan.edges.push((origin.clone(), target.name.clone()));
        for dep in &target.depend_targets {
            plan.edges.push((target.name.clone(), dep.clone()));
        }
        if desc.global_autogen_target {
            plan.edges.push((GLOBAL_AUTOGEN.to_owned(), target.name.clone()));
        }
    }

    if let Some(mocs) = &target.mocs_compilation {
        plan.generated_sources.push((mocs.clone(), GenKind::Moc));
    }

    // ── One step per individually built manifest ──────────────────────────
    for m in &individual {
        let step_name = format!("{origin}_arcc_{}", m.key());
        let mut depend: IndexSet<PathBuf> = IndexSet::new();
        depend.insert(m.path.clone());
        depend.extend(m.inputs.iter().cloned());

        let info_files: Vec<PathBuf> = m.info_files().into_iter().map(|(_, p)| p.to_path_buf()).collect();
        let mut inputs = vec![m.path.clone()];
        inputs.extend(info_files.iter().cloned());

        debug!(step = %step_name, inputs = m.inputs.len(), "resource step");
        plan.steps.push(BuildStep {
            name: step_name.clone(),
            kind: StepKind::Resource,
            comment: format!("Automatic RCC for {}", paths::display(&m.path)),
            inputs,
            outputs: vec![m.output_file.clone()],
            depend_files: depend.into_iter().collect(),
            depend_targets: Vec::new(),
            info_files,
        });
        plan.edges.push((origin.clone(), step_name.clone()));
        if desc.global_autorcc_target {
            plan.edges.push((GLOBAL_AUTORCC.to_owned(), step_name));
        }
    }

    plan.generated_sources.extend(manifests.iter().map(|m| (m.output_file.clone(), GenKind::Rcc)));

    Ok((target, plan))
}
