// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: initializer  —  per-target pipeline
//
//  configure → classify → scan → assemble → emit → apply
//
//  Component-local failures (optional tool missing, malformed manifest) are
//  turned into diagnostics and the pipeline carries on without that
//  generator or manifest. Anything fatal returns before the build graph is
//  touched.
// ─────────────────────────────────────────────────────────────────────────────

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::{assemble, AutogenTarget, BuildGraph, Plan};
use crate::classify::{Classifier, ContentScanner, NeedDetector};
use crate::config::{Context, SourceEntry, TargetDescription};
use crate::emit::{emit, Artifacts};
use crate::error::{AutogenError, Result};
use crate::fingerprint::{self, input_fingerprint};
use crate::generator::{configure, GenKind, GeneratorConfig, Generators};
use crate::qrc::{self, plan_manifests, ResourceManifest};
use crate::toolchain::ToolResolver;

/// A non-fatal failure, attributed to one generator or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub generator: Option<GenKind>,
    pub path:      Option<PathBuf>,
    pub message:   String,
}

impl Diagnostic {
    fn from_error(generator: Option<GenKind>, err: &AutogenError) -> Self {
        Self {
            generator,
            path: err.path().map(Path::to_path_buf),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generator {
            Some(g) => write!(f, "[{}] {}", g, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Result of initializing one target.
#[derive(Debug, Clone, Serialize)]
pub struct InitOutcome {
    pub fingerprint: String,
    pub generators:  Generators,
    /// `None` when no generator ended up enabled.
    pub target:      Option<AutogenTarget>,
    pub manifests:   Vec<ResourceManifest>,
    pub plan:        Plan,
    pub artifacts:   Option<Artifacts>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Initializer<'a> {
    resolver: &'a dyn ToolResolver,
    detector: Option<&'a dyn NeedDetector>,
}

impl<'a> Initializer<'a> {
    pub fn new(resolver: &'a dyn ToolResolver) -> Self {
        Self { resolver, detector: None }
    }

    /// Replace the default regex content scanner.
    pub fn with_detector(mut self, detector: &'a dyn NeedDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn run(&self, desc: &TargetDescription, graph: &mut dyn BuildGraph) -> Result<InitOutcome> {
        let ctx = Context::new(desc)?;
        let fingerprint = input_fingerprint(desc, ctx.qt)?;
        let mut diagnostics = Vec::new();

        // ── 1. Configure ───────────────────────────────────────────────────
        let mut configure_or_disable = |kind: GenKind| -> Result<GeneratorConfig> {
            match configure(kind, &ctx, self.resolver) {
                Err(e) if !e.is_fatal() => {
                    warn!(target_name = %desc.name, generator = %kind, "{e}");
                    diagnostics.push(Diagnostic::from_error(Some(kind), &e));
                    Ok(GeneratorConfig::disabled(kind))
                }
                other => other,
            }
        };
        let gens = Generators {
            moc: configure_or_disable(GenKind::Moc)?,
            uic: configure_or_disable(GenKind::Uic)?,
            rcc: configure_or_disable(GenKind::Rcc)?,
        };

        if !gens.any_enabled() {
            info!(target_name = %desc.name, "no generator enabled, nothing to do");
            return Ok(InitOutcome {
                fingerprint,
                generators: gens,
                target: None,
                manifests: Vec::new(),
                plan: Plan::default(),
                artifacts: None,
                diagnostics,
            });
        }

        // ── 2. Classify ────────────────────────────────────────────────────
        let scanner;
        let detector: &dyn NeedDetector = match self.detector {
            Some(d) => d,
            None => {
                scanner = ContentScanner::new(&desc.moc.macro_names)?;
                &scanner
            }
        };
        let mut classifier = Classifier::new(&gens, detector, desc.conflict_policy);
        classifier.classify(&ctx.sources)?;
        let classification = classifier.finish();

        // ── 3. Scan manifests ──────────────────────────────────────────────
        let mut manifests = Vec::new();
        if let Some(rcc) = gens.rcc.rcc() {
            let qrcs: Vec<&SourceEntry> = classification.qrcs.values().collect();
            for builder in plan_manifests(&qrcs, &ctx, rcc) {
                if builder.is_generated() {
                    manifests.push(builder.build(Vec::new()));
                    continue;
                }
                match qrc::scan(builder.path()) {
                    Ok(files) => manifests.push(builder.build(files)),
                    Err(e) if !e.is_fatal() => {
                        warn!(target_name = %desc.name, path = %builder.path().display(), "{e}");
                        diagnostics.push(Diagnostic::from_error(Some(GenKind::Rcc), &e));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        // ── 4. Assemble ────────────────────────────────────────────────────
        let (target, plan) = assemble(&ctx, &gens, &classification, &manifests, &*graph)?;

        // ── 5. Emit ────────────────────────────────────────────────────────
        let artifacts = emit(&ctx, &gens, &target, &classification, &manifests, &fingerprint)?;

        // ── 6. Apply ───────────────────────────────────────────────────────
        plan.apply(graph);

        info!(
            target_name = %desc.name,
            steps = plan.steps.len(),
            manifests = manifests.len(),
            diagnostics = diagnostics.len(),
            "initialized"
        );

        Ok(InitOutcome {
            fingerprint,
            generators: gens,
            target: Some(target),
            manifests,
            plan,
            artifacts: Some(artifacts),
            diagnostics,
        })
    }
}

/// True when the target's stored fingerprint no longer matches its inputs
/// and the initializer has to run again.
pub fn is_stale(desc: &TargetDescription) -> Result<bool> {
    let ctx = Context::new(desc)?;
    let any_requested = desc.moc.switch.enabled || desc.uic.switch.enabled || desc.rcc.switch.enabled;
    if !any_requested {
        return Ok(false);
    }
    let expected = input_fingerprint(desc, ctx.qt)?;
    Ok(fingerprint::is_stale(&ctx.dirs.info_file(), &expected))
}
