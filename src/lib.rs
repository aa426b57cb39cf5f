// ─────────────────────────────────────────────────────────────────────────────
//  autogen_init  —  public library API
//
//  Plans the moc / uic / rcc generation steps of one build target and writes
//  the settings artifacts the build-time execution stage reads.
// ─────────────────────────────────────────────────────────────────────────────

pub mod assemble;
pub mod classify;
pub mod config;
pub mod emit;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod info;
pub mod initializer;
pub mod paths;
pub mod qrc;
pub mod toolchain;

pub use assemble::{AutogenTarget, BuildGraph, BuildStep, Plan, RecordingGraph, StepKind};
pub use classify::{Bucket, ContentScanner, Need, NeedDetector};
pub use config::{load_from_file, ConfigValue, ConflictPolicy, SourceEntry, SourceSpec, TargetDescription};
pub use error::{AutogenError, Result};
pub use generator::{GenKind, GeneratorConfig, Generators};
pub use info::{InfoReader, InfoWriter};
pub use initializer::{is_stale, Diagnostic, InitOutcome, Initializer};
pub use qrc::ResourceManifest;
pub use toolchain::{QtToolchain, ToolMap, ToolResolver};

/// One-shot: initialize the target described by the TOML file at `path`,
/// resolving tools from `AUTOGEN_QT_BIN` / `PATH`.
///
/// ```no_run
/// use autogen_init::{init_file, RecordingGraph};
///
/// let mut graph = RecordingGraph::new();
/// let outcome = init_file("app/autogen.toml".as_ref(), &mut graph).unwrap();
/// println!("{} steps", outcome.plan.steps.len());
/// ```
pub fn init_file(path: &std::path::Path, graph: &mut dyn BuildGraph) -> Result<InitOutcome> {
    let desc = load_from_file(path)?;
    let qt = config::QtVersion::parse(&desc.qt_version)?;
    let toolchain = QtToolchain::from_env(qt.major);
    Initializer::new(&toolchain).run(&desc, graph)
}
