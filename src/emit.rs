// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: emit  —  settings artifacts
//
//  Two kinds of artifact, both in the `info` record format:
//
//    <info>/autogen_info.txt            AG_* keys, one per target
//    <info>/rcc_<name>_info[_CFG].txt   AR_* keys, one per manifest
//                                       (one per config if options vary)
//
//  Rendering is pure; `emit` writes every artifact atomically and leaves
//  files whose bytes did not change untouched.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::assemble::AutogenTarget;
use crate::classify::{Bucket, Classification, FileKind};
use crate::config::Context;
use crate::error::Result;
use crate::fingerprint::FINGERPRINT_KEY;
use crate::generator::{GenKind, Generators};
use crate::info::InfoWriter;
use crate::paths;
use crate::qrc::ResourceManifest;

/// Paths of every artifact written for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub general:   PathBuf,
    pub resources: Vec<PathBuf>,
    /// Subset whose content actually changed on this run.
    pub changed:   Vec<PathBuf>,
}

pub fn emit(
    ctx:            &Context,
    gens:           &Generators,
    target:         &AutogenTarget,
    classification: &Classification,
    manifests:      &[ResourceManifest],
    fingerprint:    &str,
) -> Result<Artifacts> {
    let mut artifacts = Artifacts { general: target.info_file.clone(), ..Default::default() };

    let general = render_general(ctx, gens, target, classification, manifests, fingerprint);
    if general.commit(&target.info_file)? {
        artifacts.changed.push(target.info_file.clone());
    }

    for manifest in manifests {
        for (config, path) in manifest.info_files() {
            let writer = render_resource(ctx, gens, manifest, config, fingerprint);
            if writer.commit(path)? {
                artifacts.changed.push(path.to_path_buf());
            }
            artifacts.resources.push(path.to_path_buf());
        }
    }

    debug!(
        target_name = %ctx.desc.name,
        written = artifacts.changed.len(),
        total = artifacts.resources.len() + 1,
        "settings artifacts"
    );
    Ok(artifacts)
}

fn path_map(map: &BTreeMap<String, PathBuf>) -> BTreeMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), paths::display(v))).collect()
}

fn in_bucket(classification: &Classification, bucket: Bucket, kind: FileKind) -> Vec<&Path> {
    classification.files.iter()
        .filter(|(_, f)| f.bucket == bucket && f.kind == kind)
        .map(|(p, _)| p.as_path())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
//  General artifact
// ─────────────────────────────────────────────────────────────────────────────

pub fn render_general(
    ctx:            &Context,
    gens:           &Generators,
    target:         &AutogenTarget,
    classification: &Classification,
    manifests:      &[ResourceManifest],
    fingerprint:    &str,
) -> InfoWriter {
    let desc = ctx.desc;
    let dirs = &target.dirs;
    let mut w = InfoWriter::new();

    w.comment("Meta");
    w.write(FINGERPRINT_KEY, fingerprint);
    w.write_bool("AG_MULTI_CONFIG", ctx.configs.is_multi());
    w.write_strings("AG_CONFIGS", &desc.configs);
    w.write_config_value("AG_PARALLEL", &target.parallel);
    w.write("AG_VERBOSITY", &desc.verbosity);

    w.comment("Directories");
    w.write_path("AG_SOURCE_DIR", &desc.source_dir);
    w.write_path("AG_BINARY_DIR", &desc.binary_dir);
    w.write_path("AG_BUILD_DIR", &dirs.build);
    w.write_path("AG_WORK_DIR", &dirs.work);
    w.write_path("AG_INCLUDE_DIR", &dirs.include);
    w.write_config("AG_INCLUDE_DIR", &path_map(&dirs.config_include));

    w.comment("Files");
    w.write_paths("AG_HEADERS", &target.headers);
    w.write_paths("AG_SOURCES", &target.sources);
    w.write_paths("AG_HEADERS_GENERATED", &target.headers_generated);
    w.write_paths("AG_SOURCES_GENERATED", &target.sources_generated);
    w.write_path("AG_SETTINGS_FILE", &target.settings_file);
    w.write_config("AG_SETTINGS_FILE", &path_map(&target.config_settings_files));
    w.write_paths("AG_DEPEND_FILES", &target.depend_files);
    w.write_strings("AG_DEPEND_TARGETS", &target.depend_targets);

    w.comment("Qt");
    w.write_uint("AG_QT_VERSION_MAJOR", ctx.qt.major.into());
    w.write_uint("AG_QT_VERSION_MINOR", ctx.qt.minor.into());
    w.write_strings("AG_GENERATORS", gens.enabled_kinds().into_iter().map(GenKind::upper));

    if let Some(moc) = gens.moc.moc() {
        w.comment("MOC settings");
        w.write_path("AG_MOC_EXECUTABLE", &gens.moc.executable);
        w.write_paths("AG_MOC_SKIP", &moc.skip);
        w.write_config_strings("AG_MOC_DEFINITIONS", &moc.defines);
        w.write_config_strings("AG_MOC_INCLUDES", &moc.includes);
        w.write_strings("AG_MOC_OPTIONS", &moc.options);
        w.write_bool("AG_MOC_RELAXED_MODE", moc.relaxed_mode);
        w.write_strings("AG_MOC_MACRO_NAMES", &moc.macro_names);
        w.write_strings("AG_MOC_DEPEND_FILTERS", &moc.depend_filters);
        w.write_strings("AG_MOC_PREDEFS_CMD", &moc.predefs_cmd);
        if let Some(mocs) = &target.mocs_compilation {
            w.write_path("AG_MOC_COMPILATION_FILE", mocs);
        }
        w.write_paths("AG_MOC_HEADERS", in_bucket(classification, Bucket::Moc, FileKind::Header));
        w.write_paths("AG_MOC_SOURCES", in_bucket(classification, Bucket::Moc, FileKind::Source));
    }

    if let Some(uic) = gens.uic.uic() {
        w.comment("UIC settings");
        w.write_path("AG_UIC_EXECUTABLE", &gens.uic.executable);
        w.write_paths("AG_UIC_SKIP", &uic.skip);
        w.write_config_strings("AG_UIC_TARGET_OPTIONS", &uic.options);
        w.write_paths("AG_UIC_OPTIONS_FILES", uic.file_options.iter().map(|(p, _)| p));
        let nested: Vec<Vec<String>> = uic.file_options.iter().map(|(_, o)| o.clone()).collect();
        w.write_nested_lists("AG_UIC_OPTIONS_OPTIONS", &nested);
        w.write_strings("AG_UIC_SEARCH_PATHS", &uic.search_paths);
        w.write_paths("AG_UIC_UI_FILES", &target.forms);
        w.write_paths("AG_UIC_HEADERS", in_bucket(classification, Bucket::Uic, FileKind::Header));
        w.write_paths("AG_UIC_SOURCES", in_bucket(classification, Bucket::Uic, FileKind::Source));
    }

    let aggregated: Vec<&Path> = manifests.iter()
        .filter(|m| m.aggregate)
        .flat_map(|m| m.info_files().into_iter().map(|(_, p)| p))
        .collect();
    if !aggregated.is_empty() {
        w.comment("RCC aggregated into the umbrella step");
        w.write_paths("AG_RCC_INFO_FILES", aggregated);
    }

    w
}

// ─────────────────────────────────────────────────────────────────────────────
//  Resource artifact
// ─────────────────────────────────────────────────────────────────────────────

/// Render the artifact of one manifest; `config` is `""` for the shared file.
pub fn render_resource(
    ctx:         &Context,
    gens:        &Generators,
    manifest:    &ResourceManifest,
    config:      &str,
    fingerprint: &str,
) -> InfoWriter {
    let dirs = &ctx.dirs;
    let list_options = gens.rcc.rcc().map(|r| r.list_options.as_slice()).unwrap_or_default();
    let mut w = InfoWriter::new();

    w.comment("Meta");
    w.write(FINGERPRINT_KEY, fingerprint);
    w.write_bool("AR_MULTI_CONFIG", ctx.configs.is_multi());
    w.write("AR_CONFIG", config);
    w.write("AR_VERBOSITY", &ctx.desc.verbosity);

    w.comment("Directories");
    w.write_path("AR_BUILD_DIR", &dirs.build);
    w.write_path("AR_INCLUDE_DIR", &dirs.include);
    w.write_config("AR_INCLUDE_DIR", &path_map(&dirs.config_include));
    w.write_path("AR_SETTINGS_FILE", &manifest.settings_file);
    w.write_config("AR_SETTINGS_FILE", &path_map(&manifest.config_settings_files));
    w.write_path("AR_LOCK_FILE", &manifest.lock_file);

    w.comment("rcc");
    w.write_path("AR_RCC_EXECUTABLE", &gens.rcc.executable);
    w.write_strings("AR_RCC_LIST_OPTIONS", list_options);

    w.comment("Manifest");
    w.write_path("AR_SOURCE", &manifest.path);
    w.write("AR_OUTPUT_CHECKSUM", &manifest.checksum);
    w.write_path("AR_OUTPUT_FILE", &manifest.output_file);
    w.write_strings("AR_OPTIONS", manifest.options.get(config));
    w.write_paths("AR_INPUTS", &manifest.inputs);
    w.write_bool("AR_GENERATED", manifest.generated);
    w
}
