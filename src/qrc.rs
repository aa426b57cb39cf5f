// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: qrc  —  resource manifest scanning
//
//  A manifest looks like:
//
//      <RCC>
//        <qresource prefix="/">
//          <file>icons/icon.png</file>
//          <file alias="logo.svg">art/logo.svg</file>
//        </qresource>
//      </RCC>
//
//  Scanning yields the packaged files, resolved against the manifest's own
//  directory, deduplicated, in document order. Referenced files are not
//  required to exist yet; another build step may still produce them.
//
//  Manifests are planned first (names, paths, options) and turned into an
//  immutable `ResourceManifest` only once their file list is known.
// ─────────────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::{ConfigValue, Context, SourceEntry};
use crate::error::{AutogenError, Result};
use crate::fingerprint::path_checksum;
use crate::generator::RccSettings;
use crate::paths;

static FILE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<file(?:\s[^>]*)?>").expect("Invalid file-open regex"));
static FILE_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<file(?:\s[^>]*)?>([^<]*)</file>").expect("Invalid file-element regex"));

// ─────────────────────────────────────────────────────────────────────────────
//  Scanner
// ─────────────────────────────────────────────────────────────────────────────

/// Read and parse the manifest at `path`.
pub fn scan(path: &Path) -> Result<Vec<PathBuf>> {
    let bytes = fs::read(path).map_err(|e| AutogenError::read(path, e))?;
    let content = String::from_utf8(bytes).map_err(|_| AutogenError::Parse {
        path: path.to_path_buf(),
        reason: "not valid UTF-8".to_owned(),
    })?;
    let files = parse_content(&content, path)?;
    debug!(path = %path.display(), files = files.len(), "scanned resource manifest");
    Ok(files)
}

/// Parse manifest text; `manifest` is used to resolve relative entries and
/// to name the file in errors.
pub fn parse_content(content: &str, manifest: &Path) -> Result<Vec<PathBuf>> {
    let malformed = |reason: &str| AutogenError::Parse {
        path: manifest.to_path_buf(),
        reason: reason.to_owned(),
    };

    let content = strip_markup(content).map_err(malformed)?;
    let content = content.as_str();

    let root = content.find("<RCC").ok_or_else(|| malformed("missing <RCC> root element"))?;
    let after_root = &content[root..];
    let self_closing = after_root.find('>').is_some_and(|end| after_root[..end].ends_with('/'));
    if !self_closing && !after_root.contains("</RCC>") {
        return Err(malformed("unterminated <RCC> element"));
    }

    let opened = FILE_OPEN.find_iter(content).count();
    let elements: Vec<&str> = FILE_ELEMENT.captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if opened != elements.len() {
        return Err(malformed("unbalanced <file> element"));
    }

    let base = manifest.parent().unwrap_or(Path::new(""));
    let mut files = IndexSet::new();
    for raw in elements {
        let text = decode_entities(raw.trim());
        if text.is_empty() {
            return Err(malformed("empty <file> element"));
        }
        files.insert(paths::absolute(base, Path::new(&text)));
    }
    Ok(files.into_iter().collect())
}

/// Drop comments and processing instructions and unwrap CDATA sections, so
/// only live elements are left.
fn strip_markup(content: &str) -> std::result::Result<String, &'static str> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let (open, close, unterminated) = if tail.starts_with("<!--") {
            ("<!--", "-->", "unterminated comment")
        } else if tail.starts_with("<![CDATA[") {
            ("<![CDATA[", "]]>", "unterminated CDATA section")
        } else if tail.starts_with("<?") {
            ("<?", "?>", "unterminated processing instruction")
        } else {
            out.push('<');
            rest = &tail[1..];
            continue;
        };
        let body_len = tail[open.len()..].find(close).ok_or(unterminated)?;
        let body = &tail[open.len()..open.len() + body_len];
        if open == "<![CDATA[" {
            out.push_str(&body.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;"));
        } else {
            out.push(' ');
        }
        rest = &tail[open.len() + body_len + close.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ─────────────────────────────────────────────────────────────────────────────
//  Option merging
// ─────────────────────────────────────────────────────────────────────────────

/// Options that take a value; a later occurrence replaces an earlier one.
const VALUE_OPTIONS: &[&str] = &["name", "root", "compress", "threshold"];

fn option_name(opt: &str) -> Option<&str> {
    let bare = opt.strip_prefix("--").or_else(|| opt.strip_prefix('-'))?;
    VALUE_OPTIONS.contains(&bare).then_some(bare)
}

/// Merge `extra` over `base`. Flags already present are not repeated.
pub fn merge_rcc_options(base: &[String], extra: &[String]) -> Vec<String> {
    let mut out = base.to_vec();
    let mut i = 0;
    while i < extra.len() {
        let opt = &extra[i];
        match (option_name(opt), extra.get(i + 1)) {
            (Some(name), Some(value)) => {
                let existing = out.iter().position(|o| option_name(o) == Some(name));
                match existing {
                    Some(pos) if pos + 1 < out.len() => {
                        out[pos] = opt.clone();
                        out[pos + 1] = value.clone();
                    }
                    _ => {
                        out.push(opt.clone());
                        out.push(value.clone());
                    }
                }
                i += 2;
            }
            _ => {
                if !out.contains(opt) {
                    out.push(opt.clone());
                }
                i += 1;
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
//  Manifests
// ─────────────────────────────────────────────────────────────────────────────

/// One resource manifest, complete with its scanned inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceManifest {
    pub path:      PathBuf,
    /// File stem of the manifest.
    pub name:      String,
    pub checksum:  String,
    /// No other manifest of the target shares `name`.
    pub unique:    bool,
    pub generated: bool,
    /// Folded into the umbrella step instead of getting its own.
    pub aggregate: bool,
    pub output_file: PathBuf,
    pub lock_file:   PathBuf,
    pub info_file:   PathBuf,
    /// Per-config info files, only when the options vary.
    pub config_info_files: BTreeMap<String, PathBuf>,
    pub settings_file:     PathBuf,
    /// Multi-config only.
    pub config_settings_files: BTreeMap<String, PathBuf>,
    pub options:   ConfigValue<Vec<String>>,
    /// Packaged files; empty for generated manifests.
    pub inputs:    Vec<PathBuf>,
}

impl ResourceManifest {
    /// `name` or `name_<checksum>` for manifests that share a name.
    pub fn key(&self) -> String {
        if self.unique {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, self.checksum)
        }
    }

    /// Every artifact written for this manifest: the shared info file, or
    /// one per configuration when the options vary.
    pub fn info_files(&self) -> Vec<(&str, &Path)> {
        if self.config_info_files.is_empty() {
            vec![("", self.info_file.as_path())]
        } else {
            self.config_info_files.iter().map(|(c, p)| (c.as_str(), p.as_path())).collect()
        }
    }
}

/// Everything about a manifest except its inputs.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    manifest: ResourceManifest,
}

impl ManifestBuilder {
    pub fn path(&self) -> &Path {
        &self.manifest.path
    }

    pub fn is_generated(&self) -> bool {
        self.manifest.generated
    }

    pub fn build(mut self, inputs: Vec<PathBuf>) -> ResourceManifest {
        self.manifest.inputs = inputs;
        self.manifest
    }
}

/// Plan every manifest of the target, in source order.
pub fn plan_manifests(qrcs: &[&SourceEntry], ctx: &Context, rcc: &RccSettings) -> Vec<ManifestBuilder> {
    let stem = |p: &Path| p.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

    let mut name_count: BTreeMap<String, usize> = BTreeMap::new();
    for entry in qrcs {
        *name_count.entry(stem(&entry.path)).or_default() += 1;
    }

    let name_flag = if ctx.qt.major >= 5 { "--name" } else { "-name" };
    let dirs = &ctx.dirs;

    qrcs.iter()
        .map(|entry| {
            let name = stem(&entry.path);
            let checksum = path_checksum(&entry.path, &ctx.desc.source_dir, &ctx.desc.binary_dir);
            let unique = name_count.get(&name) == Some(&1);

            let key = if unique { name.clone() } else { format!("{name}_{checksum}") };
            let base = format!("rcc_{key}");
            let output_file = if unique {
                dirs.build.join(format!("qrc_{name}.cpp"))
            } else {
                dirs.build.join(&checksum).join(format!("qrc_{name}.cpp"))
            };

            let mut file_opts = entry.rcc_options.clone();
            if !unique {
                file_opts.extend([name_flag.to_owned(), format!("{name}_{checksum}")]);
            }
            let options = rcc.options.map(|target_opts| merge_rcc_options(target_opts, &file_opts));

            let info_file = dirs.info.join(format!("{base}_info.txt"));
            let config_info_files = options.per_config.keys()
                .map(|cfg| (cfg.clone(), paths::with_suffix(&info_file, &format!("_{cfg}"))))
                .collect();

            let settings_file = dirs.info.join(format!("{base}_settings.txt"));
            let config_settings_files = if ctx.configs.is_multi() {
                ctx.configs.names().iter()
                    .map(|cfg| (cfg.clone(), paths::with_suffix(&settings_file, &format!("_{cfg}"))))
                    .collect()
            } else {
                BTreeMap::new()
            };

            ManifestBuilder {
                manifest: ResourceManifest {
                    path: entry.path.clone(),
                    name,
                    checksum,
                    unique,
                    generated: entry.generated,
                    aggregate: entry.rcc_aggregate,
                    output_file,
                    lock_file: dirs.info.join(format!("{base}.lock")),
                    info_file,
                    config_info_files,
                    settings_file,
                    config_settings_files,
                    options,
                    inputs: Vec::new(),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetDescription;
    use pretty_assertions::assert_eq;

    const QRC: &str = r#"<!DOCTYPE RCC><RCC version="1.0">
<qresource prefix="/">
    <file>icon.png</file>
    <file alias="second">img/../icon2.png</file>
    <file> icon.png </file>
    <file>a&amp;b.txt</file>
</qresource>
</RCC>
"#;

    #[test]
    fn resolves_dedupes_and_keeps_document_order() {
        let files = parse_content(QRC, Path::new("/src/res/b.qrc")).unwrap();
        assert_eq!(files, vec![
            PathBuf::from("/src/res/icon.png"),
            PathBuf::from("/src/res/icon2.png"),
            PathBuf::from("/src/res/a&b.txt"),
        ]);
        // Scanning twice gives the same answer
        assert_eq!(files, parse_content(QRC, Path::new("/src/res/b.qrc")).unwrap());
    }

    #[test]
    fn commented_out_entries_are_not_packaged() {
        let content = "<?xml version=\"1.0\"?>\n<RCC><qresource>\n<file>icon.png</file>\n\
                       <!-- <file>old_removed.png</file> -->\n\
                       <file><![CDATA[a&b<1>.png]]></file>\n</qresource></RCC>";
        let files = parse_content(content, Path::new("/s/b.qrc")).unwrap();
        assert_eq!(files, vec![PathBuf::from("/s/icon.png"), PathBuf::from("/s/a&b<1>.png")]);

        // A root that only exists inside a comment is no root
        let err = parse_content("<!-- <RCC></RCC> -->", Path::new("/s/b.qrc")).unwrap_err();
        assert!(err.to_string().contains("missing <RCC>"));
    }

    #[test]
    fn non_utf8_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let qrc = dir.path().join("b.qrc");
        fs::write(&qrc, b"<RCC><qresource><file>caf\xe9.png</file></qresource></RCC>").unwrap();

        let err = scan(&qrc).unwrap_err();
        assert!(matches!(err, AutogenError::Parse { .. }));
        assert!(!err.is_fatal());
        assert_eq!(err.path(), Some(qrc.as_path()));
    }

    #[test]
    fn empty_manifest_is_not_an_error() {
        let files = parse_content("<RCC><qresource/></RCC>", Path::new("/s/e.qrc")).unwrap();
        assert!(files.is_empty());
        assert!(parse_content("<RCC/>", Path::new("/s/e.qrc")).unwrap().is_empty());
    }

    #[test]
    fn malformed_content_names_the_manifest() {
        let cases = [
            ("<qresource></qresource>", "missing <RCC>"),
            ("<RCC><qresource>", "unterminated"),
            ("<RCC><file>a.png</RCC>", "unbalanced"),
            ("<RCC><file>  </file></RCC>", "empty"),
            ("<RCC><!-- <file>a.png</file></RCC>", "unterminated comment"),
        ];
        for (content, reason) in cases {
            let err = parse_content(content, Path::new("/s/bad.qrc")).unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, AutogenError::Parse { .. }), "{content}");
            assert!(msg.contains("/s/bad.qrc") && msg.contains(reason), "{msg}");
        }
    }

    #[test]
    fn scan_reads_from_disk_and_reports_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let qrc = dir.path().join("b.qrc");
        fs::write(&qrc, "<RCC><qresource><file>missing-yet.png</file></qresource></RCC>").unwrap();
        assert_eq!(scan(&qrc).unwrap(), vec![dir.path().join("missing-yet.png")]);

        let err = scan(&dir.path().join("none.qrc")).unwrap_err();
        assert!(matches!(err, AutogenError::MissingSource(_)));
    }

    #[test]
    fn value_options_replace_earlier_occurrences() {
        let base: Vec<String> = ["-name", "app", "--compress", "9", "--no-compress-x"]
            .iter().map(|s| s.to_string()).collect();
        let extra: Vec<String> = ["--name", "res_abc", "--no-compress-x", "--binary"]
            .iter().map(|s| s.to_string()).collect();
        assert_eq!(
            merge_rcc_options(&base, &extra),
            vec!["--name", "res_abc", "--compress", "9", "--no-compress-x", "--binary"]
        );
    }

    fn ctx_desc() -> TargetDescription {
        TargetDescription {
            name: "app".into(),
            source_dir: "/src".into(),
            binary_dir: "/build".into(),
            qt_version: "5.15.2".into(),
            configs: vec!["Debug".into(), "Release".into()],
            multi_config: true,
            ..Default::default()
        }
    }

    #[test]
    fn colliding_names_get_checksummed_paths() {
        let desc = ctx_desc();
        let ctx = Context::new(&desc).unwrap();
        let a = SourceEntry { path: "/src/a/res.qrc".into(), ..Default::default() };
        let b = SourceEntry { path: "/src/b/res.qrc".into(), ..Default::default() };
        let c = SourceEntry { path: "/src/other.qrc".into(), ..Default::default() };
        let rcc = RccSettings { options: ConfigValue::shared(vec![]), list_options: vec!["--list".into()] };

        let plans = plan_manifests(&[&a, &b, &c], &ctx, &rcc);
        let built: Vec<ResourceManifest> = plans.into_iter().map(|p| p.build(Vec::new())).collect();

        assert!(!built[0].unique && !built[1].unique && built[2].unique);
        assert_ne!(built[0].output_file, built[1].output_file);
        assert_ne!(built[0].info_file, built[1].info_file);
        assert_ne!(built[0].settings_file, built[1].settings_file);
        assert_eq!(built[2].output_file, PathBuf::from("/build/app_autogen/qrc_other.cpp"));
        assert_eq!(built[2].info_file, PathBuf::from("/build/.autogen/app.dir/rcc_other_info.txt"));
        assert_eq!(
            built[0].options.default,
            vec!["--name".to_string(), format!("res_{}", built[0].checksum)]
        );
        assert_eq!(built[2].config_settings_files.len(), 2);
        assert_eq!(built[2].info_files(), vec![("", built[2].info_file.as_path())]);
    }

    #[test]
    fn varying_options_give_one_info_file_per_config() {
        let desc = ctx_desc();
        let ctx = Context::new(&desc).unwrap();
        let q = SourceEntry { path: "/src/r.qrc".into(), ..Default::default() };
        let mut per_config = BTreeMap::new();
        per_config.insert("Debug".to_string(), vec!["--compress".to_string(), "1".into()]);
        per_config.insert("Release".to_string(), vec!["--compress".to_string(), "9".into()]);
        let rcc = RccSettings {
            options: ConfigValue { default: vec!["--compress".into(), "1".into()], per_config },
            list_options: vec!["--list".into()],
        };

        let m = plan_manifests(&[&q], &ctx, &rcc).remove(0).build(vec![]);
        assert_eq!(
            m.info_files().into_iter().map(|(c, _)| c).collect::<Vec<_>>(),
            vec!["Debug", "Release"]
        );
        assert_eq!(
            m.config_info_files["Release"],
            PathBuf::from("/build/.autogen/app.dir/rcc_r_info_Release.txt")
        );
    }
}
