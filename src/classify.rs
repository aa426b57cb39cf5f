// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init :: classify  —  source classification
//
//  Walks the target's source list once and puts every file in exactly one
//  bucket:
//
//    Moc         header/source the need detector says needs moc
//    Uic         header/source that includes a ui_*.h, or a .ui form
//    Generated   produced by another build step; scanned at build time
//    Resource    .qrc manifest handed to rcc
//    Irrelevant  everything else (skipped, disabled generator, no need)
//
//  Precedence per file: skip annotation → generated → need detector.
// ─────────────────────────────────────────────────────────────────────────────

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::config::{ConflictPolicy, SourceEntry};
use crate::error::{AutogenError, Result};
use crate::generator::Generators;

// ── File kinds ────────────────────────────────────────────────────────────────

const HEADER_EXTS: &[&str] = &["h", "hh", "h++", "hm", "hpp", "hxx", "in", "txx"];
const SOURCE_EXTS: &[&str] = &["c", "cc", "c++", "cpp", "cxx", "m", "mm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileKind {
    Header,
    Source,
    Form,
    Resource,
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
            return FileKind::Other;
        };
        // `.C` and `.M` are C++ / Objective-C++ sources
        if ext == "C" || ext == "M" {
            return FileKind::Source;
        }
        let ext = ext.to_lowercase();
        if HEADER_EXTS.contains(&ext.as_str()) {
            FileKind::Header
        } else if SOURCE_EXTS.contains(&ext.as_str()) {
            FileKind::Source
        } else if ext == "ui" {
            FileKind::Form
        } else if ext == "qrc" {
            FileKind::Resource
        } else {
            FileKind::Other
        }
    }

    pub fn is_code(self) -> bool {
        matches!(self, FileKind::Header | FileKind::Source)
    }
}

// ── Need detection ────────────────────────────────────────────────────────────

/// Which content-driven generators a file needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Need {
    pub moc: bool,
    pub uic: bool,
}

impl Need {
    pub const NONE: Need = Need { moc: false, uic: false };
    pub const MOC:  Need = Need { moc: true,  uic: false };
    pub const UIC:  Need = Need { moc: false, uic: true };
}

/// Content-based generation-need detector.
pub trait NeedDetector: Sync {
    fn needs_generation(&self, path: &Path) -> Result<Need>;
}

/// Default detector: regex scan for moc macros and `ui_*.h` includes.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    moc_re: Regex,
    uic_re: Regex,
}

const MOC_MACROS: &[&str] = &["Q_OBJECT", "Q_GADGET", "Q_NAMESPACE", "Q_NAMESPACE_EXPORT"];

impl ContentScanner {
    /// `extra_macros` are additional class macros that require moc.
    pub fn new(extra_macros: &[String]) -> Result<Self> {
        let mut names: Vec<String> = MOC_MACROS.iter().map(|m| regex::escape(m)).collect();
        names.extend(extra_macros.iter().filter(|m| !m.is_empty()).map(|m| regex::escape(m)));

        let moc_re = Regex::new(&format!(r"(?m)^[ \t]*(?:{})\b", names.join("|")))
            .map_err(|e| AutogenError::config(format!("invalid moc macro name: {e}")))?;
        let uic_re = Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*["<](?:[^">]*/)?ui_[^">/]+\.h[">]"#)
            .map_err(|e| AutogenError::config(e.to_string()))?;
        Ok(Self { moc_re, uic_re })
    }
}

impl NeedDetector for ContentScanner {
    fn needs_generation(&self, path: &Path) -> Result<Need> {
        // Macros and includes are ASCII; stray Latin-1 in comments is fine.
        let bytes = fs::read(path).map_err(|e| AutogenError::read(path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(Need {
            moc: self.moc_re.is_match(&content),
            uic: self.uic_re.is_match(&content),
        })
    }
}

// ── Classifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bucket {
    Moc,
    Uic,
    Generated,
    Resource,
    Irrelevant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedFile {
    pub kind:   FileKind,
    pub bucket: Bucket,
    /// Marked generated + skip_autogen, i.e. an output this initializer
    /// registered on an earlier run.
    pub registered_output: bool,
}

pub struct Classifier<'a> {
    gens:     &'a Generators,
    detector: &'a dyn NeedDetector,
    policy:   ConflictPolicy,
    out:      Classification,
}

/// Frozen classifier result; the assembler only ever sees this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub files:             IndexMap<PathBuf, ClassifiedFile>,
    pub headers:           IndexSet<PathBuf>,
    pub sources:           IndexSet<PathBuf>,
    pub headers_generated: IndexSet<PathBuf>,
    pub sources_generated: IndexSet<PathBuf>,
    /// Manifests in source order, with their annotations.
    pub qrcs:              IndexMap<PathBuf, SourceEntry>,
}

impl Classification {
    pub fn bucket(&self, path: &Path) -> Option<Bucket> {
        self.files.get(path).map(|f| f.bucket)
    }

    /// Files in `bucket`, in source order.
    pub fn in_bucket(&self, bucket: Bucket) -> Vec<&Path> {
        self.files.iter()
            .filter(|(_, f)| f.bucket == bucket)
            .map(|(p, _)| p.as_path())
            .collect()
    }
}

impl<'a> Classifier<'a> {
    pub fn new(gens: &'a Generators, detector: &'a dyn NeedDetector, policy: ConflictPolicy) -> Self {
        Self { gens, detector, policy, out: Classification::default() }
    }

    /// Classify `entries` (absolute paths). Re-classifying the same list is a
    /// no-op.
    pub fn classify(&mut self, entries: &[SourceEntry]) -> Result<()> {
        for entry in entries {
            if self.out.files.contains_key(&entry.path) {
                continue;
            }
            let kind = FileKind::of(&entry.path);
            let bucket = self.decide(entry, kind)?;
            debug!(path = %entry.path.display(), ?bucket, "classified");

            match (bucket, kind) {
                (Bucket::Moc | Bucket::Uic, FileKind::Header) => { self.out.headers.insert(entry.path.clone()); }
                (Bucket::Moc | Bucket::Uic, FileKind::Source) => { self.out.sources.insert(entry.path.clone()); }
                (Bucket::Generated, FileKind::Header) => { self.out.headers_generated.insert(entry.path.clone()); }
                (Bucket::Generated, FileKind::Source) => { self.out.sources_generated.insert(entry.path.clone()); }
                (Bucket::Resource, _) => { self.out.qrcs.insert(entry.path.clone(), entry.clone()); }
                _ => {}
            }

            self.out.files.insert(entry.path.clone(), ClassifiedFile {
                kind,
                bucket,
                registered_output: entry.generated && entry.skip_autogen,
            });
        }
        Ok(())
    }

    /// Freeze the result; nothing can be reclassified afterwards.
    pub fn finish(self) -> Classification {
        self.out
    }

    fn decide(&self, entry: &SourceEntry, kind: FileKind) -> Result<Bucket> {
        let path = &entry.path;
        match kind {
            FileKind::Resource => {
                let wanted = self.gens.rcc.enabled && !entry.skip_rcc && !entry.skip_autogen;
                Ok(if wanted { Bucket::Resource } else { Bucket::Irrelevant })
            }
            FileKind::Form => {
                Ok(if self.gens.uic.accepts(path) { Bucket::Uic } else { Bucket::Irrelevant })
            }
            FileKind::Header | FileKind::Source => {
                let moc_on = self.gens.moc.accepts(path);
                let uic_on = self.gens.uic.accepts(path);
                if entry.skip_autogen || !(moc_on || uic_on) {
                    return Ok(Bucket::Irrelevant);
                }
                if entry.generated {
                    return Ok(Bucket::Generated);
                }

                let need = self.detector.needs_generation(path)?;
                match (need.moc && moc_on, need.uic && uic_on) {
                    (true, true) => match self.policy {
                        ConflictPolicy::PreferMoc => Ok(Bucket::Moc),
                        ConflictPolicy::Error => Err(AutogenError::ClassificationConflict {
                            path: path.clone(),
                            reason: "needs both moc and uic processing".into(),
                        }),
                    },
                    (true, false) => Ok(Bucket::Moc),
                    (false, true) => Ok(Bucket::Uic),
                    (false, false) => Ok(Bucket::Irrelevant),
                }
            }
            FileKind::Other => Ok(Bucket::Irrelevant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GenKind, GenSettings, GeneratorConfig, MocSettings, UicSettings};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    /// Detector answering from a fixed table.
    struct Table(BTreeMap<PathBuf, Need>);

    impl NeedDetector for Table {
        fn needs_generation(&self, path: &Path) -> Result<Need> {
            Ok(self.0.get(path).copied().unwrap_or(Need::NONE))
        }
    }

    fn enabled(kind: GenKind, skip: &[&str]) -> GeneratorConfig {
        let mut cfg = GeneratorConfig::disabled(kind);
        cfg.enabled = true;
        let skip: IndexSet<PathBuf> = skip.iter().map(PathBuf::from).collect();
        match &mut cfg.settings {
            GenSettings::Moc(s) => *s = MocSettings { skip, ..Default::default() },
            GenSettings::Uic(s) => *s = UicSettings { skip, ..Default::default() },
            GenSettings::Rcc(_) => {}
        }
        cfg
    }

    fn gens(moc: bool, uic: bool, rcc: bool) -> Generators {
        let pick = |on: bool, kind| if on { enabled(kind, &[]) } else { GeneratorConfig::disabled(kind) };
        Generators { moc: pick(moc, GenKind::Moc), uic: pick(uic, GenKind::Uic), rcc: pick(rcc, GenKind::Rcc) }
    }

    fn entry(path: &str) -> SourceEntry {
        SourceEntry { path: path.into(), ..Default::default() }
    }

    fn table(rows: &[(&str, Need)]) -> Table {
        Table(rows.iter().map(|(p, n)| (PathBuf::from(p), *n)).collect())
    }

    #[test]
    fn file_kinds_by_extension() {
        assert_eq!(FileKind::of(Path::new("a.hpp")), FileKind::Header);
        assert_eq!(FileKind::of(Path::new("a.C")), FileKind::Source);
        assert_eq!(FileKind::of(Path::new("a.CPP")), FileKind::Source);
        assert_eq!(FileKind::of(Path::new("w.ui")), FileKind::Form);
        assert_eq!(FileKind::of(Path::new("r.qrc")), FileKind::Resource);
        assert_eq!(FileKind::of(Path::new("README")), FileKind::Other);
    }

    #[test]
    fn every_file_lands_in_exactly_one_bucket() {
        let g = gens(true, true, true);
        let det = table(&[("/s/a.h", Need::MOC), ("/s/b.cpp", Need::UIC)]);
        let entries = vec![
            entry("/s/a.h"),
            entry("/s/b.cpp"),
            entry("/s/c.cpp"),
            SourceEntry { generated: true, ..entry("/b/gen.h") },
            entry("/s/r.qrc"),
            entry("/s/w.ui"),
            entry("/s/notes.txt"),
        ];

        let mut c = Classifier::new(&g, &det, ConflictPolicy::Error);
        c.classify(&entries).unwrap();
        let out = c.finish();

        assert_eq!(out.files.len(), entries.len());
        assert_eq!(out.bucket(Path::new("/s/a.h")), Some(Bucket::Moc));
        assert_eq!(out.bucket(Path::new("/s/b.cpp")), Some(Bucket::Uic));
        assert_eq!(out.bucket(Path::new("/s/c.cpp")), Some(Bucket::Irrelevant));
        assert_eq!(out.bucket(Path::new("/b/gen.h")), Some(Bucket::Generated));
        assert_eq!(out.bucket(Path::new("/s/r.qrc")), Some(Bucket::Resource));
        assert_eq!(out.bucket(Path::new("/s/w.ui")), Some(Bucket::Uic));
        assert_eq!(out.bucket(Path::new("/s/notes.txt")), Some(Bucket::Irrelevant));

        assert_eq!(out.headers.iter().collect::<Vec<_>>(), vec![Path::new("/s/a.h")]);
        assert_eq!(out.sources.iter().collect::<Vec<_>>(), vec![Path::new("/s/b.cpp")]);
        assert_eq!(out.headers_generated.iter().collect::<Vec<_>>(), vec![Path::new("/b/gen.h")]);
        assert_eq!(out.qrcs.len(), 1);
    }

    #[test]
    fn classification_is_idempotent() {
        let g = gens(true, false, true);
        let det = table(&[("/s/a.h", Need::MOC)]);
        let entries = vec![entry("/s/a.h"), entry("/s/a.cpp"), entry("/s/b.qrc")];

        let mut once = Classifier::new(&g, &det, ConflictPolicy::Error);
        once.classify(&entries).unwrap();
        let mut twice = Classifier::new(&g, &det, ConflictPolicy::Error);
        twice.classify(&entries).unwrap();
        twice.classify(&entries).unwrap();

        assert_eq!(once.finish(), twice.finish());
    }

    #[test]
    fn skip_annotation_beats_detector() {
        let mut g = gens(true, false, false);
        g.moc = enabled(GenKind::Moc, &["/s/a.h"]);
        let det = table(&[("/s/a.h", Need::MOC), ("/s/b.h", Need::MOC)]);
        let entries = vec![entry("/s/a.h"), SourceEntry { skip_autogen: true, ..entry("/s/b.h") }];

        let mut c = Classifier::new(&g, &det, ConflictPolicy::Error);
        c.classify(&entries).unwrap();
        let out = c.finish();
        assert_eq!(out.in_bucket(Bucket::Irrelevant), vec![Path::new("/s/a.h"), Path::new("/s/b.h")]);
        assert!(out.headers.is_empty());
    }

    #[test]
    fn skipping_one_generator_keeps_the_other() {
        let mut g = gens(true, true, false);
        g.moc = enabled(GenKind::Moc, &["/s/a.cpp"]);
        let both = Need { moc: true, uic: true };
        let det = table(&[("/s/a.cpp", both)]);

        let mut c = Classifier::new(&g, &det, ConflictPolicy::Error);
        c.classify(&[entry("/s/a.cpp")]).unwrap();
        assert_eq!(c.finish().bucket(Path::new("/s/a.cpp")), Some(Bucket::Uic));
    }

    #[test]
    fn moc_and_uic_on_one_file_follows_policy() {
        let g = gens(true, true, false);
        let det = table(&[("/s/w.cpp", Need { moc: true, uic: true })]);

        let mut strict = Classifier::new(&g, &det, ConflictPolicy::Error);
        let err = strict.classify(&[entry("/s/w.cpp")]).unwrap_err();
        assert!(matches!(err, AutogenError::ClassificationConflict { .. }));

        let mut lenient = Classifier::new(&g, &det, ConflictPolicy::PreferMoc);
        lenient.classify(&[entry("/s/w.cpp")]).unwrap();
        assert_eq!(lenient.finish().bucket(Path::new("/s/w.cpp")), Some(Bucket::Moc));
    }

    #[test]
    fn disabled_generators_make_files_irrelevant() {
        let g = gens(false, false, false);
        let det = table(&[("/s/a.h", Need::MOC)]);
        let mut c = Classifier::new(&g, &det, ConflictPolicy::Error);
        c.classify(&[entry("/s/a.h"), entry("/s/r.qrc"), entry("/s/w.ui")]).unwrap();
        let out = c.finish();
        assert_eq!(out.in_bucket(Bucket::Irrelevant).len(), 3);
        assert!(out.qrcs.is_empty());
    }

    #[test]
    fn content_scanner_detects_macros_and_ui_includes() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("obj.h");
        let form = dir.path().join("form.cpp");
        let custom = dir.path().join("custom.h");
        let plain = dir.path().join("plain.cpp");
        fs::write(&obj, "class A : public QObject {\n    Q_OBJECT\n};\n").unwrap();
        fs::write(&form, "#include \"forms/ui_main.h\"\nint x;\n").unwrap();
        fs::write(&custom, "class B {\n  MY_OBJECT\n};\n").unwrap();
        fs::write(&plain, "// mentions Q_OBJECT_LIKE only\nint main() {}\n").unwrap();

        let scanner = ContentScanner::new(&["MY_OBJECT".to_string()]).unwrap();
        assert_eq!(scanner.needs_generation(&obj).unwrap(), Need::MOC);
        assert_eq!(scanner.needs_generation(&form).unwrap(), Need::UIC);
        assert_eq!(scanner.needs_generation(&custom).unwrap(), Need::MOC);
        assert_eq!(scanner.needs_generation(&plain).unwrap(), Need::NONE);

        let missing = scanner.needs_generation(&dir.path().join("gone.h")).unwrap_err();
        assert!(matches!(missing, AutogenError::MissingSource(_)));
    }

    #[test]
    fn content_scanner_accepts_latin1_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("a.h");
        fs::write(&header, b"// (c) M\xfcller\nclass A {\n  Q_OBJECT\n};\n").unwrap();

        let scanner = ContentScanner::new(&[]).unwrap();
        assert_eq!(scanner.needs_generation(&header).unwrap(), Need::MOC);
    }
}
