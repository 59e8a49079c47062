//! Source units, build groups and classification of a flat file list.
//!
//! Classification is extension-driven and resolved exactly once: every path
//! becomes either part of a `BuildGroup` for one of the known languages or
//! part of an unsupported group keyed by its extension.

use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Closed set of source languages the orchestrator knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Rust,
    Python,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Cpp,
        Language::Java,
        Language::Rust,
        Language::Python,
    ];

    /// Map a file extension (without the dot, any case) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "rs" => Some(Language::Rust),
            "py" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "rust" | "rs" => Ok(Language::Rust),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!(
                "unknown language '{}': expected one of cpp, java, rust, python",
                other
            )),
        }
    }
}

/// How a compiled module is packaged for consumption by another runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackagingKind {
    /// Native extension module importable by the Python runtime.
    PythonExtension,
}

impl PackagingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackagingKind::PythonExtension => "python-extension",
        }
    }
}

/// What a build group produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum BuildMode {
    #[default]
    Executable,
    Module { packaging: PackagingKind },
}

impl BuildMode {
    pub fn python_extension() -> Self {
        BuildMode::Module {
            packaging: PackagingKind::PythonExtension,
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, BuildMode::Executable)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Executable => f.write_str("executable"),
            BuildMode::Module { packaging } => write!(f, "module:{}", packaging.as_str()),
        }
    }
}

impl Serialize for BuildMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Compiler optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    Debug,
    #[default]
    Release,
}

impl OptLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptLevel::Debug => "debug",
            OptLevel::Release => "release",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(OptLevel::Debug),
            "release" => Ok(OptLevel::Release),
            other => Err(format!(
                "unknown optimization level '{}': expected debug or release",
                other
            )),
        }
    }
}

/// Options that shape the compiler invocation for a group.
///
/// Every field here participates in the group fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BuildOptions {
    pub optimization: OptLevel,
    /// Base name of the produced artifact; defaults to the first file's stem.
    pub target_name: Option<String>,
    /// Module name for `BuildMode::Module`; defaults to the first file's stem.
    pub module_name: Option<String>,
}

/// One input file of a build group.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    path: PathBuf,
    language: Language,
    rel_key: String,
    content: OnceLock<Vec<u8>>,
}

impl SourceUnit {
    pub fn new(path: PathBuf, language: Language, rel_key: String) -> Self {
        Self {
            path,
            language,
            rel_key,
            content: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Path relative to the group's common base directory, `/`-separated.
    pub fn rel_key(&self) -> &str {
        &self.rel_key
    }

    /// File content, read on first access and kept for the rest of the attempt.
    pub fn content(&self) -> std::io::Result<&[u8]> {
        if let Some(bytes) = self.content.get() {
            return Ok(bytes);
        }
        let bytes = fs::read(&self.path)?;
        Ok(self.content.get_or_init(|| bytes))
    }
}

/// Same-language sources compiled as one unit.
#[derive(Debug, Clone)]
pub struct BuildGroup {
    language: Language,
    mode: BuildMode,
    options: BuildOptions,
    units: Vec<SourceUnit>,
}

impl BuildGroup {
    /// Build a group from paths that all share `language`.
    ///
    /// Returns `None` for an empty path list.
    pub fn new(
        language: Language,
        mode: BuildMode,
        options: BuildOptions,
        paths: Vec<PathBuf>,
    ) -> Option<Self> {
        if paths.is_empty() {
            return None;
        }

        let base = common_base(&paths);
        let units = paths
            .into_iter()
            .map(|path| {
                let rel_key = relative_key(&path, &base);
                SourceUnit::new(path, language, rel_key)
            })
            .collect();

        Some(Self {
            language,
            mode,
            options,
            units,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.units.iter().map(|u| u.path.clone()).collect()
    }

    /// The entry file: first unit in submission order.
    pub fn main_unit(&self) -> &SourceUnit {
        &self.units[0]
    }

    /// Base name for the produced artifact.
    pub fn artifact_stem(&self) -> String {
        self.options
            .target_name
            .clone()
            .unwrap_or_else(|| file_stem(self.main_unit().path()))
    }

    /// Module name used when packaging as an importable module.
    pub fn module_name(&self) -> String {
        self.options
            .module_name
            .clone()
            .unwrap_or_else(|| file_stem(self.main_unit().path()))
    }

    pub fn label(&self) -> String {
        match self.mode {
            BuildMode::Executable => self.language.to_string(),
            BuildMode::Module { packaging } => {
                format!("{} ({})", self.language, packaging.as_str())
            }
        }
    }
}

/// A classified slot in submission order.
#[derive(Debug, Clone)]
pub enum GroupSlot {
    Supported(BuildGroup),
    Unsupported {
        extension: String,
        files: Vec<PathBuf>,
    },
}

impl GroupSlot {
    pub fn label(&self) -> String {
        match self {
            GroupSlot::Supported(group) => group.label(),
            GroupSlot::Unsupported { extension, .. } => format!("unsupported({})", extension),
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            GroupSlot::Supported(group) => group.paths(),
            GroupSlot::Unsupported { files, .. } => files.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotKey {
    Known(Language),
    Unknown(String),
}

/// Partition `paths` into groups in first-occurrence order.
///
/// Every group receives the same `mode` and `options`. Files with an
/// unrecognized extension are collected per extension into unsupported
/// slots; they never prevent the remaining files from being grouped.
pub fn classify(paths: &[PathBuf], mode: BuildMode, options: &BuildOptions) -> Vec<GroupSlot> {
    let mut buckets: Vec<(SlotKey, Vec<PathBuf>)> = Vec::new();

    for path in paths {
        let key = match Language::from_path(path) {
            Some(language) => SlotKey::Known(language),
            None => SlotKey::Unknown(extension_label(path)),
        };

        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, files)) => files.push(path.clone()),
            None => buckets.push((key, vec![path.clone()])),
        }
    }

    buckets
        .into_iter()
        .filter_map(|(key, files)| match key {
            SlotKey::Known(language) => {
                BuildGroup::new(language, mode, options.clone(), files).map(GroupSlot::Supported)
            }
            SlotKey::Unknown(extension) => Some(GroupSlot::Unsupported { extension, files }),
        })
        .collect()
}

fn extension_label(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => "<none>".to_string(),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

/// Deepest directory containing every path.
fn common_base(paths: &[PathBuf]) -> PathBuf {
    let mut base = paths
        .first()
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default();

    for path in paths.iter().skip(1) {
        while !path.starts_with(&base) {
            if !base.pop() {
                break;
            }
        }
    }

    base
}

fn relative_key(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("cpp"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("CC"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("cxx"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("Java"), Some(Language::Java));
        assert_eq!(Language::from_extension("rs"), Some(Language::Rust));
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("go"), None);
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("Python".parse::<Language>().unwrap(), Language::Python);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_build_mode_display() {
        assert_eq!(BuildMode::Executable.to_string(), "executable");
        assert_eq!(
            BuildMode::python_extension().to_string(),
            "module:python-extension"
        );
    }

    #[test]
    fn test_classify_first_occurrence_order() {
        let input = paths(&[
            "/w/b.java",
            "/w/a.cpp",
            "/w/c.java",
            "/w/main.py",
            "/w/d.cc",
        ]);
        let slots = classify(&input, BuildMode::Executable, &BuildOptions::default());

        let labels: Vec<String> = slots.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["java", "cpp", "python"]);

        match &slots[1] {
            GroupSlot::Supported(group) => {
                assert_eq!(group.paths(), paths(&["/w/a.cpp", "/w/d.cc"]));
            }
            other => panic!("expected supported slot, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_unsupported_isolated() {
        let input = paths(&["/w/a.cpp", "/w/notes.TXT", "/w/b.rs", "/w/more.txt"]);
        let slots = classify(&input, BuildMode::Executable, &BuildOptions::default());

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].label(), "cpp");
        assert_eq!(slots[1].label(), "unsupported(.txt)");
        assert_eq!(slots[1].files(), paths(&["/w/notes.TXT", "/w/more.txt"]));
        assert_eq!(slots[2].label(), "rust");
    }

    #[test]
    fn test_classify_no_extension() {
        let input = paths(&["/w/Makefile"]);
        let slots = classify(&input, BuildMode::Executable, &BuildOptions::default());
        assert_eq!(slots[0].label(), "unsupported(<none>)");
    }

    #[test]
    fn test_classify_applies_mode() {
        let input = paths(&["/w/ext.cpp"]);
        let slots = classify(&input, BuildMode::python_extension(), &BuildOptions::default());
        match &slots[0] {
            GroupSlot::Supported(group) => {
                assert_eq!(group.mode(), BuildMode::python_extension());
                assert_eq!(group.language(), Language::Cpp);
                assert_eq!(group.label(), "cpp (python-extension)");
            }
            other => panic!("expected supported slot, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_keys_use_common_base() {
        let group = BuildGroup::new(
            Language::Cpp,
            BuildMode::Executable,
            BuildOptions::default(),
            paths(&["/proj/src/main.cpp", "/proj/lib/util.cpp"]),
        )
        .unwrap();

        let keys: Vec<&str> = group.units().iter().map(|u| u.rel_key()).collect();
        assert_eq!(keys, vec!["src/main.cpp", "lib/util.cpp"]);
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(BuildGroup::new(
            Language::Rust,
            BuildMode::Executable,
            BuildOptions::default(),
            vec![]
        )
        .is_none());
    }

    #[test]
    fn test_artifact_and_module_names() {
        let mut options = BuildOptions::default();
        let group = BuildGroup::new(
            Language::Cpp,
            BuildMode::Executable,
            options.clone(),
            paths(&["/w/solver.cpp"]),
        )
        .unwrap();
        assert_eq!(group.artifact_stem(), "solver");
        assert_eq!(group.module_name(), "solver");

        options.target_name = Some("app".to_string());
        options.module_name = Some("fastmath".to_string());
        let group = BuildGroup::new(
            Language::Cpp,
            BuildMode::python_extension(),
            options,
            paths(&["/w/solver.cpp"]),
        )
        .unwrap();
        assert_eq!(group.artifact_stem(), "app");
        assert_eq!(group.module_name(), "fastmath");
    }

    #[test]
    fn test_source_content_is_memoized() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("a.py");
        fs::write(&file, "print(1)").unwrap();

        let unit = SourceUnit::new(file.clone(), Language::Python, "a.py".to_string());
        assert_eq!(unit.content().unwrap(), b"print(1)");

        // Later edits are not observed within the same attempt
        fs::write(&file, "print(2)").unwrap();
        assert_eq!(unit.content().unwrap(), b"print(1)");
    }
}
