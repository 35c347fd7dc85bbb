use std::{
    ffi::OsString,
    path::{Component, Path, PathBuf},
};

use log::{trace, warn};

use crate::{
    config::PipelineConfig,
    error::{BundleError, BundleResult, ImportChain},
    external::ExternalSet,
    package_json::PackageManifest,
    types::{FxIndexMap, ModuleIdentity, ResolvedTarget},
};

/// How a specifier is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecifierKind {
    /// `./x`, `../x`, `.` or `..`
    Relative,
    /// `/abs/x`
    Absolute,
    /// `pkg`, `pkg/sub`, `@scope/pkg/sub`
    Bare,
}

impl SpecifierKind {
    pub fn of(specifier: &str) -> Self {
        if specifier == "."
            || specifier == ".."
            || specifier.starts_with("./")
            || specifier.starts_with("../")
        {
            Self::Relative
        } else if Path::new(specifier).is_absolute() {
            Self::Absolute
        } else {
            Self::Bare
        }
    }
}

/// Split a bare specifier into package name and optional subpath
fn split_package_specifier(specifier: &str) -> Option<(&str, Option<&str>)> {
    let split_at = if specifier.starts_with('@') {
        // Scoped packages keep two segments
        let first_slash = specifier.find('/')?;
        specifier[first_slash + 1..]
            .find('/')
            .map(|i| first_slash + 1 + i)
    } else {
        specifier.find('/')
    };

    match split_at {
        Some(i) => {
            let subpath = &specifier[i + 1..];
            Some((&specifier[..i], (!subpath.is_empty()).then_some(subpath)))
        }
        None => Some((specifier, None)),
    }
}

/// Lexically normalize `.` and `..` components without touching the filesystem
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Maps specifiers to module identities using the configured extension order
/// and node_modules package lookup
#[derive(Debug)]
pub struct ModuleResolver {
    root: PathBuf,
    extensions: Vec<String>,
    main_fields: Vec<String>,
    externals: ExternalSet,
    /// Cache keyed by (lookup kind, specifier, base directory)
    cache: FxIndexMap<(SpecifierKind, String, PathBuf), Option<PathBuf>>,
}

impl ModuleResolver {
    /// Canonicalize a path, handling errors gracefully
    fn canonicalize_path(&self, path: PathBuf) -> PathBuf {
        match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(e) => {
                // Log warning but don't fail - return the original path
                warn!("Failed to canonicalize path {}: {}", path.display(), e);
                path
            }
        }
    }

    pub fn new(config: &PipelineConfig, externals: ExternalSet) -> Self {
        let root = match config.root.canonicalize() {
            Ok(root) => root,
            Err(_) => normalize_path(&config.root),
        };
        Self {
            root,
            extensions: config.extensions.clone(),
            main_fields: config.main_fields.clone(),
            externals,
            cache: FxIndexMap::default(),
        }
    }

    /// Canonical project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn externals(&self) -> &ExternalSet {
        &self.externals
    }

    /// Whether the specifier, as written, names an external dependency
    pub fn is_external(&self, specifier: &str) -> bool {
        self.externals.matches(specifier)
    }

    /// Resolve an entry specifier; always taken as a path relative to the root
    pub fn resolve_entry(&mut self, specifier: &str) -> BundleResult<ModuleIdentity> {
        let base = normalize_path(&self.root.join(specifier));
        let root = self.root.clone();
        // Entries are paths relative to the root even when written bare
        self.cached_lookup(SpecifierKind::Relative, specifier, &root, |resolver| {
            resolver.locate(&base)
        })
            .map(ModuleIdentity::Path)
            .ok_or_else(|| BundleError::Resolution {
                specifier: specifier.to_owned(),
                importer: "(entry)".to_owned(),
                chain: ImportChain::new(),
            })
    }

    /// Resolve `specifier` as written in `importer`
    ///
    /// External matches return immediately without touching the filesystem.
    pub fn resolve(
        &mut self,
        specifier: &str,
        importer: &ModuleIdentity,
    ) -> BundleResult<ResolvedTarget> {
        if self.is_external(specifier) {
            trace!("'{specifier}' from {importer} is external");
            return Ok(ResolvedTarget::External(specifier.to_owned()));
        }

        let base_dir = importer
            .directory()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        let kind = SpecifierKind::of(specifier);
        let resolved = match kind {
            SpecifierKind::Relative => {
                let base = normalize_path(&base_dir.join(specifier));
                self.cached_lookup(kind, specifier, &base_dir, |resolver| resolver.locate(&base))
            }
            SpecifierKind::Absolute => {
                let base = normalize_path(Path::new(specifier));
                self.cached_lookup(kind, specifier, &base_dir, |resolver| resolver.locate(&base))
            }
            SpecifierKind::Bare => self.cached_lookup(kind, specifier, &base_dir, |resolver| {
                resolver.resolve_package(specifier, &base_dir)
            }),
        };

        match resolved {
            Some(path) => {
                trace!("'{specifier}' from {importer} -> {}", path.display());
                Ok(ResolvedTarget::Internal(ModuleIdentity::Path(path)))
            }
            None => Err(BundleError::Resolution {
                specifier: specifier.to_owned(),
                importer: importer.to_string(),
                chain: ImportChain::new(),
            }),
        }
    }

    fn cached_lookup(
        &mut self,
        kind: SpecifierKind,
        specifier: &str,
        base_dir: &Path,
        lookup: impl FnOnce(&Self) -> Option<PathBuf>,
    ) -> Option<PathBuf> {
        let key = (kind, specifier.to_owned(), base_dir.to_path_buf());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let resolved = lookup(self).map(|path| self.canonicalize_path(path));
        self.cache.insert(key, resolved.clone());
        resolved
    }

    /// Locate a base path: exact file, extensions in order, package entry, index
    fn locate(&self, base: &Path) -> Option<PathBuf> {
        if let Some(file) = self.find_file(base) {
            return Some(file);
        }
        if base.is_dir() {
            return self
                .find_package_entry(base)
                .or_else(|| self.find_index(base));
        }
        None
    }

    /// Exact file, then `base + ext` for each extension in declared order
    fn find_file(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }
        self.extensions.iter().find_map(|ext| {
            let mut candidate = OsString::from(base.as_os_str());
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            candidate.is_file().then_some(candidate)
        })
    }

    fn find_index(&self, dir: &Path) -> Option<PathBuf> {
        self.find_file(&dir.join("index"))
    }

    /// Entry file named by the directory's `package.json`, if any
    fn find_package_entry(&self, dir: &Path) -> Option<PathBuf> {
        let manifest = match PackageManifest::read(dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable package manifest in {}: {e:#}", dir.display());
                return None;
            }
        };

        manifest
            .entry_candidates(&self.main_fields)
            .find_map(|entry| {
                let candidate = normalize_path(&dir.join(entry));
                self.find_file(&candidate).or_else(|| {
                    candidate
                        .is_dir()
                        .then(|| self.find_index(&candidate))
                        .flatten()
                })
            })
    }

    /// Walk ancestor directories looking for `node_modules/<package>`
    fn resolve_package(&self, specifier: &str, from_dir: &Path) -> Option<PathBuf> {
        let (package, subpath) = split_package_specifier(specifier)?;

        for dir in from_dir.ancestors() {
            if dir.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }
            let package_root = dir.join("node_modules").join(package);
            if !package_root.is_dir() {
                continue;
            }
            let found = match subpath {
                Some(subpath) => self.locate(&normalize_path(&package_root.join(subpath))),
                None => self.locate(&package_root),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::external::ExternalStrategy;

    fn create_test_file(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn resolver_for(root: &Path, extensions: &[&str]) -> ModuleResolver {
        let config = PipelineConfig {
            root: root.to_path_buf(),
            extensions: extensions.iter().map(|e| (*e).to_owned()).collect(),
            ..Default::default()
        };
        ModuleResolver::new(&config, ExternalSet::none())
    }

    fn internal_path(target: ResolvedTarget) -> Option<PathBuf> {
        match target {
            ResolvedTarget::Internal(ModuleIdentity::Path(path)) => Some(path),
            _ => None,
        }
    }

    #[test]
    fn test_first_extension_wins() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("x.a"), "a")?;
        create_test_file(&root.join("x.b"), "b")?;
        create_test_file(&root.join("main.js"), "")?;

        let mut resolver = resolver_for(root, &[".a", ".b"]);
        let importer = resolver.resolve_entry("main.js")?;
        let resolved = internal_path(resolver.resolve("./x", &importer)?);
        assert_eq!(resolved, Some(root.join("x.a").canonicalize()?));

        let mut resolver = resolver_for(root, &[".b", ".a"]);
        let resolved = internal_path(resolver.resolve("./x", &importer)?);
        assert_eq!(resolved, Some(root.join("x.b").canonicalize()?));
        Ok(())
    }

    #[test]
    fn test_exact_file_before_extensions() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("data.json"), "{}")?;
        create_test_file(&root.join("data.json.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let identity = resolver.resolve_entry("./data.json")?;
        assert_eq!(
            identity,
            ModuleIdentity::Path(root.join("data.json").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_directory_index() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("lib/utils/index.js"), "")?;
        create_test_file(&root.join("lib/main.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let importer = resolver.resolve_entry("lib/main.js")?;
        let resolved = internal_path(resolver.resolve("./utils", &importer)?);
        assert_eq!(resolved, Some(root.join("lib/utils/index.js").canonicalize()?));

        // `..` climbs out of lib/utils back to lib
        let utils = ModuleIdentity::Path(root.join("lib/utils/index.js").canonicalize()?);
        let resolved = internal_path(resolver.resolve("../main", &utils)?);
        assert_eq!(resolved, Some(root.join("lib/main.js").canonicalize()?));
        Ok(())
    }

    #[test]
    fn test_bare_package_main_fields() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("src/main.js"), "")?;
        create_test_file(
            &root.join("node_modules/pkg/package.json"),
            r#"{"main": "lib/cjs.js", "module": "es/esm.js"}"#,
        )?;
        create_test_file(&root.join("node_modules/pkg/lib/cjs.js"), "")?;
        create_test_file(&root.join("node_modules/pkg/es/esm.js"), "")?;
        create_test_file(&root.join("node_modules/pkg/extra/thing.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let importer = resolver.resolve_entry("src/main.js")?;

        let resolved = internal_path(resolver.resolve("pkg", &importer)?);
        assert_eq!(
            resolved,
            Some(root.join("node_modules/pkg/es/esm.js").canonicalize()?)
        );

        let resolved = internal_path(resolver.resolve("pkg/extra/thing", &importer)?);
        assert_eq!(
            resolved,
            Some(root.join("node_modules/pkg/extra/thing.js").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_scoped_package_falls_back_to_index() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("main.js"), "")?;
        create_test_file(
            &root.join("node_modules/@scope/pkg/package.json"),
            r#"{"main": "missing.js"}"#,
        )?;
        create_test_file(&root.join("node_modules/@scope/pkg/index.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let importer = resolver.resolve_entry("main.js")?;
        let resolved = internal_path(resolver.resolve("@scope/pkg", &importer)?);
        assert_eq!(
            resolved,
            Some(root.join("node_modules/@scope/pkg/index.js").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_bare_entry_and_bare_import_stay_apart() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("util.js"), "export default 'local';")?;
        create_test_file(&root.join("main.js"), "import u from 'util';")?;
        create_test_file(&root.join("node_modules/util/index.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let entry = resolver.resolve_entry("util")?;
        assert_eq!(entry, ModuleIdentity::Path(root.join("util.js").canonicalize()?));

        let importer = resolver.resolve_entry("main.js")?;
        let resolved = internal_path(resolver.resolve("util", &importer)?);
        assert_eq!(
            resolved,
            Some(root.join("node_modules/util/index.js").canonicalize()?)
        );
        Ok(())
    }

    #[test]
    fn test_external_never_touches_disk() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("main.js"), "")?;
        // Even an existing local package stays external
        create_test_file(&root.join("node_modules/fontkit/index.js"), "")?;

        let config = PipelineConfig {
            root: root.to_path_buf(),
            ..Default::default()
        };
        let externals = ExternalSet::new(ExternalStrategy::Exact, vec!["fontkit".to_owned()])?;
        let mut resolver = ModuleResolver::new(&config, externals);
        let importer = resolver.resolve_entry("main.js")?;

        assert_eq!(
            resolver.resolve("fontkit", &importer)?,
            ResolvedTarget::External("fontkit".to_owned())
        );
        Ok(())
    }

    #[test]
    fn test_unresolvable_is_resolution_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("main.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let importer = resolver.resolve_entry("main.js")?;
        let err = resolver
            .resolve("./nope", &importer)
            .expect_err("should not resolve");
        assert_eq!(err.kind(), crate::error::ErrorKind::Resolution);
        assert!(resolver.resolve_entry("nope.js").is_err());
        Ok(())
    }

    #[test]
    fn test_virtual_importer_resolves_from_root() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        create_test_file(&root.join("shim.js"), "")?;

        let mut resolver = resolver_for(root, &[".js"]);
        let importer = ModuleIdentity::Virtual("builtin:events".to_owned());
        let resolved = internal_path(resolver.resolve("./shim", &importer)?);
        assert_eq!(resolved, Some(root.join("shim.js").canonicalize()?));
        Ok(())
    }

    #[test]
    fn test_split_package_specifier() {
        assert_eq!(split_package_specifier("pkg"), Some(("pkg", None)));
        assert_eq!(
            split_package_specifier("pkg/a/b"),
            Some(("pkg", Some("a/b")))
        );
        assert_eq!(
            split_package_specifier("@s/pkg/a"),
            Some(("@s/pkg", Some("a")))
        );
        assert_eq!(split_package_specifier("@s/pkg"), Some(("@s/pkg", None)));
        assert_eq!(split_package_specifier("@s"), None);
    }

    #[test]
    fn test_specifier_kind() {
        assert_eq!(SpecifierKind::of("./a"), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::of(".."), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::of("/abs/a"), SpecifierKind::Absolute);
        assert_eq!(SpecifierKind::of("fs"), SpecifierKind::Bare);
        assert_eq!(SpecifierKind::of(".hidden"), SpecifierKind::Bare);
    }
}
