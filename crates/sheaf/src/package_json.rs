//! Minimal `package.json` reading for package resolution

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl PackageManifest {
    /// Read `dir/package.json`; `Ok(None)` when the directory has no manifest
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join("package.json");
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Entry file candidates named by `main_fields`, in field order
    ///
    /// Fields that are missing, empty or not strings are skipped.
    pub fn entry_candidates<'a>(
        &'a self,
        main_fields: &'a [String],
    ) -> impl Iterator<Item = &'a str> + 'a {
        main_fields
            .iter()
            .filter_map(|field| self.fields.get(field.as_str()))
            .filter_map(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_entry_candidates_follow_field_order() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(
            temp_dir.path().join("package.json"),
            r#"{"name": "pkg", "main": "lib/index.js", "module": "es/index.js", "browser": {"fs": false}}"#,
        )?;

        let manifest = PackageManifest::read(temp_dir.path())?.expect("manifest exists");
        assert_eq!(manifest.name.as_deref(), Some("pkg"));

        let fields = vec!["module".to_owned(), "jsnext:main".to_owned(), "main".to_owned()];
        let candidates: Vec<_> = manifest.entry_candidates(&fields).collect();
        assert_eq!(candidates, vec!["es/index.js", "lib/index.js"]);

        let fields = vec!["browser".to_owned()];
        assert_eq!(manifest.entry_candidates(&fields).count(), 0);
        Ok(())
    }

    #[test]
    fn test_missing_manifest() -> Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(PackageManifest::read(temp_dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_manifest_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("package.json"), "{ not json")?;
        assert!(PackageManifest::read(temp_dir.path()).is_err());
        Ok(())
    }
}
