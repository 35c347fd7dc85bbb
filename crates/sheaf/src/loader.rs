//! Source retrieval for resolved module identities

use std::{fs, io};

use crate::types::{Dialect, ModuleIdentity};

/// Raw content of a module and the dialect it is written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub source: String,
    pub dialect: Dialect,
}

/// Retrieves module sources; the graph builder only talks to this seam
pub trait SourceLoader {
    fn load(&self, identity: &ModuleIdentity) -> io::Result<LoadedSource>;
}

impl<T: SourceLoader + ?Sized> SourceLoader for &T {
    fn load(&self, identity: &ModuleIdentity) -> io::Result<LoadedSource> {
        (**self).load(identity)
    }
}

/// Loads modules from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, identity: &ModuleIdentity) -> io::Result<LoadedSource> {
        match identity {
            ModuleIdentity::Path(path) => {
                let source = fs::read_to_string(path)?;
                Ok(LoadedSource {
                    source,
                    dialect: Dialect::from_path(path),
                })
            }
            ModuleIdentity::Virtual(id) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("virtual module '{id}' has no backing file"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_load_tags_dialect() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("data.json");
        fs::write(&path, "{\"a\": 1}")?;

        let loaded = FsLoader.load(&ModuleIdentity::Path(path))?;
        assert_eq!(loaded.dialect, Dialect::Json);
        assert_eq!(loaded.source, "{\"a\": 1}");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = FsLoader.load(&ModuleIdentity::Path("/definitely/not/here.js".into()));
        assert!(result.is_err());
        assert!(
            FsLoader
                .load(&ModuleIdentity::Virtual("x".to_owned()))
                .is_err()
        );
    }
}
