//! Pipeline configuration
//!
//! A [`PipelineConfig`] is read from TOML once per invocation, optionally
//! adjusted by command line overrides, validated, and then shared read-only by
//! every stage of the build.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BundleError, BundleResult},
    external::{ExternalSet, ExternalStrategy},
    transforms,
};

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "sheaf.toml";

/// Wrapper format of the emitted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CommonJS host, anonymous AMD define, or global attach, detected at load time
    #[default]
    Umd,
    Cjs,
    Amd,
    Iife,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "umd" => Ok(Self::Umd),
            "cjs" | "commonjs" => Ok(Self::Cjs),
            "amd" => Ok(Self::Amd),
            "iife" => Ok(Self::Iife),
            other => Err(format!(
                "unknown output format '{other}' (expected umd, cjs, amd or iife)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Umd => "umd",
            Self::Cjs => "cjs",
            Self::Amd => "amd",
            Self::Iife => "iife",
        };
        f.write_str(name)
    }
}

/// Which value of the entry module the artifact exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Default export value if it is the entry's only export, else the exports object
    #[default]
    Auto,
    Named,
    Default,
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "named" => Ok(Self::Named),
            "default" => Ok(Self::Default),
            other => Err(format!(
                "unknown export mode '{other}' (expected auto, named or default)"
            )),
        }
    }
}

/// A transform as named in configuration, with its free-form options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDescriptor {
    pub name: String,
    #[serde(default)]
    pub options: toml::Table,
}

impl TransformDescriptor {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            options: toml::Table::new(),
        }
    }
}

/// One output artifact built from an ordered group of entry specifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputOptions {
    pub entries: Vec<String>,
    pub file: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    /// Global name used when the artifact attaches itself to the host's global object
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exports: ExportMode,
    /// Externals that only apply to this output, added to the global list
    #[serde(default)]
    pub external: Vec<String>,
    /// External name to the global variable it is read from in script hosts
    #[serde(default)]
    pub globals: IndexMap<String, String>,
}

impl OutputOptions {
    pub fn new(entries: Vec<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            entries,
            file: file.into(),
            format: OutputFormat::default(),
            name: None,
            exports: ExportMode::default(),
            external: Vec::new(),
            globals: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory entry specifiers and module keys are relative to
    pub root: PathBuf,
    /// Recognized file extensions, tried in order; first match wins
    pub extensions: Vec<String>,
    /// `package.json` fields naming a package's entry file, tried in order
    pub main_fields: Vec<String>,
    pub external: Vec<String>,
    pub external_strategy: ExternalStrategy,
    pub minify: bool,
    pub transforms: Vec<TransformDescriptor>,
    pub outputs: Vec<OutputOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: vec![".js".to_owned(), ".json".to_owned()],
            main_fields: vec![
                "module".to_owned(),
                "jsnext:main".to_owned(),
                "main".to_owned(),
            ],
            external: Vec::new(),
            external_strategy: ExternalStrategy::default(),
            minify: false,
            transforms: vec![TransformDescriptor::named("json")],
            outputs: Vec::new(),
        }
    }
}

/// Command line adjustments applied on top of a loaded configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub entries: Vec<String>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub name: Option<String>,
    pub external: Vec<String>,
    pub external_strategy: Option<ExternalStrategy>,
    pub extensions: Option<Vec<String>>,
    pub minify: bool,
}

impl PipelineConfig {
    /// Load configuration following the lookup order: explicit path, the
    /// working directory, the user config directory, then built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load_from_file(&local);
        }

        if let Some(user_path) = Self::user_config_path()
            && user_path.is_file()
        {
            return Self::load_from_file(&user_path);
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Location of the per-user configuration file, if the platform has one
    pub fn user_config_path() -> Option<PathBuf> {
        match choose_base_strategy() {
            Ok(strategy) => Some(strategy.config_dir().join("sheaf").join(CONFIG_FILE_NAME)),
            Err(e) => {
                debug!("Cannot locate user configuration directory: {e}");
                None
            }
        }
    }

    /// Load a configuration file; a relative `root` is taken relative to the file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if config.root.is_relative()
            && let Some(parent) = path.parent()
        {
            config.root = parent.join(&config.root);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> BundleResult<()> {
        if let Some(extensions) = overrides.extensions {
            self.extensions = extensions;
        }
        if let Some(strategy) = overrides.external_strategy {
            self.external_strategy = strategy;
        }
        self.external.extend(overrides.external);
        self.minify |= overrides.minify;

        if !overrides.entries.is_empty() {
            let file = overrides
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from("bundle.js"));
            self.outputs = vec![OutputOptions::new(overrides.entries, file)];
        } else if let Some(file) = &overrides.output {
            match self.outputs.as_mut_slice() {
                [single] => single.file.clone_from(file),
                _ => {
                    return Err(BundleError::Config(
                        "--output needs exactly one configured output or an --entry".to_owned(),
                    ));
                }
            }
        }

        for output in &mut self.outputs {
            if let Some(format) = overrides.format {
                output.format = format;
            }
            if let Some(name) = &overrides.name {
                output.name = Some(name.clone());
            }
        }
        Ok(())
    }

    /// Check the configuration once, before any build starts
    pub fn validate(&self) -> BundleResult<()> {
        if self.extensions.is_empty() {
            return Err(BundleError::Config(
                "at least one extension must be configured".to_owned(),
            ));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(BundleError::Config(format!(
                "extension '{bad}' must start with a dot"
            )));
        }
        if self.outputs.is_empty() {
            return Err(BundleError::Config("no outputs configured".to_owned()));
        }

        for output in &self.outputs {
            if output.entries.is_empty() {
                return Err(BundleError::Config(format!(
                    "output {} has no entries",
                    output.file.display()
                )));
            }
            if output.format == OutputFormat::Iife && output.name.is_none() {
                return Err(BundleError::Config(format!(
                    "output {} uses the iife format and needs a name",
                    output.file.display()
                )));
            }
            self.externals_for(output)?;
        }

        for descriptor in &self.transforms {
            if !transforms::is_known(&descriptor.name) {
                return Err(BundleError::Config(format!(
                    "unknown transform '{}'",
                    descriptor.name
                )));
            }
        }
        Ok(())
    }

    /// External set for one output: global patterns plus the output's own
    pub fn externals_for(&self, output: &OutputOptions) -> BundleResult<ExternalSet> {
        let patterns = self
            .external
            .iter()
            .chain(&output.external)
            .cloned()
            .collect::<Vec<_>>();
        ExternalSet::new(self.external_strategy, patterns)
    }
}
