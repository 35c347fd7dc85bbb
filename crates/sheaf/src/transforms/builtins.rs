//! Redirects Node.js core module imports to replacements or empty stubs

use anyhow::Result;
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use super::{Transform, TransformContext};
use crate::{module_record::ModuleRecord, module_record::Redirect, types::Dialect};

const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Whether `specifier` names a Node.js core module, e.g. `fs`, `node:fs`
/// or `fs/promises`
pub fn is_node_builtin(specifier: &str) -> bool {
    let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
    let top_level = bare.split('/').next().unwrap_or(bare);
    NODE_BUILTINS.contains(&top_level)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuiltinsOptions {
    /// Replace builtins without a configured replacement by an empty module
    pub stub_unknown: bool,
    /// Builtin specifier to the specifier that replaces it
    pub replacements: IndexMap<String, String>,
}

impl Default for BuiltinsOptions {
    fn default() -> Self {
        Self {
            stub_unknown: true,
            replacements: IndexMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BuiltinsTransform {
    options: BuiltinsOptions,
}

impl BuiltinsTransform {
    pub fn new(options: BuiltinsOptions) -> Self {
        Self { options }
    }

    fn redirect_for(&self, specifier: &str) -> Option<Redirect> {
        let bare = specifier.strip_prefix("node:").unwrap_or(specifier);
        let replacement = self
            .options
            .replacements
            .get(specifier)
            .or_else(|| self.options.replacements.get(bare));
        match replacement {
            Some(replacement) => Some(Redirect::Specifier(replacement.clone())),
            None if self.options.stub_unknown => Some(Redirect::Empty),
            None => None,
        }
    }
}

impl Transform for BuiltinsTransform {
    fn name(&self) -> &str {
        "builtins"
    }

    fn handles(&self, dialect: &Dialect) -> bool {
        dialect.is_javascript()
    }

    fn apply(&self, record: &mut ModuleRecord, context: &TransformContext<'_>) -> Result<()> {
        let builtins: Vec<String> = record
            .specifiers()
            .iter()
            .filter(|specifier| is_node_builtin(specifier))
            .filter(|specifier| !context.externals.matches(specifier))
            .cloned()
            .collect();

        for specifier in builtins {
            if let Some(redirect) = self.redirect_for(&specifier) {
                debug!("Redirecting builtin '{specifier}' in {}", record.identity);
                record.redirects.insert(specifier, redirect);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        external::{ExternalSet, ExternalStrategy},
        types::ModuleIdentity,
    };

    fn analyzed(source: &str) -> Result<ModuleRecord> {
        let mut record = ModuleRecord::new(
            ModuleIdentity::Virtual("entry".to_owned()),
            Dialect::JavaScript,
            source.to_owned(),
        );
        record.reanalyze()?;
        Ok(record)
    }

    #[test]
    fn test_is_node_builtin() {
        assert!(is_node_builtin("fs"));
        assert!(is_node_builtin("node:fs"));
        assert!(is_node_builtin("fs/promises"));
        assert!(!is_node_builtin("fs-extra"));
        assert!(!is_node_builtin("./fs"));
    }

    #[test]
    fn test_replacements_and_stubs() -> Result<()> {
        let mut options = BuiltinsOptions::default();
        options
            .replacements
            .insert("events".to_owned(), "events-shim".to_owned());
        let transform = BuiltinsTransform::new(options);

        let mut record = analyzed(
            "import { EventEmitter } from 'node:events'; import fs from 'fs'; import x from './x';",
        )?;
        let externals = ExternalSet::none();
        transform.apply(
            &mut record,
            &TransformContext {
                externals: &externals,
            },
        )?;

        assert_eq!(
            record.redirect("node:events"),
            Some(&Redirect::Specifier("events-shim".to_owned()))
        );
        assert_eq!(record.redirect("fs"), Some(&Redirect::Empty));
        assert!(record.redirect("./x").is_none());
        Ok(())
    }

    #[test]
    fn test_externals_are_never_redirected() -> Result<()> {
        let transform = BuiltinsTransform::default();
        let mut record = analyzed("const zlib = require('zlib'); const fs = require('fs');")?;
        let externals = ExternalSet::new(ExternalStrategy::Exact, vec!["zlib".to_owned()])?;
        transform.apply(
            &mut record,
            &TransformContext {
                externals: &externals,
            },
        )?;

        assert!(record.redirect("zlib").is_none());
        assert_eq!(record.redirect("fs"), Some(&Redirect::Empty));
        Ok(())
    }

    #[test]
    fn test_no_stub_without_option() -> Result<()> {
        let transform = BuiltinsTransform::new(BuiltinsOptions {
            stub_unknown: false,
            replacements: IndexMap::new(),
        });
        let mut record = analyzed("import fs from 'fs';")?;
        let externals = ExternalSet::none();
        transform.apply(
            &mut record,
            &TransformContext {
                externals: &externals,
            },
        )?;
        assert!(record.redirects.is_empty());
        Ok(())
    }
}
