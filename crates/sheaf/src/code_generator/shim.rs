//! Universal loader shim around the artifact's factory
//!
//! The shim is a small decision table evaluated once when the host loads the
//! artifact. Each row tests for a module convention and hands the factory
//! its externals the way that convention provides them. The output format
//! only selects which rows are emitted; the branch taken is decided by the
//! host at load time.

use std::fmt::Write as _;

use indexmap::IndexMap;

use super::runtime::external_param;
use crate::{config::OutputFormat, names};

/// One row of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostConvention {
    /// `module.exports` and `require` are available
    CommonJs,
    /// An AMD loader's `define`, registered as an anonymous module
    Amd,
    /// A plain script; the value is attached to the global object
    Global,
}

impl HostConvention {
    fn rows(format: OutputFormat) -> &'static [Self] {
        match format {
            OutputFormat::Umd => &[Self::CommonJs, Self::Amd, Self::Global],
            OutputFormat::Cjs => &[Self::CommonJs],
            OutputFormat::Amd => &[Self::Amd],
            OutputFormat::Iife => &[Self::Global],
        }
    }

    fn condition(self) -> &'static str {
        match self {
            Self::CommonJs => "typeof exports === \"object\" && typeof module !== \"undefined\"",
            Self::Amd => "typeof define === \"function\" && define.amd",
            Self::Global => "true",
        }
    }
}

#[derive(Debug)]
pub(crate) struct LoaderShim<'a> {
    format: OutputFormat,
    /// Global name the value is attached to in script hosts
    name: Option<&'a str>,
    externals: &'a [String],
    globals: &'a IndexMap<String, String>,
}

impl<'a> LoaderShim<'a> {
    pub(crate) fn new(
        format: OutputFormat,
        name: Option<&'a str>,
        externals: &'a [String],
        globals: &'a IndexMap<String, String>,
    ) -> Self {
        Self {
            format,
            name,
            externals,
            globals,
        }
    }

    fn global_for(&self, external: &str) -> String {
        self.globals
            .get(external)
            .cloned()
            .unwrap_or_else(|| names::default_global_name(external))
    }

    fn row_body(&self, convention: HostConvention) -> String {
        match convention {
            HostConvention::CommonJs => {
                let args: Vec<String> = self
                    .externals
                    .iter()
                    .map(|external| format!("require({})", names::js_string(external)))
                    .collect();
                format!("module.exports = factory({});", args.join(", "))
            }
            HostConvention::Amd => {
                let deps: Vec<String> = self
                    .externals
                    .iter()
                    .map(String::as_str)
                    .map(names::js_string)
                    .collect();
                format!("define([{}], factory);", deps.join(", "))
            }
            HostConvention::Global => {
                let args: Vec<String> = self
                    .externals
                    .iter()
                    .map(|external| names::property_access("root", &self.global_for(external)))
                    .collect();
                let call = format!("factory({})", args.join(", "));
                let mut body = String::from(
                    "root = typeof globalThis !== \"undefined\" ? globalThis : root || self;\n    ",
                );
                match self.name {
                    Some(name) => {
                        let _ = write!(body, "{} = {call};", names::property_access("root", name));
                    }
                    None => {
                        let _ = write!(body, "{call};");
                    }
                }
                body
            }
        }
    }

    /// Wrap `factory_body` into the complete artifact
    pub(crate) fn wrap(&self, factory_body: &str) -> String {
        let rows = HostConvention::rows(self.format);
        let mut code = String::from("(function (root, factory) {\n");

        if let [single] = rows {
            let _ = writeln!(code, "  {}", self.row_body(*single).replace("\n    ", "\n  "));
        } else {
            for (i, row) in rows.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "} else if" };
                if i + 1 == rows.len() && *row == HostConvention::Global {
                    code.push_str("  } else {\n");
                } else {
                    let _ = writeln!(code, "  {keyword} ({}) {{", row.condition());
                }
                let _ = writeln!(code, "    {}", self.row_body(*row));
            }
            code.push_str("  }\n");
        }

        let params: Vec<String> = (0..self.externals.len()).map(external_param).collect();
        let _ = write!(
            code,
            "}})(this, function ({}) {{\n{factory_body}}});\n",
            params.join(", ")
        );
        code
    }
}
