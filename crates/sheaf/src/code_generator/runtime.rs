//! The per-artifact module registry
//!
//! Module definitions are stored by key and executed lazily on first
//! `require`. A module's record is cached before its body runs, so a module
//! reached again through a cycle sees the exports object as populated so far.
//! ES modules install their exports as getters up front, which defers every
//! cross-module value read to the moment it is used.

use std::fmt::Write as _;

use crate::names;

/// Registry and interop helpers, shared by every generated artifact
const REGISTRY: &str = r#"  var __sheaf_hasOwn = Object.prototype.hasOwnProperty;
  for (var __sheaf_name in __sheaf_externals) {
    if (__sheaf_hasOwn.call(__sheaf_externals, __sheaf_name) && __sheaf_externals[__sheaf_name] === undefined) {
      throw new Error('Missing external dependency "' + __sheaf_name + '"');
    }
  }
  var __sheaf_helpers = {
    defineExports: function (exports, getters) {
      Object.defineProperty(exports, "__esModule", { value: true });
      for (var name in getters) {
        if (__sheaf_hasOwn.call(getters, name)) {
          Object.defineProperty(exports, name, { enumerable: true, get: getters[name] });
        }
      }
    },
    reexport: function (exports, source) {
      for (var name in source) {
        if (name !== "default" && name !== "__esModule" && !__sheaf_hasOwn.call(exports, name)) {
          (function (key) {
            Object.defineProperty(exports, key, {
              enumerable: true,
              get: function () { return source[key]; }
            });
          })(name);
        }
      }
    },
    interop: function (value) {
      if (value && value.__esModule) {
        return value;
      }
      var base = value !== null && (typeof value === "object" || typeof value === "function") ? value : null;
      return Object.create(base, { default: { value: value, enumerable: true } });
    }
  };
  var __sheaf_cache = {};
  function __sheaf_require(id) {
    if (__sheaf_hasOwn.call(__sheaf_cache, id)) {
      return __sheaf_cache[id].exports;
    }
    if (__sheaf_hasOwn.call(__sheaf_externals, id)) {
      return __sheaf_externals[id];
    }
    if (!__sheaf_hasOwn.call(__sheaf_modules, id)) {
      throw new Error('Module "' + id + '" is not part of this bundle');
    }
    var module = __sheaf_cache[id] = { id: id, exports: {} };
    var receiver = __sheaf_hasOwn.call(__sheaf_esm, id) ? undefined : module.exports;
    __sheaf_modules[id].call(receiver, module, module.exports, __sheaf_require, __sheaf_helpers);
    return module.exports;
  }
"#;

/// Name of the factory parameter carrying the `index`-th external
pub(crate) fn external_param(index: usize) -> String {
    format!("__sheaf_external_{index}")
}

/// Which value of the first entry the factory returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exposure {
    /// The entry's exports object (`module.exports` for CommonJS)
    Exports,
    /// The entry's `default` export
    DefaultExport,
}

/// One rendered registry entry
#[derive(Debug, Clone)]
pub(crate) struct Definition {
    pub key: String,
    pub code: String,
    /// ES module bodies run with an undefined `this`
    pub esm: bool,
}

/// Everything the factory body is assembled from
#[derive(Debug)]
pub(crate) struct FactoryParts<'a> {
    pub externals: &'a [String],
    /// Rendered definitions, in execution order
    pub definitions: &'a [Definition],
    pub entries: &'a [String],
    pub exposure: Exposure,
}

/// Body of the factory function the loader shim invokes
pub(crate) fn render_factory_body(parts: &FactoryParts<'_>) -> String {
    let mut body = String::new();

    body.push_str("  var __sheaf_externals = {");
    for (i, external) in parts.externals.iter().enumerate() {
        let separator = if i == 0 { "" } else { "," };
        let _ = write!(
            body,
            "{separator}\n    {}: {}",
            names::js_string(external),
            external_param(i)
        );
    }
    body.push_str(if parts.externals.is_empty() { "};\n" } else { "\n  };\n" });

    body.push_str("  var __sheaf_modules = {");
    for (i, definition) in parts.definitions.iter().enumerate() {
        let separator = if i == 0 { "" } else { "," };
        let _ = write!(
            body,
            "{separator}\n    {}: {}",
            names::js_string(&definition.key),
            definition.code.trim_end()
        );
    }
    body.push_str(if parts.definitions.is_empty() { "};\n" } else { "\n  };\n" });

    let esm_keys: Vec<String> = parts
        .definitions
        .iter()
        .filter(|definition| definition.esm)
        .map(|definition| format!("{}: true", names::js_string(&definition.key)))
        .collect();
    let _ = writeln!(body, "  var __sheaf_esm = {{{}}};", esm_keys.join(", "));

    body.push_str(REGISTRY);

    let Some((first, rest)) = parts.entries.split_first() else {
        return body;
    };
    let _ = writeln!(
        body,
        "  var __sheaf_entry = __sheaf_require({});",
        names::js_string(first)
    );
    for entry in rest {
        let _ = writeln!(body, "  __sheaf_require({});", names::js_string(entry));
    }
    match parts.exposure {
        Exposure::Exports => body.push_str("  return __sheaf_entry;\n"),
        Exposure::DefaultExport => body.push_str("  return __sheaf_entry.default;\n"),
    }
    body
}
