//! Turns JSON documents into ES modules

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{Transform, TransformContext};
use crate::{module_record::ModuleRecord, names, types::Dialect};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JsonOptions {
    /// Emit one named export per top-level key that is a valid identifier
    pub named_exports: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            named_exports: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct JsonTransform {
    options: JsonOptions,
}

impl JsonTransform {
    pub fn new(options: JsonOptions) -> Self {
        Self { options }
    }

    fn to_module(&self, value: &Value) -> String {
        let mut module = String::new();
        let Value::Object(object) = value else {
            let _ = writeln!(module, "export default {};", literal(value));
            return module;
        };
        if !self.options.named_exports {
            let _ = writeln!(module, "export default {};", literal(value));
            return module;
        }

        let mut default_entries = Vec::with_capacity(object.len());
        for (key, entry) in object {
            let key_literal = names::property_key(key);
            if names::is_valid_identifier(key) {
                let _ = writeln!(module, "export const {key} = {};", literal(entry));
                default_entries.push(format!("{key_literal}: {key}"));
            } else {
                default_entries.push(format!("{key_literal}: {}", literal(entry)));
            }
        }
        let _ = writeln!(module, "export default {{ {} }};", default_entries.join(", "));
        module
    }
}

/// JavaScript expression for `value`. An object literal would turn a
/// `__proto__` key into the prototype, so such values go through `JSON.parse`.
fn literal(value: &Value) -> String {
    if has_proto_key(value) {
        format!("JSON.parse({})", names::js_string(&value.to_string()))
    } else {
        value.to_string()
    }
}

fn has_proto_key(value: &Value) -> bool {
    match value {
        Value::Object(object) => object
            .iter()
            .any(|(key, entry)| key == "__proto__" || has_proto_key(entry)),
        Value::Array(items) => items.iter().any(has_proto_key),
        _ => false,
    }
}

impl Transform for JsonTransform {
    fn name(&self) -> &str {
        "json"
    }

    fn handles(&self, dialect: &Dialect) -> bool {
        matches!(dialect, Dialect::Json)
    }

    fn apply(&self, record: &mut ModuleRecord, _: &TransformContext<'_>) -> Result<()> {
        let value: Value = serde_json::from_str(&record.source).context("invalid JSON")?;
        record.source = self.to_module(&value);
        record.dialect = Dialect::JavaScript;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{external::ExternalSet, types::ModuleIdentity};

    fn run(transform: &JsonTransform, source: &str) -> Result<ModuleRecord> {
        let mut record = ModuleRecord::new(
            ModuleIdentity::Virtual("data.json".to_owned()),
            Dialect::Json,
            source.to_owned(),
        );
        let externals = ExternalSet::none();
        transform.apply(
            &mut record,
            &TransformContext {
                externals: &externals,
            },
        )?;
        Ok(record)
    }

    #[test]
    fn test_object_root_gets_named_exports() -> Result<()> {
        let record = run(
            &JsonTransform::default(),
            r#"{"version": "1.0", "not-valid": [1, 2], "default": true}"#,
        )?;
        assert_eq!(record.dialect, Dialect::JavaScript);
        assert_eq!(
            record.source,
            "export const version = \"1.0\";\nexport default { version: version, \"not-valid\": [1,2], \"default\": true };\n"
        );
        Ok(())
    }

    #[test]
    fn test_named_exports_disabled() -> Result<()> {
        let transform = JsonTransform::new(JsonOptions {
            named_exports: false,
        });
        let record = run(&transform, r#"{"a": 1}"#)?;
        assert_eq!(record.source, "export default {\"a\":1};\n");
        Ok(())
    }

    #[test]
    fn test_proto_keys_stay_own_properties() -> Result<()> {
        let record = run(
            &JsonTransform::default(),
            r#"{"__proto__": {"x": 1}, "list": [{"__proto__": 2}], "a": 1}"#,
        )?;
        assert_eq!(
            record.source,
            concat!(
                "export const __proto__ = {\"x\":1};\n",
                "export const list = JSON.parse(\"[{\\\"__proto__\\\":2}]\");\n",
                "export const a = 1;\n",
                "export default { [\"__proto__\"]: __proto__, list: list, a: a };\n",
            )
        );

        let transform = JsonTransform::new(JsonOptions {
            named_exports: false,
        });
        let record = run(&transform, r#"{"__proto__": 1}"#)?;
        assert_eq!(
            record.source,
            "export default JSON.parse(\"{\\\"__proto__\\\":1}\");\n"
        );
        Ok(())
    }

    #[test]
    fn test_array_root() -> Result<()> {
        let record = run(&JsonTransform::default(), "[1, \"two\"]")?;
        assert_eq!(record.source, "export default [1,\"two\"];\n");
        Ok(())
    }

    #[test]
    fn test_invalid_json() {
        let err = run(&JsonTransform::default(), "{ nope").expect_err("invalid json");
        assert!(format!("{err:#}").starts_with("invalid JSON"));
    }
}
