//! Structured outcome of a build, for reporting collaborators

use anyhow::Result;
use serde::Serialize;

use crate::{
    error::{BundleError, BundleResult, ErrorKind, ImportChain},
    post_process::BuildReport,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Diagnostics {
    Success {
        outputs: Vec<BuildReport>,
    },
    Failure {
        kind: ErrorKind,
        /// Module the failure is attributed to
        identity: Option<String>,
        /// Import edges from an entry point to the failing module
        chain: Option<ImportChain>,
        message: String,
    },
}

impl Diagnostics {
    pub fn from_result(result: &BundleResult<Vec<BuildReport>>) -> Self {
        match result {
            Ok(outputs) => Self::Success {
                outputs: outputs.clone(),
            },
            Err(error) => Self::from_error(error),
        }
    }

    pub fn from_error(error: &BundleError) -> Self {
        Self::Failure {
            kind: error.kind(),
            identity: error.identity(),
            chain: error.chain().cloned(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::types::ModuleIdentity;

    #[test]
    fn test_failure_serialization() -> Result<()> {
        let mut chain = ImportChain::new();
        chain.push(&ModuleIdentity::Virtual("main".to_owned()), "./missing");
        let error = BundleError::Resolution {
            specifier: "./missing".to_owned(),
            importer: "virtual:main".to_owned(),
            chain,
        };

        let diagnostics = Diagnostics::from_error(&error);
        assert!(!diagnostics.is_success());
        let value: Value = serde_json::from_str(&diagnostics.to_json()?)?;
        assert_eq!(value["status"], "failure");
        assert_eq!(value["kind"], "resolution");
        assert_eq!(value["identity"], "virtual:main");
        assert_eq!(
            value["chain"],
            json!([{ "importer": "virtual:main", "specifier": "./missing" }])
        );
        Ok(())
    }

    #[test]
    fn test_success_serialization() -> Result<()> {
        let report = BuildReport {
            bytes: 10,
            module_count: 2,
            externals: vec!["fontkit".to_owned()],
            ..BuildReport::default()
        };
        let diagnostics = Diagnostics::from_result(&Ok(vec![report]));
        let value: Value = serde_json::from_str(&diagnostics.to_json()?)?;
        assert_eq!(value["status"], "success");
        assert_eq!(value["outputs"][0]["bytes"], 10);
        assert_eq!(value["outputs"][0]["externals"], json!(["fontkit"]));
        Ok(())
    }
}
