//! Read-only build report

use std::{io::Write as _, path::PathBuf};

use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::Reporter;
use crate::code_generator::{GeneratedBundle, ModuleComposition};

/// Size and composition of one emitted artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub file: Option<PathBuf>,
    pub bytes: usize,
    pub gzip_bytes: usize,
    /// Hex SHA-256 of the artifact
    pub sha256: String,
    pub minified: bool,
    pub module_count: usize,
    pub externals: Vec<String>,
    /// Rendered size of each module before any rewriting step
    pub modules: Vec<ModuleComposition>,
    pub cycles: Vec<Vec<String>>,
}

/// Byte size, compressed size and content hash of the artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentReport;

impl Reporter for ContentReport {
    fn name(&self) -> &str {
        "content"
    }

    fn report(&self, bundle: &GeneratedBundle, report: &mut BuildReport) {
        let bytes = bundle.code.as_bytes();
        report.bytes = bytes.len();
        report.gzip_bytes = gzip_size(bytes);
        report.sha256 = Sha256::digest(bytes)
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
    }
}

/// Modules, externals and cycles that went into the artifact
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphReport;

impl Reporter for GraphReport {
    fn name(&self) -> &str {
        "graph"
    }

    fn report(&self, bundle: &GeneratedBundle, report: &mut BuildReport) {
        report.module_count = bundle.modules.len();
        report.externals.clone_from(&bundle.externals);
        report.modules.clone_from(&bundle.modules);
        report.cycles.clone_from(&bundle.cycles);
    }
}

fn gzip_size(bytes: &[u8]) -> usize {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    // Writing into a Vec cannot fail
    if encoder.write_all(bytes).is_err() {
        return 0;
    }
    encoder.finish().map_or(0, |compressed| compressed.len())
}
