pub mod analyzer;
pub mod code_generator;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod external;
pub mod graph_builder;
pub mod loader;
pub mod module_graph;
pub mod module_record;
pub mod names;
pub mod orchestrator;
pub mod package_json;
pub mod post_process;
pub mod resolver;
pub mod transforms;
pub mod types;

pub use config::PipelineConfig;
pub use error::{BundleError, BundleResult};
pub use orchestrator::BundleOrchestrator;
