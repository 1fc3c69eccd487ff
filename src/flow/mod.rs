/// Flow graph model: catalog, migration, validation, storage and registry

pub mod catalog;
pub mod migration;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;

pub use catalog::{node_schemas, validate_node_data, NodeConfig, NodeDataIssue, NodeSchema, CATALOG_VERSION};
pub use registry::{FlowRegistry, SavedFlow};
pub use storage::FlowStorage;
pub use types::*;
pub use validation::{build_graph, ExecutableGraph, FlowNode};
