/// Forward migration of stored graphs across catalog versions
///
/// Each step rewrites a `StoredFlow` from version `n` to `n + 1`. Loading
/// and saving always run the full pipeline so the engine only ever sees the
/// current catalog.
///
/// Version history:
/// - 1: `event.*` / `action.*` tags, edges pointing consumer -> producer
/// - 2: `input.*` / `processing.*` / `output.*` tags, edges producer -> consumer
/// - 3: door, button and conditional types added (no rewrite needed)

use crate::error::MigrationError;
use crate::flow::catalog::CATALOG_VERSION;
use crate::flow::types::StoredFlow;

type Step = fn(StoredFlow) -> StoredFlow;

/// Steps indexed by their starting version minus one
const STEPS: [Step; (CATALOG_VERSION - 1) as usize] = [v1_to_v2, v2_to_v3];

/// Bring a stored flow up to [`CATALOG_VERSION`]
pub fn migrate(mut flow: StoredFlow) -> Result<StoredFlow, MigrationError> {
    if flow.catalog_version == 0 {
        return Err(MigrationError::InvalidVersion);
    }
    if flow.catalog_version > CATALOG_VERSION {
        return Err(MigrationError::UnsupportedVersion {
            found: flow.catalog_version,
            supported: CATALOG_VERSION,
        });
    }

    while flow.catalog_version < CATALOG_VERSION {
        let from = flow.catalog_version;
        flow = STEPS[(from - 1) as usize](flow);
        flow.catalog_version = from + 1;
        tracing::debug!("🔁 Migrated flow from catalog v{} to v{}", from, from + 1);
    }

    Ok(flow)
}

fn v1_to_v2(mut flow: StoredFlow) -> StoredFlow {
    for node in &mut flow.nodes {
        node.node_type = rename_v1_type(&node.node_type);
    }

    for edge in &mut flow.edges {
        std::mem::swap(&mut edge.source, &mut edge.target);
        std::mem::swap(&mut edge.source_handle, &mut edge.target_handle);
    }

    flow
}

fn rename_v1_type(tag: &str) -> String {
    if tag == "action.util.wait" {
        return "processing.wait".to_string();
    }
    if let Some(rest) = tag.strip_prefix("event.") {
        return format!("input.{}", rest);
    }
    if let Some(rest) = tag.strip_prefix("action.") {
        return format!("output.{}", rest);
    }
    tag.to_string()
}

fn v2_to_v3(flow: StoredFlow) -> StoredFlow {
    flow
}
