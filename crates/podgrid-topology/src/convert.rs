//! Conversion from host node annotations to [`NodeSpec`].
//!
//! The host exposes topology as string labels on each node; this module
//! is the only place that knows their names.

use std::collections::HashMap;

use podgrid_core::NodeSpec;

use crate::error::{TopologyError, TopologyResult};

pub const SUPER_POD_ID_LABEL: &str = "podgrid.io/super-pod-id";
pub const RACK_ID_LABEL: &str = "podgrid.io/rack-id";
pub const MEMORY_GROUP_ID_LABEL: &str = "podgrid.io/memory-group-id";
/// Set to `unhealthy` by the health collector on faulted nodes.
pub const NODE_HEALTH_LABEL: &str = "podgrid.io/node-health";

/// Build a [`NodeSpec`] from a node's labels.
///
/// Super-pod and rack ids are mandatory; the memory group is optional.
pub fn node_from_labels(
    name: &str,
    labels: &HashMap<String, String>,
    idle_npus: u32,
) -> TopologyResult<NodeSpec> {
    let super_pod_id = required_id(name, labels, SUPER_POD_ID_LABEL)?;
    let rack_id = required_id(name, labels, RACK_ID_LABEL)?;
    let memory_group_id = labels
        .get(MEMORY_GROUP_ID_LABEL)
        .map(|value| parse_id(name, MEMORY_GROUP_ID_LABEL, value))
        .transpose()?;
    let unhealthy = labels
        .get(NODE_HEALTH_LABEL)
        .is_some_and(|v| v.eq_ignore_ascii_case("unhealthy"));

    Ok(NodeSpec {
        name: name.to_string(),
        super_pod_id,
        rack_id,
        memory_group_id,
        idle_npus,
        unhealthy,
    })
}

fn required_id(name: &str, labels: &HashMap<String, String>, key: &str) -> TopologyResult<u32> {
    let value = labels.get(key).ok_or_else(|| TopologyError::MissingAnnotation {
        node: name.to_string(),
        key: key.to_string(),
    })?;
    parse_id(name, key, value)
}

fn parse_id(name: &str, key: &str, value: &str) -> TopologyResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| TopologyError::InvalidAnnotation {
            node: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
}
