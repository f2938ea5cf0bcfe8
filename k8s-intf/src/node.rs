// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{FREE_VF_ANNOTATION, FREE_VF_LABEL};
use k8s_openapi::api::core::v1::Node;

/// Pick the node whose reported machine id is `machine_id`.
#[must_use]
pub fn find_node_by_machine_id(
    nodes: impl IntoIterator<Item = Node>,
    machine_id: &str,
) -> Option<Node> {
    nodes.into_iter().find(|node| {
        node.status
            .as_ref()
            .and_then(|status| status.node_info.as_ref())
            .is_some_and(|info| info.machine_id == machine_id)
    })
}

/// The free VF capacity a node advertises to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeResourceRecord {
    free: u32,
}

impl NodeResourceRecord {
    #[must_use]
    pub fn from_free_count(free: u32) -> Self {
        Self { free }
    }

    /// Value of the `sriov/vfCount` annotation.
    #[must_use]
    pub fn annotation_value(&self) -> String {
        self.free.to_string()
    }

    /// Value of the `sriov/freeVFAvailable` label.
    #[must_use]
    pub fn label_value(&self) -> &'static str {
        if self.free > 0 { "true" } else { "false" }
    }

    /// Write the record into `node`, keeping every other annotation and label.
    pub fn apply(&self, node: &mut Node) {
        node.metadata
            .annotations
            .get_or_insert_default()
            .insert(FREE_VF_ANNOTATION.to_string(), self.annotation_value());
        node.metadata
            .labels
            .get_or_insert_default()
            .insert(FREE_VF_LABEL.to_string(), self.label_value().to_string());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeStatus, NodeSystemInfo};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn node(name: &str, machine_id: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                node_info: Some(NodeSystemInfo {
                    machine_id: machine_id.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn finds_node_by_machine_id() {
        let nodes = vec![node("a", "111"), Node::default(), node("b", "222")];
        let found = find_node_by_machine_id(nodes.clone(), "222").unwrap();
        assert_eq!(found.metadata.name.as_deref(), Some("b"));
        assert!(find_node_by_machine_id(nodes, "333").is_none());
    }

    #[test]
    fn record_values() {
        let one = NodeResourceRecord::from_free_count(1);
        assert_eq!(one.annotation_value(), "1");
        assert_eq!(one.label_value(), "true");
        let none = NodeResourceRecord::from_free_count(0);
        assert_eq!(none.annotation_value(), "0");
        assert_eq!(none.label_value(), "false");
    }

    #[test]
    fn apply_keeps_unrelated_metadata() {
        let mut n = node("a", "111");
        n.metadata.labels = Some(BTreeMap::from([(
            "kubernetes.io/hostname".to_string(),
            "a".to_string(),
        )]));
        NodeResourceRecord::from_free_count(3).apply(&mut n);
        assert_eq!(
            n.metadata.annotations,
            Some(BTreeMap::from([(
                FREE_VF_ANNOTATION.to_string(),
                "3".to_string()
            )]))
        );
        assert_eq!(
            n.metadata.labels,
            Some(BTreeMap::from([
                ("kubernetes.io/hostname".to_string(), "a".to_string()),
                (FREE_VF_LABEL.to_string(), "true".to_string()),
            ]))
        );

        NodeResourceRecord::from_free_count(0).apply(&mut n);
        let labels = n.metadata.labels.unwrap();
        assert_eq!(labels[FREE_VF_LABEL], "false");
    }
}
