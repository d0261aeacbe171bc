//! Builders for cluster fixtures.

use std::collections::BTreeMap;

use arena_control::cluster::{NodeSummary, NODE_TYPE_LABEL, REGION_LABEL};

/// Builder for test nodes.
pub struct NodeBuilder {
    name: String,
    labels: BTreeMap<String, String>,
    gpus: u32,
    cpu_cores: u32,
}

impl NodeBuilder {
    /// A CPU node with 64 cores.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            labels: BTreeMap::new(),
            gpus: 0,
            cpu_cores: 64,
        }
    }

    /// Sets the node type label.
    pub fn with_type(mut self, node_type: &str) -> Self {
        self.labels.insert(NODE_TYPE_LABEL.to_owned(), node_type.to_owned());
        self
    }

    /// Sets the region label.
    pub fn with_region(mut self, region: &str) -> Self {
        self.labels.insert(REGION_LABEL.to_owned(), region.to_owned());
        self
    }

    /// Sets the GPU capacity.
    pub fn with_gpus(mut self, gpus: u32) -> Self {
        self.gpus = gpus;
        self
    }

    pub fn build(self) -> NodeSummary {
        NodeSummary {
            name: self.name,
            labels: self.labels,
            gpus: self.gpus,
            cpu_cores: self.cpu_cores,
        }
    }
}

/// `count` H100 nodes with eight GPUs each in `region`.
pub fn gpu_nodes(count: u32, region: &str) -> Vec<NodeSummary> {
    (0..count)
        .map(|i| {
            NodeBuilder::new(&format!("gpu-{i}"))
                .with_type("gd-8xh100ib-i128")
                .with_region(region)
                .with_gpus(8)
                .build()
        })
        .collect()
}
