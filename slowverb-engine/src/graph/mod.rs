//! Audio processing graph
//!
//! - [`nodes`]: source nodes, shared parameters, node factory
//! - [`render`]: the render-side graph and the clocked [`Renderer`]
//! - [`context`]: [`AudioContext`], the renderer paired with an output driver
//! - [`manager`]: builds, rewires and tears down graphs per tier

pub mod context;
pub mod manager;
pub mod nodes;
pub mod render;

pub use context::AudioContext;
pub use manager::{AudioGraph, AudioGraphManager, BuildReport};
pub use nodes::{
    BufferSourceNode, DefaultNodeFactory, GraphParams, NodeFactory, SourceHandle, SourceNode,
};
pub use render::{EngineClock, GraphProcessor, Renderer};

/// Shape of a built graph, chosen once at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphTopology {
    /// source → gain → analyser → destination
    Basic,
    /// source → filter → gain → analyser, with parallel dry and convolver/wet paths
    Standard,
}

impl GraphTopology {
    /// Whether filter and reverb controls do anything
    pub fn has_effects(&self) -> bool {
        matches!(self, GraphTopology::Standard)
    }
}
