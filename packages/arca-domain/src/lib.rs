pub mod graph;

pub use graph::{ChildGraphFields, GraphProjection, compute_child_graph, depth_bounds};
