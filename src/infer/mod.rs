//! Whole-program type inference: registry, graph, scanner and resolver.

pub mod graph;
pub mod kind;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod scanner;

pub use graph::{NodeId, TypeGraph};
pub use kind::{promote, Kind};
pub use registry::TypeRegistry;
pub use report::TypeReport;
pub use scanner::FunctionScan;
