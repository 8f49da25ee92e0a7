//! Domain impact graph
//!
//! Builds a [`DomainMap`] from the project's source tree, then predicts how a
//! change set propagates through it.

pub mod builder;
pub mod graph;
pub mod impact;
pub mod model;
pub mod naming;
pub mod risk;

pub use builder::DomainGraphBuilder;
pub use graph::DomainGraph;
pub use impact::{analyze_specific_domains_impact, predict_change_impact};
pub use model::{
    Domain, DomainMap, DomainRelationship, ImpactGraph, ImpactLevel, ImpactNode, ImpactPrediction,
    PropagationPath, RelationshipType, RiskFactor, RiskLevel, SpecificDomainsImpact,
    UpdatePriority,
};
pub use naming::{infer_location, location_for_path, DomainLocation};
