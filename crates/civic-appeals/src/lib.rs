//! Two-phase fraud adjudication: a staff fraud mark opens an appeal, an
//! admin decision either vindicates the citizen or confirms the fraud.

pub mod resolver;

pub use resolver::{AppealDecision, AppealResolver, ResolverConfig};
