//! Physical meter inspections: scheduling with priorities, completion
//! against a tolerance band, and fraud reconciliation with penalty and
//! interest.

pub mod reconciler;

pub use reconciler::{InspectionConfig, InspectionReconciler};
