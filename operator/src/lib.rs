//! Reconciliation engine for InferenceService custom resources.

pub mod annotations;
pub mod builder;
pub mod component;
pub mod config;
pub mod constants;
pub mod crd;
pub mod error;
pub mod event;
pub mod metrics;
pub mod placement;
pub mod reconcile;
pub mod reconciler;
pub mod runtime;
pub mod status;
