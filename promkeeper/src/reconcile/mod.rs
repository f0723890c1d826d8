//! Reconciliation of externally-declared rule objects.

pub mod kube;
mod reconciler;
pub mod remote;

pub use kube::KubeClient;
pub use reconciler::{
    AddedReport, EventAction, ReconcilerConfig, ReconcilerState, RulesChanged, WatchReconciler,
    backoff_delay,
};
pub use remote::{
    ObjectMeta, ObjectStore, ResourceKind, WatchEvent, WatchEventType, WatchSource,
    WatchedResource,
};
