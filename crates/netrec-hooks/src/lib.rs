//! netrec-hooks: Interception layer between the host's resource lifecycle
//! and the reconciler
//!
//! Every hook calls through to the delegate store first and reconciles only
//! after the write has committed. A failed reconciliation leaves the primary
//! resource in place and surfaces as [`netrec_core::Error::Reconciliation`].

pub mod event;
pub mod hooks;
pub mod presentation;

pub use event::{HookHandler, LifecycleEvent};
pub use hooks::{HookOutcome, LifecycleHooks};
pub use presentation::{present_port, RouterSyncData};
