//! Sandbox containers: naming, lifecycle and command dispatch.

pub mod dispatch;
pub mod identity;
pub mod reconcile;

pub use dispatch::{dispatch, exec_request, selected_container};
pub use identity::SandboxIdentity;
pub use reconcile::{SandboxContext, ensure_running};
