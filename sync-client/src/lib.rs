//! Keeps a device's copy of the survey dataset in step with the authority.
//!
//! The pieces:
//! - [`SyncCoordinator`] owns the local dataset. Edits go through it, get pushed to the authority
//!   (debounced, one request at a time) and whatever comes back is merged into local state.
//! - A [`Transport`] talks to the authority. [`HttpTransport`] is the real one.
//! - An [`ApplyGate`] holds merged datasets back from the screen until the user stops typing,
//!   and keeps their cursor where it was across the refresh.

pub mod config;
pub mod coordinator;
mod error;
pub mod focus;
pub mod gate;
pub mod local;
pub mod sse;
pub mod transport;

pub use config::ClientConfig;
pub use coordinator::SyncCoordinator;
pub use error::SyncError;
pub use focus::{FocusLocator, FocusSnapshot, Selection, Surface};
pub use gate::{ActivityMonitor, ApplyGate};
pub use local::{LocalStore, MemoryStore};
pub use transport::{HttpTransport, PushStream, Transport};
