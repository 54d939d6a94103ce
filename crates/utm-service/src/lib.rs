//! UTM service - the stateful core behind the delivery API
//!
//! Owns the committed-trajectory store and runs the resolver/committer
//! pipeline; planning and conflict detection come from `utm-core`. The
//! HTTP/WebSocket surface, visualization and simulator are external
//! consumers of [`UtmService`].

pub mod config;
pub mod error;
pub mod events;
pub mod resolver;
pub mod service;
pub mod store;

pub use error::RequestError;
pub use events::{EventBus, UtmEvent};
pub use service::{SystemStatus, UtmService};
pub use store::TrajectoryStore;
