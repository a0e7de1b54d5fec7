//! Entity control-plane node.
//!
//! A fleet of externally-running entities self-register with this
//! process; the process then subscribes to each entity's monitoring
//! stream, aggregates the numeric samples it carries into a running
//! per-channel sum, and republishes that sum on an outbound channel.
//! Optional channels let embedders push update notices and commands back
//! out to every registered entity.
//!
//! The concurrent message plane — [`endpoint`], [`queue`], [`propagator`],
//! [`receiver`] — is the part worth reading first: three independent
//! reception pipelines (registration, monitoring, update) each own a
//! dedicated network endpoint, each decoupled from its downstream
//! consumer by a bounded single-consumer queue. [`lifecycle`] wires the
//! rest together in the order each piece depends on the last.

pub mod aggregator;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod propagator;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod subscriber_pool;
pub mod updater;

pub use config::ControllerConfig;
pub use context::ControllerContext;
pub use error::ControllerError;
pub use lifecycle::LifecycleController;
