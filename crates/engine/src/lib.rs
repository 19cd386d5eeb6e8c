//! ReviewDock Engine
//!
//! Tracks the live progress of a remote multi-agent analysis. Inbound
//! transport frames are decoded into typed events, folded through two pure
//! functions (the phase state machine and the per-agent status projector)
//! and republished as a render-ready [`SessionSnapshot`] after every frame.

pub mod config;
pub mod decoder;
pub mod engine;
pub mod projector;
pub mod session;
pub mod session_actor;
pub mod session_command;
pub mod transition;

pub use config::{ClientConfig, ConfigError};
pub use decoder::{decode, DecodeError, Event, EventKind};
pub use engine::{EngineError, SessionEngine};
pub use session::{AgentState, AgentStatus, AgentTable, SessionPhase, SessionSnapshot, SnapshotPublisher};
pub use session_actor::SessionActorHandle;
