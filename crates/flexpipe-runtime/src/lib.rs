//! Runtime reconfiguration core for the FlexPipe switch.
//!
//! A controller incrementally splices a staged program into the running one
//! on a live device: nodes are copied over detached, rewired into the
//! traversal path, and cut over atomically through flex nodes, while packet
//! threads keep traversing a consistent graph. This crate owns the
//! per-context session state (dual graphs + name registry), the controller
//! command set with its fixed error taxonomy, the plan-file batch
//! interpreter, and the readers/writer + quiescence concurrency guard.

pub mod context;
pub mod control;
pub mod error;
pub mod gate;
pub mod plan;
pub mod registry;
pub mod switch;

// Re-export commonly used types
pub use context::{Context, SessionState};
pub use control::{ControlPlane, DeviceTarget, SessionHandle, TARGET_STATUS_BASE};
pub use error::{ReconfigError, SUCCESS};
pub use gate::PacketGate;
pub use plan::{parse_plan, PlanCommand};
pub use registry::NameRegistry;
pub use switch::Switch;
