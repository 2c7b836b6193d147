//! Shadow-state tracking for a parallel kernel interpreter.
//!
//! The engine mirrors every value and memory cell of a running kernel with a
//! shadow, and propagates shadows through every instruction the driving
//! interpreter retires. Two analyses share the engine:
//!
//! * [`TaintPlugin`] tracks whether data may be uninitialized and reports
//!   uses of such data in control flow, addressing and shared-memory writes.
//! * [`IntervalPlugin`] tracks numeric bounds and cross-checks comparisons and
//!   conversions against the concrete results.
//!
//! The driver owns one [`ShadowPlugin`] per run and one [`Workspace`] per
//! worker thread.
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod domain;
pub mod error;
pub mod frame;
pub mod host;
pub mod memory;
pub mod plugin;
pub mod scope;
pub mod table;
mod transfer;

pub use config::{PointerWidth, ShadowConfig};
pub use context::ShadowContext;
pub use diagnostic::{Defect, DefectKind, DefectLog};
pub use domain::{Audit, Domain, Interval, ShadowValue, Taint};
pub use error::{Inconsistency, Result, ShadowError};
pub use frame::{CallFrameStack, Frame};
pub use host::{HostRegistry, MapFlags, Visibility};
pub use memory::ShadowMemory;
pub use plugin::{IntervalPlugin, ShadowPlugin, TaintPlugin};
pub use scope::{GroupShadow, ItemShadow, Workspace};
pub use table::ShadowValueTable;
