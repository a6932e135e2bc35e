//! Variable list engine for PLC network variables.
//!
//! This is the "just works" layer. Declare a list, open it on a client, and
//! the engine keeps a live mirror of the controller's values while pushing
//! local changes either per variable or as one packed frame.

pub mod client;
pub mod counter;
pub mod cyclic;
pub mod declaration;
pub mod definition;
pub mod error;
pub mod list;
pub mod options;
pub mod registry;
pub mod table;

pub use client::{ClientConfig, NetvarClient};
pub use counter::SequenceCounter;
pub use cyclic::CyclicTask;
pub use declaration::{Declaration, DeclarationEntry};
pub use definition::{render_gvl, GvlSettings, FALLBACK_INTERVAL_MS};
pub use error::{ListError, Result};
pub use list::NetvarList;
pub use options::{ChangeHandler, ListOptions, DEFAULT_CYCLE_INTERVAL};
pub use registry::{DispatchRegistry, FrameHandler, ListenerId};
pub use table::{Update, ValueTable};
