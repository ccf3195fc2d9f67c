//! # hearth-process
//!
//! **Purpose**: Supervision of long-running console processes, one per
//! working directory
//!
//! Launches a runtime against an artifact in an instance's working
//! directory, captures everything it prints into a bounded console, and
//! keeps its lifecycle state consistent no matter whether the process is
//! stopped, killed, or dies on its own.
//!
//! ## Features
//!
//! - **Console Buffer**: Bounded line history with oldest-first eviction
//! - **Output Capture**: Merged stdout/stderr, one console line per output line
//! - **Process Monitor**: Exit code recording and crash detection
//! - **Lifecycle Control**: Start, graceful stop with kill escalation, restart
//! - **Instance Registry**: Lazy loading, creation, listing and deletion
//! - **Console Streaming**: Replay-then-tail sessions with an end sentinel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hearth_process::{InstanceRegistry, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = InstanceRegistry::new(SupervisorConfig::new("servers"));
//!
//! registry.create(Some("survival")).await?;
//! let pid = registry.start("survival", Some("2G"), &[]).await?;
//! println!("started {pid}");
//!
//! registry.send_command("survival", "say hello").await?;
//! for line in registry.console_snapshot("survival", Some(20)).await? {
//!     println!("{line}");
//! }
//!
//! registry.stop("survival", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
mod capture;
mod child;
pub mod config;
pub mod error;
pub mod id;
pub mod instance;
mod monitor;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod stream;

pub use buffer::{ConsoleBuffer, ConsoleChunk, ConsoleLog, DEFAULT_CONSOLE_CAPACITY};
pub use config::{LaunchProfile, SupervisorConfig};
pub use error::{Result, SupervisorError};
pub use id::{sanitize_instance_id, InstanceId};
pub use instance::{InstanceState, InstanceStatus, ManagedInstance};
pub use registry::{InstanceRegistry, InstanceSummary};
pub use runtime::{RuntimeLocator, SystemRuntimeLocator};
pub use store::{InstanceStore, LocalInstanceStore};
pub use stream::{ConsoleEvent, ConsoleStream, STREAM_END_SENTINEL};
