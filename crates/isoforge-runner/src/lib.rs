//! Subprocess execution for isoforge.
//!
//! The one invariant everything here serves: the status returned for a work
//! item is the status of the invoked command itself. The runner reads the
//! child's output streams directly and forwards them to the log sink, so
//! there is no intermediary process whose own exit status could mask the
//! command's. The return type cannot represent "status of the logger".

mod command_spec;
mod log_sink;
mod process;

pub use command_spec::CommandSpec;
pub use log_sink::LogSink;
pub use process::{ItemStatus, NativeRunner, ProcessRunner};
