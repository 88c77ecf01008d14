//! Daemon side: socket server, input pipeline and binding dispatch.

mod dispatch;
mod pipeline;
mod runtime;
mod server;
mod watch;

pub use pipeline::PipelineStatus;
pub use server::{client_request, client_stream, run_daemon};
