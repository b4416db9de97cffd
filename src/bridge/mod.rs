//! Process-boundary tool bridge.
//!
//! A [`DispatchChannel`] talks to a worker process over its stdio, a
//! [`ToolRegistry`] holds the catalog discovered on that channel, and a
//! [`ProxySet`] turns every catalog entry into a uniform callable.

mod channel;
mod invocation;
pub mod protocol;
mod proxy;
mod registry;
mod schema;

pub use channel::{ChannelOptions, DispatchChannel, PendingInvocation, WorkerCommand};
pub use invocation::{CorrelationId, Invocation, InvocationResult, Outcome};
pub use proxy::{ProxySet, ToolProxy};
pub use registry::ToolRegistry;
pub use schema::{Arguments, ParamType, ParameterSpec, ToolDescriptor};
