//! Planning loop on top of the tool bridge.
//!
//! A [`Driver`] takes natural-language intents, asks a [`Planner`] which
//! tools to call, runs them through the current [`Session`]'s proxies and
//! hands the final answer back to the operator.

mod driver;
mod openai_planner;
mod planner;
mod session;

pub use driver::{is_termination, Driver, DriverEvent, DriverOptions, DriverReply, DriverState};
pub use openai_planner::OpenAIPlanner;
pub use planner::{PlanStep, Planner, ToolSelection, Turn};
pub use session::{worker_command, Connector, Session, WorkerConnector};
