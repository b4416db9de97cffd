//! Configuration module for Splice.
//!
//! Handles loading and saving application settings.

mod settings;

pub use settings::{
    ChannelSettings, DriverSettings, EngineSettings, Execution, GeneralSettings,
    PlannerSettings, Settings, WorkerSettings,
};
