//! Lock bookkeeping for interpreted activations

pub mod monitor;

pub use monitor::MonitorStack;
