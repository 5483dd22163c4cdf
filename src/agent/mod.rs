// Host-resident agent: collectors, tailers, sender, command poller

pub mod commands;
pub mod config;
pub mod connections;
pub mod discovery;
pub mod docker;
pub mod firewall;
pub mod log_tailer;
pub mod probes;
pub mod process;
pub mod runtime;
pub mod sampler;
pub mod sender;
pub mod supervisor;
