// Command poller: fetch pending, execute firewall verb, ack

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::firewall;
use crate::agent::sender::Sender;
use crate::models::CommandStatus;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poll the server for pending commands every 10 s, execute them in FIFO
/// order and ack each with the true outcome. Fetch failures are silent (the
/// server may simply be unreachable).
pub async fn run_poller(sender: Arc<Sender>) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        let commands = match sender.fetch_commands().await {
            Ok(c) => c,
            Err(_) => continue,
        };
        for cmd in commands {
            info!("executing command {} on {}", cmd.action.as_str(), cmd.target_ip);
            let (status, output) = match firewall::execute_command(cmd.action, &cmd.target_ip).await
            {
                Ok(out) => (CommandStatus::Completed, out),
                Err(e) => {
                    warn!("command {} failed: {}", cmd.id, e);
                    (CommandStatus::Failed, e.to_string())
                }
            };
            if let Err(e) = sender.ack_command(&cmd.id, status, &output).await {
                warn!("failed to ack command {}: {}", cmd.id, e);
            }
        }
    }
}
