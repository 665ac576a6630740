// src/exec/ticker.rs

//! Polling tickers: one task per agent sending `CycleDue` every period.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::engine::{AgentName, RuntimeEvent};

/// Spawn a ticker for `agent`. The first tick fires immediately. The task ends
/// when the runtime channel closes.
pub fn spawn_ticker(
    agent: AgentName,
    period: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            debug!(%agent, "cycle due");
            let event = RuntimeEvent::CycleDue {
                agent: agent.clone(),
            };
            if runtime_tx.send(event).await.is_err() {
                break;
            }
        }
    })
}
