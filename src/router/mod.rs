//! Server-side topic router.
//!
//! One broker connection per process. Inbound frames are dispatched on
//! their destination:
//! - `<prefix>.<resource>.read` replies with every record on the
//!   requester's `<prefix>.<resource>.create.<clientId>` channel
//! - `<prefix>.<resource>.create` stores new records and rebroadcasts them
//! - `<prefix>.<resource>.<id>.update` merges fields into a record
//! - `<prefix>.<resource>.<id>.delete` removes a record
//!
//! Replies carry `fromServer: true` so the router ignores its own
//! broadcasts. Frames are handled one at a time on a single task, so the
//! store needs no locking.

mod dispatch;
mod route;
mod store;

pub use dispatch::{Outbound, RouterConfig, TopicRouter, PING_MESSAGE};
pub use route::{Action, Route};
pub use store::{Record, RecordStore};

use crate::error::{BindError, Result};
use crate::stomp::StompClient;
use crate::transport::Transport;
use crate::types::Frame;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

/// Default keep-alive period.
pub const PING_PERIOD: Duration = Duration::from_secs(4 * 60);

fn apply(client: &StompClient, out: Outbound) -> Result<()> {
    match out {
        Outbound::Subscribe { destination } => client.subscribe_raw(&destination).map(|_| ()),
        Outbound::Publish {
            destination,
            body,
            headers,
        } => {
            let headers: Vec<(&str, &str)> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            client.publish(&destination, &body, &headers)
        }
    }
}

/// Drive `router` from a live connection until the broker closes it or
/// `shutdown` fires.
///
/// Dispatch failures are logged and the loop carries on. Returns the router
/// so its final store can be inspected.
pub async fn run(
    mut router: TopicRouter,
    client: StompClient,
    mut inbound: mpsc::UnboundedReceiver<Frame>,
    ping_period: Duration,
    shutdown: CancellationToken,
) -> TopicRouter {
    router.connecting();
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else {
                    tracing::info!("broker connection ended");
                    break;
                };
                match router.handle_frame(&frame) {
                    Ok(outs) => {
                        for out in outs {
                            let subscribe = matches!(out, Outbound::Subscribe { .. });
                            match apply(&client, out) {
                                Ok(()) if subscribe => router.subscribed(),
                                Ok(()) => {}
                                Err(e) => tracing::error!(error = %e, "could not send to broker"),
                            }
                        }
                    }
                    Err(BindError::Broker(message)) => {
                        tracing::error!(%message, "error from the STOMP broker");
                    }
                    Err(e) => tracing::error!(
                        destination = ?frame.destination(),
                        error = %e,
                        "dispatch failed"
                    ),
                }
            }
            _ = ticker.tick() => {
                if let Some(ping) = router.ping() {
                    if let Err(e) = apply(&client, ping) {
                        tracing::warn!(error = %e, "ping failed");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                client.disconnect();
                break;
            }
        }
    }

    router.disconnected();
    router
}
