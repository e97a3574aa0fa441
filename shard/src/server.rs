use axum_server::Server;
use std::net::TcpListener;
use std::time::Duration;
use tracing::info;

use common::retry::Backoff;

use crate::register::register_with_coordinator;
use crate::routes::app;
use crate::state::ShardState;

#[derive(Debug, Clone)]
pub struct Registration {
    pub coordinator_url: String,
    pub advertise_url: String,
    pub http_timeout: Duration,
    pub backoff: Backoff,
}

/// Serves the node on `listener`, registering it once connections are
/// accepted. A node joins the roster only while it can take fragments.
pub async fn run(
    listener: TcpListener,
    state: ShardState,
    fault_injection: bool,
    registration: Option<Registration>,
) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let mut server = tokio::spawn(
        Server::from_tcp(listener).serve(app(state, fault_injection).into_make_service()),
    );
    info!(%addr, "listening");

    if let Some(reg) = registration {
        let client = reqwest::Client::builder()
            .timeout(reg.http_timeout)
            .build()?;

        tokio::select! {
            res = &mut server => return Ok(res??),
            res = register_with_coordinator(&client, &reg.coordinator_url, &reg.advertise_url, &reg.backoff) => {
                if let Err(e) = res {
                    server.abort();
                    return Err(e.into());
                }
            }
        }
    }

    server.await??;
    Ok(())
}
