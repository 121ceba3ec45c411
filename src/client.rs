//! UDP session with the SCR race server.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time;

use crate::config::DriverConfig;
use crate::controller::Controller;

const IDENTIFIED: &str = "***identified***";
const SHUTDOWN: &str = "***shutdown***";
const RESTART: &str = "***restart***";

const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub episodes: u32,
    pub steps: u64,
    pub server_shutdown: bool,
}

/// Identify, then answer every sensor datagram with a command until the server shuts us
/// down or `max_episodes` episodes have ended (0 = no limit).
pub async fn run(cfg: &DriverConfig, controller: &mut Controller) -> Result<SessionSummary> {
    let server = lookup_host(cfg.server_addr())
        .await
        .with_context(|| format!("cannot resolve {}", cfg.server_addr()))?
        .next()
        .with_context(|| format!("no address for {}", cfg.server_addr()))?;
    let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await.context("failed to bind UDP socket")?;
    socket
        .connect(server)
        .await
        .with_context(|| format!("failed to connect to {}", server))?;

    tracing::info!(
        server = %server,
        id = %cfg.client_id,
        stage = ?controller.stage(),
        track = cfg.track.as_deref().unwrap_or("-"),
        "starting session"
    );

    let wait = cfg.recv_timeout();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut summary = SessionSummary::default();

    loop {
        identify(&socket, cfg, controller, &mut buf, wait).await?;

        let mut step: u64 = 0;
        loop {
            let Some(raw) = recv_text(&socket, &mut buf, wait).await? else {
                tracing::debug!("no sensor data from server");
                continue;
            };

            if raw.contains(SHUTDOWN) {
                controller.on_shutdown();
                summary.server_shutdown = true;
                tracing::info!("client shutdown");
                break;
            }
            if raw.contains(RESTART) {
                controller.on_restart();
                tracing::info!("client restart");
                break;
            }

            step += 1;
            summary.steps += 1;
            let reply = if step == cfg.max_steps {
                controller.restart_request()
            } else {
                controller.drive(&raw)
            };
            socket
                .send(reply.as_bytes())
                .await
                .context("failed to send command")?;
        }

        summary.episodes += 1;
        if summary.server_shutdown
            || (cfg.max_episodes != 0 && summary.episodes >= cfg.max_episodes)
        {
            break;
        }
    }

    if !summary.server_shutdown {
        controller.on_shutdown();
    }
    Ok(summary)
}

async fn identify(
    socket: &UdpSocket,
    cfg: &DriverConfig,
    controller: &Controller,
    buf: &mut [u8],
    wait: Duration,
) -> Result<()> {
    let hello = format!("{}{}", cfg.client_id, controller.init());
    loop {
        tracing::debug!("sending id to server: {}", hello);
        socket
            .send(hello.as_bytes())
            .await
            .context("failed to send handshake")?;

        match recv_text(socket, buf, wait).await? {
            Some(reply) if reply.contains(IDENTIFIED) => {
                tracing::info!("identified by server");
                return Ok(());
            }
            Some(reply) => tracing::debug!("unexpected handshake reply: {}", reply),
            None => tracing::debug!("waiting for server..."),
        }
    }
}

/// `None` on timeout, or when nothing is listening yet.
async fn recv_text(socket: &UdpSocket, buf: &mut [u8], wait: Duration) -> Result<Option<String>> {
    match time::timeout(wait, socket.recv(buf)).await {
        Err(_) => Ok(None),
        Ok(Ok(n)) => Ok(Some(
            String::from_utf8_lossy(&buf[..n])
                .trim_end_matches('\0')
                .to_string(),
        )),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
            time::sleep(wait).await;
            Ok(None)
        }
        Ok(Err(e)) => Err(e).context("failed to receive from server"),
    }
}
