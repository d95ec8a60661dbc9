// Copyright 2025 Justin Hu
//
// This file is part of Sweep Online.
//
// Sweep Online is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// Sweep Online is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with Sweep Online. If not, see <https://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Game server for Sweep Online

mod engine;
mod matchmaking;
mod service;
mod session;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::service::{GameService, MatchSummary};
use sweep_common::{ClientMessage, ServerMessage};

#[derive(Parser)]
struct Args {
    #[clap(short, long, default_value = "3030")]
    port: u16,
    /// Hold formed matches in READY until all three players acknowledge,
    /// instead of starting them the moment matchmaking completes
    #[clap(long)]
    ack_start: bool,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    // Persistence collaborator boundary: terminal match summaries are handed
    // off here for storage elsewhere
    let (summary_tx, mut summary_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(summary) = summary_rx.recv().await {
            let MatchSummary {
                session_id,
                ranked,
                players,
                winner,
                duration,
            } = summary;
            info!(
                session = %session_id,
                ranked,
                ?players,
                winner = winner.as_deref().unwrap_or("-"),
                duration_secs = duration.as_secs(),
                "match summary"
            );
        }
    });

    let service = Arc::new(GameService::new(summary_tx, !args.ack_start));

    let app = Router::new()
        .route("/", get(websocket_handler))
        .with_state(service);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    info!("starting WebSocket server on ws://{addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(service): State<Arc<GameService>>,
) -> Response {
    info!(%addr, "new WebSocket connection");
    ws.on_upgrade(move |socket| handle_websocket(socket, service))
}

async fn handle_websocket(socket: WebSocket, service: Arc<GameService>) {
    let protocol_error = Message::Close(Some(CloseFrame {
        code: 4002,
        reason: "protocol error".into(),
    }));

    let (mut send, mut recv) = socket.split();

    // Identity handshake: the identity layer authenticates the connection and
    // supplies the username as the first frame; it is trusted completely here
    let Some(Ok(Message::Text(login))) = recv.next().await else {
        let _ = send.send(protocol_error).await;
        return;
    };
    let username = login.trim().to_string();
    if username.is_empty() {
        let _ = send.send(protocol_error).await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let Ok(connection) = service.register(&username, tx) else {
        let _ = send.send(Message::text("username taken")).await;
        return;
    };
    if send.send(Message::text("ok")).await.is_err() {
        service.unregister(&connection);
        return;
    }

    // All outbound traffic for this connection flows through its outbox
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = serde_json::to_string(&message).unwrap();
            if send.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = recv.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_message) => service.handle_message(&connection, client_message),
                Err(err) => {
                    warn!(player = %username, %err, "malformed message");
                    let _ = connection.tx.send(ServerMessage::Error {
                        error: "malformed message".to_string(),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Socket gone: fatal for any running match this player was bound to
    service.unregister(&connection);
}
