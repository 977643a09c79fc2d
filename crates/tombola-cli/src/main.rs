// Tombola
// Copyright (C) 2025 Throneless Tech

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use futures_util::{Sink, SinkExt, StreamExt};
use http::HeaderValue;
use serde_json::Value;
use std::marker::Unpin;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};
use tombola_common::socket::SocketMessage;
use tracing::debug;
use tracing_log::AsTrace;
use url::Url;

/// The Tombola CLI
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// API authentication token
    #[arg(short, long)]
    auth: String,

    /// IP address and port to connect to
    #[arg(short, long)]
    connect: String,

    /// Verbosity
    #[command(flatten)]
    verbose: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// start a giveaway
    #[command(arg_required_else_help = true)]
    Start {
        /// Guild ID
        #[arg(short, long)]
        guild_id: String,

        /// Channel to post the giveaway in
        #[arg(short = 'n', long)]
        channel_id: String,

        /// Duration in minutes
        #[arg(short, long)]
        duration: i64,

        /// Number of winners
        #[arg(short, long, default_value_t = 1)]
        winners: i64,

        /// Prize description
        #[arg(required = true)]
        prize: Vec<String>,
    },

    /// cancel an open giveaway
    #[command(arg_required_else_help = true)]
    Cancel {
        /// Giveaway ID
        #[arg(short, long)]
        id: String,
    },

    /// draw new winners for an ended giveaway
    #[command(arg_required_else_help = true)]
    Reroll {
        /// Giveaway ID
        #[arg(short, long)]
        id: String,
    },

    /// list giveaways in a guild
    #[command(arg_required_else_help = true)]
    List {
        /// Guild ID
        #[arg(short, long)]
        guild_id: String,
    },
}

impl From<Commands> for SocketMessage<Value> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Start {
                guild_id,
                channel_id,
                duration,
                winners,
                prize,
            } => SocketMessage::StartGiveaway {
                guild_id,
                channel_id,
                prize: prize.join(" "),
                duration_minutes: duration,
                winner_count: winners,
            },
            Commands::Cancel { id } => SocketMessage::CancelGiveaway { id },
            Commands::Reroll { id } => SocketMessage::RerollGiveaway { id },
            Commands::List { guild_id } => SocketMessage::ListGiveaways { guild_id },
        }
    }
}

async fn send<S>(sender: &mut S, req: &SocketMessage<Value>) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Send + Sync + std::error::Error + 'static,
{
    let text = serde_json::to_string(req).context("Failed to encode request")?;
    debug!("Request: {text:?}");
    sender
        .send(Message::Text(text.into()))
        .await
        .context("Failed to send!")
}

async fn hangup<S>(sender: &mut S) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Send + Sync + std::error::Error + 'static,
{
    sender
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "Normal".into(),
        })))
        .await
        .context("Failed to send close message.")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.verbose.log_level_filter().as_trace())
        .init();

    let url = Url::parse(&format!("ws://{}/ws", args.connect)).context("Invalid address")?;
    let mut request = url
        .into_client_request()
        .context("Invalid websocket request")?;
    let auth_value = HeaderValue::from_str(&args.auth).context("Invalid auth token")?;
    request.headers_mut().insert("Authorization", auth_value);

    let (ws_stream, response) = connect_async(request)
        .await
        .context("WebSocket handshake failed")?;
    debug!("Server response was {response:?}");

    let (mut sender, mut receiver) = ws_stream.split();
    send(&mut sender, &args.command.into()).await?;

    let reply = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(t))) => break t,
            Some(Ok(other)) => debug!("Ignoring frame {other:?}"),
            Some(Err(err)) => return Err(err).context("Failed to receive reply"),
            None => bail!("Server closed the connection without replying"),
        }
    };
    hangup(&mut sender).await?;

    let reply: SocketMessage<Value> =
        serde_json::from_str(reply.as_str()).context("Unrecognized reply")?;
    match reply {
        SocketMessage::Response(res) => {
            println!("{}", serde_json::to_string_pretty(&res.response)?);
            Ok(())
        }
        SocketMessage::Error(res) => bail!("{}: {}", res.response_type, res.response),
        _ => bail!("Unrecognized reply"),
    }
}
