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

use axum::{
    Router,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::any,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tombola_common::error::{Result, TombolaErrorKind};
use tracing::info;

use crate::{
    api::ApiState,
    channels::{Platform, discord::DiscordPlatform},
    gate::CallGate,
    giveaway::{manager::GiveawayManager, store::GiveawayStore, sweeper::Sweeper},
    settings::Settings,
    socket,
};

pub async fn authenticate(
    State(auth): State<String>,
    req: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    match auth_header {
        Some(auth_header) if auth_header == auth => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

pub async fn init_server(settings: Settings) -> Result<()> {
    let platform: Arc<dyn Platform> = Arc::new(
        DiscordPlatform::new(&settings.discord)
            .map_err(|err| TombolaErrorKind::Platform(err.to_string()))?,
    );
    let gate = CallGate::new(settings.max_attempts, settings.backoff_base());

    let me = gate.call("current_user", || platform.current_user()).await?;
    info!(bot_id = %me.id, "logged in");

    let store = GiveawayStore::new(settings.store.clone());
    let state = ApiState {
        manager: GiveawayManager::spawn(store, me.id.clone()),
        platform,
        gate,
        bot_id: me.id,
        entry_emoji: settings.entry_emoji.clone(),
    };

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(Sweeper::new(state.clone(), settings.sweep_interval()).run(shutdown.clone()));
    tracker.close();

    let app = Router::new()
        .route("/ws", any(socket::handler))
        .route_layer(middleware::from_fn_with_state(
            settings.auth.clone(),
            authenticate,
        ))
        .with_state(state);

    let addr: SocketAddr = settings.bind.parse().map_err(|_| {
        TombolaErrorKind::Validation(format!("invalid bind address `{}`", settings.bind))
    })?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "server is running");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;

    shutdown.cancel();
    tracker.wait().await;
    served?;
    info!("server stopped");
    Ok(())
}
