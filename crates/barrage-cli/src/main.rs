//! # barrage
//!
//! Terminal viewer for one live room: prints overlay messages, joins, leaves
//! and CDN line changes, and posts every stdin line as an overlay message.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use barrage_client::{Diagnostic, HttpResolver, RoomSession, SessionConfig, WsConnector};
use barrage_core::logging;
use barrage_core::{DanmakuPayload, RoomTarget};
use barrage_settings::BarrageSettings;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Watch a live room's overlay stream.
#[derive(Parser, Debug)]
#[command(name = "barrage", about = "Watch a live room's overlay stream")]
struct Cli {
    /// Room to join.
    #[arg(long, required_unless_present = "check")]
    room: Option<String>,

    /// Viewer ID. Omit to join anonymously.
    #[arg(long)]
    user: Option<String>,

    /// Backend base URL (overrides settings).
    #[arg(long)]
    api_url: Option<String>,

    /// Preferred region (overrides settings).
    #[arg(long)]
    region: Option<String>,

    /// Settings file (default: `~/.barrage/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Only check the backend health endpoint and exit.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<BarrageSettings> {
        let mut settings = match &self.settings {
            Some(path) => barrage_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => barrage_settings::load_settings().unwrap_or_default(),
        };
        if let Some(url) = &self.api_url {
            settings.resolver.base_url.clone_from(url);
        }
        if let Some(region) = &self.region {
            settings.resolver.region = Some(region.clone());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

fn subscribe_printers(session: &RoomSession) {
    let _ = session.on_overlay_event(|event| {
        if let Some(danmaku) = &event.danmaku {
            let who = event
                .username
                .as_deref()
                .or(event.user_id.as_deref())
                .unwrap_or("?");
            println!("[{who}] {}", danmaku.content);
        }
    });
    let _ = session.on_user_join(|event| {
        println!("* {} joined", event.user_id.as_deref().unwrap_or("someone"));
    });
    let _ = session.on_user_leave(|event| {
        println!("* {} left", event.user_id.as_deref().unwrap_or("someone"));
    });
    let _ = session.on_cdn_info(|cdn| match cdn.active_line() {
        Some(line) => info!(line = %line.name, url = %line.url, "cdn line"),
        None => info!(current = %cdn.current, "cdn line not advertised"),
    });
    let _ = session.on_diagnostic(|diagnostic| match diagnostic {
        Diagnostic::ReconnectExhausted { attempts } => {
            warn!(attempts, "gave up reconnecting; restart to try again");
        }
        other => tracing::debug!(?other, "session diagnostic"),
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = args.load_settings()?;
    if settings.logging.json {
        logging::init_json_subscriber(&settings.logging.level);
    } else {
        logging::init_subscriber(&settings.logging.level);
    }

    let resolver = HttpResolver::from_settings(&settings.resolver);

    if args.check {
        resolver
            .health()
            .await
            .with_context(|| format!("Backend at {} is not healthy", resolver.base_url()))?;
        println!("backend at {} is healthy", resolver.base_url());
        return Ok(());
    }

    let Some(room) = args.room.clone() else {
        bail!("--room is required");
    };
    let mut target = RoomTarget::new(room);
    if let Some(user) = args.user.clone() {
        target = target.with_user(user);
    }

    let session = RoomSession::new(
        target.clone(),
        Arc::new(resolver),
        Arc::new(WsConnector::new()),
        SessionConfig::from_settings(&settings),
    );
    subscribe_printers(&session);

    if !session.connect().await {
        bail!("Could not resolve connection info for {target}");
    }
    info!(%target, "watching; type a line to post it");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if !session.send(DanmakuPayload::new(line)).await {
                        warn!("message not sent; overlay channel is not open");
                    }
                }
                None => break,
            },
        }
    }

    session.close().await;
    info!("bye");
    Ok(())
}
