use async_trait::async_trait;
use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use webwx::bot::Bot;
use webwx::config::ClientConfig;
use webwx::handlers::{MessageContext, Reply, TextHandler};
use webwx::types::events::Event;
use webwx_ureq_http_client::UreqHttpClient;

// A demo client that logs direct messages and takes admin commands from the
// account's own messages.
//
// Usage:
//   cargo run                                  # default endpoints
//   cargo run -- --config webwx.json           # endpoints and timeouts from a file
//   cargo run -- --log debug                   # more verbose logging
//
// Admin commands (send them from the logged-in account, in any chat):
//   lg                   list groups with their index
//   lr                   list responders with their index
//   sr <group> [<resp>]  attach a responder to a group

#[derive(Parser)]
#[command(name = "webwx")]
#[command(about = "Polling web messaging client")]
struct Cli {
    /// JSON config file; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter, in env_logger syntax.
    #[arg(short, long, default_value = "info")]
    log: String,
}

/// Logs every text it receives.
struct SilentResponder;

#[async_trait]
impl TextHandler for SilentResponder {
    fn name(&self) -> &str {
        "SilentResponder"
    }

    async fn on_text(&self, text: String, _reply: Reply, ctx: MessageContext) -> anyhow::Result<()> {
        let from = ctx.resolved_sender().unwrap_or(ctx.sender_id());
        info!(target: "Responder/Silent", "{} {from}: {text}", ctx.message.peer_id);
        Ok(())
    }
}

/// Runtime administration through self-authored messages.
struct AdminResponder {
    responders: Vec<Arc<dyn TextHandler>>,
}

impl AdminResponder {
    fn run_command(&self, ctx: &MessageContext, command: &str, args: &[&str]) -> Option<String> {
        match command {
            "lg" => Some(
                ctx.client
                    .contacts()
                    .groups()
                    .enumerate()
                    .map(|(i, g)| format!("{i}:{}", g.name))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            "lr" => Some(
                self.responders
                    .iter()
                    .enumerate()
                    .map(|(i, r)| format!("{i}:{}", r.name()))
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            "sr" => {
                let group_index: usize = args.first()?.parse().ok()?;
                let responder_index: usize = match args.get(1) {
                    Some(raw) => raw.parse().ok()?,
                    None => 0,
                };
                let group = ctx.client.contacts().group_at(group_index)?.clone();
                let responder = self.responders.get(responder_index)?.clone();
                let added = ctx
                    .client
                    .respond_group_with(responder.clone(), Some(group.id.as_str()));
                Some(if added {
                    format!("{} now responds in {}", responder.name(), group.name)
                } else {
                    format!("{} already responds in {}", responder.name(), group.name)
                })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl TextHandler for AdminResponder {
    fn name(&self) -> &str {
        "AdminResponder"
    }

    async fn on_text(&self, text: String, reply: Reply, ctx: MessageContext) -> anyhow::Result<()> {
        if !ctx.is_self_authored() {
            return Ok(());
        }
        let mut words = text.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(());
        };
        let args: Vec<&str> = words.collect();
        if let Some(answer) = self.run_command(&ctx, command, &args) {
            reply.send(answer).await?;
        }
        Ok(())
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log.as_str()))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = match &cli.config {
        Some(path) => match ClientConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e:#}");
                return;
            }
        },
        None => ClientConfig::default(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let silent: Arc<dyn TextHandler> = Arc::new(SilentResponder);
        let admin = Arc::new(AdminResponder {
            responders: vec![silent.clone()],
        });

        let mut bot = match Bot::builder()
            .with_config(config)
            .with_http_client(UreqHttpClient::new())
            .on_event(|event, _client| async move {
                match event {
                    Event::QrCode { url, .. } => {
                        info!("----------------------------------------");
                        info!("Open and scan with the phone app:");
                        info!("{url}");
                        info!("----------------------------------------");
                    }
                    Event::QrScanned => info!("Scanned. Confirm the login on the phone."),
                    Event::LoggedIn(me) => info!("Session ready for {}", me.nick_name),
                    Event::SyncStalled { stage, reason, .. } => {
                        warn!("Sync gave up during {stage}: {reason}")
                    }
                    Event::SyncStopped => info!("Sync stopped."),
                }
            })
            .respond_with("single", silent)
            .respond_with("*", admin)
            .build()
            .await
        {
            Ok(bot) => bot,
            Err(e) => {
                error!("Failed to build bot: {e:#}");
                return;
            }
        };

        // Stops a pending login as well as a running sync loop.
        let client = bot.client();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping.");
                client.stop();
            }
        });

        let sync = match bot.run().await {
            Ok(handle) => handle,
            Err(e) => {
                error!("{e:#}");
                return;
            }
        };

        match sync.await {
            Ok(Ok(())) => info!("Bye."),
            Ok(Err(e)) => error!("{e}"),
            Err(e) => error!("Sync task failed: {e}"),
        }
    });
}
