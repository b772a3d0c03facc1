//! Telegram bot: answers with a text completion of the recent chat history when
//! mentioned, replied to, or messaged privately. `/forget` clears the history.
//!
//! Configuration: `~/.config/murmur/config.toml` (`[env]` and `[bot]` tables) and
//! `.env`; tokens may also be passed as flags.

mod platform;

use std::collections::HashSet;
use std::sync::Arc;

use clap::Parser;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use murmur::{
    BotIdentity, ChannelId, Command, Coordinator, CoordinatorConfig, OpenAiCompletions,
    OpenAiConfig, TiktokenTokenizer, Tokenizer, UserId,
};
use platform::TelegramPlatform;

const APP_NAME: &str = "murmur";

#[derive(Parser, Debug)]
#[command(name = "telegram-bot", about = "Chat-history completion bot for Telegram")]
struct Args {
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Overrides `[bot].model`.
    #[arg(long)]
    model: Option<String>,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Commands:")]
enum UserCommand {
    #[command(description = "forget the conversation so far")]
    Forget,
}

struct AppState {
    coordinator: Arc<Coordinator>,
    platform: Arc<TelegramPlatform>,
}

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

async fn handle_message(msg: Message, state: Arc<AppState>) -> HandlerResult {
    let Some(inbound) = state.platform.inbound(&msg) else {
        return Ok(());
    };
    // Recorded on the dispatcher task so a chat's history keeps update order; only
    // the reply goes to its own task.
    let recorded = state.coordinator.record(inbound).await;
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.follow_up(recorded).await {
            warn!(kind = e.kind(), error = %e, "message handler failed");
        }
    });
    Ok(())
}

async fn handle_command(msg: Message, cmd: UserCommand, state: Arc<AppState>) -> HandlerResult {
    let command = match cmd {
        UserCommand::Forget => Command::Forget,
    };
    let channel = ChannelId(msg.chat.id.0);
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.on_command_invoked(channel, command).await {
            error!(channel = %channel, error = %e, "command failed");
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loaded = config::load_and_apply(APP_NAME, None);
    let _log_guard = config::init_tracing(APP_NAME);
    if let Err(e) = loaded {
        warn!(error = %e, "config load failed; using process environment only");
    }
    let args = Args::parse();
    let settings = config::load_settings(APP_NAME)?;

    let bot = Bot::new(&args.telegram_token);
    let me = bot.get_me().await?;
    info!(username = %me.username(), "connected to Telegram");
    if let Err(e) = bot.set_my_commands(UserCommand::bot_commands()).await {
        warn!(error = %e, "failed to register bot commands");
    }

    let model = args.model.unwrap_or_else(|| settings.model.clone());
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::gpt2()?);
    let completion = OpenAiCompletions::new(
        OpenAiConfig::new(args.openai_api_key, model.clone())
            .with_base_url(settings.base_url.clone())
            .with_temperature(settings.temperature)
            .with_max_tokens(u32::try_from(settings.max_tokens()).unwrap_or(u32::MAX)),
        tokenizer.clone(),
    );

    let platform = Arc::new(TelegramPlatform::new(bot.clone(), &me));
    let coordinator = Coordinator::new(
        platform.clone(),
        Arc::new(completion),
        tokenizer,
        BotIdentity {
            user_id: UserId(me.id.0),
            name: me.first_name.clone(),
        },
        CoordinatorConfig {
            max_input_tokens: settings.max_input_tokens,
            request_settings: settings.extra_api_settings.clone(),
            ignored_authors: settings
                .ignored_authors
                .iter()
                .copied()
                .map(UserId)
                .collect::<HashSet<_>>(),
            text_replacements: settings.text_replacements.clone(),
            history_capacity: settings.history_capacity,
            chunk_length: settings.chunk_length,
            request_timeout: settings.request_timeout(),
            ..Default::default()
        },
    )?;

    let state = Arc::new(AppState {
        coordinator: Arc::new(coordinator),
        platform,
    });

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<UserCommand>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_message));

    info!(model = %model, budget = settings.max_input_tokens, "dispatching updates");
    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
