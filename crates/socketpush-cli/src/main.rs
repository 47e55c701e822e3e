//! SocketPush CLI - talk to a SocketPush server from the terminal.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

/// SocketPush - real-time notifications and presence
#[derive(Parser, Debug)]
#[command(name = "socketpush")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server URL (overrides configuration)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// App scope (overrides configuration)
    #[arg(long = "app", global = true)]
    app_uuid: Option<String>,

    /// Acknowledgment timeout in milliseconds
    #[arg(long, global = true)]
    ack_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect and print presence, messages and events until interrupted
    Listen {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Rooms to join
        #[arg(short, long = "room")]
        rooms: Vec<String>,

        /// Application events to print
        #[arg(short, long = "event")]
        events: Vec<String>,
    },

    /// Send a chat message and wait for its delivery receipt
    Send {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Message text
        text: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Mark the text as end-to-end encrypted
        #[arg(long)]
        encrypted: bool,

        /// Seconds to wait for a delivery receipt (0 to skip)
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },

    /// Trigger an application event
    Trigger {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Event name
        event: String,

        #[command(flatten)]
        target: TargetArgs,

        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// First delivery time
        #[arg(long)]
        at: Option<String>,

        /// Repeat interval, e.g. 15m or 1d
        #[arg(long)]
        every: Option<String>,

        /// Stop repeating at this time
        #[arg(long)]
        until: Option<String>,
    },

    /// Send a device push notification through the notification API
    Notify {
        /// Device push token
        #[arg(short, long)]
        token: String,

        /// Notification title
        #[arg(long)]
        title: Option<String>,

        /// Notification body
        #[arg(short, long)]
        message: Option<String>,

        /// Click-through link
        #[arg(long)]
        link: Option<String>,

        /// Notification category
        #[arg(long = "type")]
        kind: Option<String>,

        /// Extra data as a JSON object
        #[arg(long)]
        data: Option<String>,

        /// Notification API URL
        #[arg(long)]
        api: Option<String>,
    },

    /// Show version information
    Version,
}

/// Who to register as.
#[derive(Args, Debug)]
struct IdentityArgs {
    /// Alias to register
    #[arg(short, long)]
    alias: String,

    /// Push token to register with
    #[arg(long)]
    push_token: Option<String>,
}

/// Where to deliver.
#[derive(Args, Debug)]
#[group(required = true, multiple = true)]
struct TargetArgs {
    /// Target room
    #[arg(long)]
    room: Option<String>,

    /// Target alias
    #[arg(long)]
    to: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    logging::init_logging(log_level, cli.json_logs);

    let settings = commands::Settings {
        config: cli.config,
        endpoint: cli.endpoint,
        app_uuid: cli.app_uuid,
        ack_timeout_ms: cli.ack_timeout_ms,
    };

    let result = match cli.command {
        Commands::Listen {
            identity,
            rooms,
            events,
        } => commands::listen(&settings, identity.into(), &rooms, &events).await,
        Commands::Send {
            identity,
            text,
            target,
            encrypted,
            wait,
        } => {
            let send = commands::SendArgs {
                text,
                room: target.room,
                alias: target.to,
                encrypted,
                wait,
            };
            commands::send(&settings, identity.into(), send).await
        }
        Commands::Trigger {
            identity,
            event,
            target,
            payload,
            at,
            every,
            until,
        } => {
            let trigger = commands::TriggerArgs {
                event,
                room: target.room,
                alias: target.to,
                payload,
                at,
                every,
                until,
            };
            commands::trigger(&settings, identity.into(), trigger).await
        }
        Commands::Notify {
            token,
            title,
            message,
            link,
            kind,
            data,
            api,
        } => {
            let notify = commands::NotifyArgs {
                token,
                title,
                message,
                link,
                kind,
                data,
                api,
            };
            commands::notify(&settings, notify).await
        }
        Commands::Version => {
            println!("socketpush {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

impl From<IdentityArgs> for socketpush_client::Identity {
    fn from(args: IdentityArgs) -> Self {
        let identity = socketpush_client::Identity::new(args.alias);
        match args.push_token {
            Some(token) => identity.with_token(token),
            None => identity,
        }
    }
}
