//! CLI command implementations.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use socketpush_client::protocol::{Frequency, Schedule};
use socketpush_client::{
    ClientConfig, ConfigOverrides, Identity, Notification, OutgoingMessage, PushNotifier,
    SocketPush, DEFAULT_PUSH_API,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Global options shared by every command.
#[derive(Debug, Default)]
pub struct Settings {
    pub config: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub app_uuid: Option<String>,
    pub ack_timeout_ms: Option<u64>,
}

impl Settings {
    /// Resolve the client configuration; flags win over file and environment.
    pub fn load(&self) -> Result<ClientConfig> {
        let overrides = ConfigOverrides {
            endpoint: self.endpoint.clone(),
            app_uuid: self.app_uuid.clone(),
            ack_timeout_ms: self.ack_timeout_ms,
            push_api: None,
        };
        ClientConfig::load_overriding(self.config.as_deref(), &overrides)
            .context("Failed to load configuration")
    }
}

/// Options of `socketpush send`.
#[derive(Debug)]
pub struct SendArgs {
    pub text: String,
    pub room: Option<String>,
    pub alias: Option<String>,
    pub encrypted: bool,
    pub wait: u64,
}

/// Options of `socketpush trigger`.
#[derive(Debug)]
pub struct TriggerArgs {
    pub event: String,
    pub room: Option<String>,
    pub alias: Option<String>,
    pub payload: String,
    pub at: Option<String>,
    pub every: Option<String>,
    pub until: Option<String>,
}

/// Options of `socketpush notify`.
#[derive(Debug)]
pub struct NotifyArgs {
    pub token: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub link: Option<String>,
    pub kind: Option<String>,
    pub data: Option<String>,
    pub api: Option<String>,
}

async fn connect(settings: &Settings, identity: Identity) -> Result<SocketPush> {
    let config = settings.load()?;
    tracing::info!(endpoint = %config.endpoint, alias = %identity.alias, "Connecting");

    let client = SocketPush::new(config)?;
    client
        .connect(identity)
        .await
        .context("Failed to connect")?;
    Ok(client)
}

/// Print presence, messages and events until interrupted.
pub async fn listen(
    settings: &Settings,
    identity: Identity,
    rooms: &[String],
    events: &[String],
) -> Result<()> {
    let client = SocketPush::new(settings.load()?)?;

    client.on_status(|update| {
        let presence = if update.is_online { "online" } else { "offline" };
        println!("status   {} {presence}", update.user);
    });
    client.on_message(|message| {
        let room = message.room.as_deref().unwrap_or("-");
        let text = if message.encrypted {
            "<encrypted>"
        } else {
            message.message.as_str()
        };
        println!("message  {} [{room}] {text}", message.sender);
    });
    client.on_delivery_receipt(|receipt| {
        println!(
            "receipt  {} {} {}",
            receipt.client_msg_id.as_deref().unwrap_or("-"),
            receipt.alias,
            receipt.status
        );
    });
    for name in events {
        let label = name.clone();
        client.on_event(name.clone(), move |event| {
            let scope = if event.is_room { "room" } else { "direct" };
            println!("event    {label} ({scope}) {}", event.payload);
        });
    }

    client.connect(identity).await.context("Failed to connect")?;
    client.on_online_users(|users| {
        println!("online   {}", users.aliases().collect::<Vec<_>>().join(", "));
    });

    for room in rooms {
        client
            .join(room)
            .await
            .with_context(|| format!("Failed to join {room}"))?;
        println!("joined   {room}");
    }

    let mut state = client.subscribe_state();
    let lost = tokio::select! {
        _ = tokio::signal::ctrl_c() => false,
        changed = state.wait_for(|state| !state.is_connected()) => changed.is_ok(),
    };

    if lost {
        let reason = client.last_error().unwrap_or_else(|| "closed by server".into());
        client.disconnect();
        bail!("Connection lost: {reason}");
    }

    tracing::info!("Interrupted, disconnecting");
    client.disconnect();
    Ok(())
}

/// Send a chat message, then wait for its delivery receipt.
pub async fn send(settings: &Settings, identity: Identity, args: SendArgs) -> Result<()> {
    let client = connect(settings, identity).await?;

    let (tx, mut receipts) = mpsc::unbounded_channel();
    client.on_delivery_receipt(move |receipt| {
        let _ = tx.send(receipt);
    });

    let mut message = OutgoingMessage::new(args.text);
    if let Some(room) = args.room {
        message = message.in_room(room);
    }
    if let Some(alias) = args.alias {
        message = message.for_alias(alias);
    }
    if args.encrypted {
        message = message.encrypted();
    }

    let id = client
        .message(message)
        .await
        .context("Failed to send message")?;
    println!("sent {id}");

    if args.wait > 0 {
        let receipt = tokio::time::timeout(Duration::from_secs(args.wait), async {
            while let Some(receipt) = receipts.recv().await {
                if receipt.client_msg_id.as_deref() == Some(id.as_str()) {
                    return Some(receipt);
                }
            }
            None
        })
        .await;

        match receipt {
            Ok(Some(receipt)) => println!("{} {}", receipt.alias, receipt.status),
            _ => println!("no delivery receipt within {}s", args.wait),
        }
    }

    client.disconnect();
    Ok(())
}

/// Trigger an application event for a room and/or an alias.
pub async fn trigger(settings: &Settings, identity: Identity, args: TriggerArgs) -> Result<()> {
    if args.room.is_none() && args.alias.is_none() {
        bail!("Either --room or --to is required");
    }
    let payload = parse_payload(&args.payload)?;
    let schedule = build_schedule(args.at, args.every.as_deref(), args.until)?;

    let client = connect(settings, identity).await?;

    if let Some(room) = &args.room {
        let result = match &schedule {
            Some(schedule) => {
                client
                    .trigger_room_scheduled(&args.event, room, payload.clone(), schedule)
                    .await
            }
            None => client.trigger_room(&args.event, room, payload.clone()).await,
        };
        result.with_context(|| format!("Failed to trigger {} in {room}", args.event))?;
        println!("triggered {} in room {room}", args.event);
    }

    if let Some(alias) = &args.alias {
        let result = match &schedule {
            Some(schedule) => {
                client
                    .trigger_scheduled(&args.event, alias, payload.clone(), schedule)
                    .await
            }
            None => client.trigger(&args.event, alias, payload.clone()).await,
        };
        result.with_context(|| format!("Failed to trigger {} for {alias}", args.event))?;
        println!("triggered {} for {alias}", args.event);
    }

    client.disconnect();
    Ok(())
}

/// Send a device push notification.
pub async fn notify(settings: &Settings, args: NotifyArgs) -> Result<()> {
    let api = match args.api {
        Some(api) => api,
        None => push_api(settings)?,
    };

    let mut notification = Notification::default();
    if let Some(title) = args.title {
        notification.title = title;
    }
    if let Some(message) = args.message {
        notification.message = message;
    }
    if let Some(link) = args.link {
        notification = notification.with_link(link);
    }
    if let Some(kind) = args.kind {
        notification = notification.with_kind(kind);
    }
    if let Some(data) = args.data {
        let data = parse_payload(&data)?;
        if !data.is_object() {
            bail!("--data must be a JSON object");
        }
        notification = notification.with_data(data);
    }

    tracing::info!(api = %api, "Sending notification");
    let outcome = PushNotifier::new(api)?
        .send(&args.token, &notification)
        .await
        .context("Failed to reach notification API")?;

    if !outcome.success {
        bail!(
            "Notification rejected: {}",
            outcome.message.unwrap_or_else(|| "no reason given".into())
        );
    }
    println!("notification sent");
    Ok(())
}

/// Notification API from configuration, or the default.
///
/// An explicit `--config` must load; otherwise a missing or incomplete
/// environment just means the default API.
fn push_api(settings: &Settings) -> Result<String> {
    match settings.load() {
        Ok(config) => Ok(config.push_api.unwrap_or_else(|| DEFAULT_PUSH_API.to_string())),
        Err(e) if settings.config.is_some() => Err(e),
        Err(e) => {
            tracing::debug!(error = %format!("{e:#}"), "Using default notification API");
            Ok(DEFAULT_PUSH_API.to_string())
        }
    }
}

fn parse_payload(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON: {raw}"))
}

fn build_schedule(
    at: Option<String>,
    every: Option<&str>,
    until: Option<String>,
) -> Result<Option<Schedule>> {
    let mut schedule = Schedule {
        scheduled_at: at,
        frequency: None,
        repeat_until: until,
    };
    if let Some(every) = every {
        let frequency: Frequency = every
            .parse()
            .with_context(|| format!("Invalid --every value: {every}"))?;
        schedule = schedule.every(frequency);
    }
    Ok((!schedule.is_empty()).then_some(schedule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("{\"n\": 1}").unwrap()["n"], 1);
        assert!(parse_payload("{not json").is_err());
    }

    #[test]
    fn test_build_schedule() {
        assert_eq!(build_schedule(None, None, None).unwrap(), None);

        let schedule = build_schedule(Some("2030-01-01T09:00:00Z".into()), Some("15m"), None)
            .unwrap()
            .unwrap();
        assert_eq!(schedule.scheduled_at.as_deref(), Some("2030-01-01T09:00:00Z"));
        assert_eq!(schedule.frequency.unwrap().to_string(), "15m");

        assert!(build_schedule(None, Some("often"), None).is_err());
    }

    #[test]
    fn test_push_api_requires_valid_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "endpoint = [").unwrap();

        let settings = Settings {
            config: Some(file.path().to_path_buf()),
            ..Settings::default()
        };
        assert!(push_api(&settings).is_err());
    }

    #[test]
    fn test_push_api_from_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint = \"http://localhost:8000\"\napp_uuid = \"app1\"\npush_api = \"https://push.example.com/send\""
        )
        .unwrap();

        let settings = Settings {
            config: Some(file.path().to_path_buf()),
            ..Settings::default()
        };
        assert_eq!(push_api(&settings).unwrap(), "https://push.example.com/send");
    }

    #[tokio::test]
    async fn test_notify_fails_on_broken_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "endpoint = [").unwrap();

        let settings = Settings {
            config: Some(file.path().to_path_buf()),
            ..Settings::default()
        };
        let args = NotifyArgs {
            token: "tok".into(),
            title: None,
            message: None,
            link: None,
            kind: None,
            data: None,
            api: None,
        };
        let err = notify(&settings, args).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load configuration"));
    }

    #[test]
    fn test_settings_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint = \"http://localhost:8000\"\napp_uuid = \"app-file\"\nack_timeout_ms = 900"
        )
        .unwrap();

        let settings = Settings {
            config: Some(file.path().to_path_buf()),
            endpoint: Some("https://push.example.com".into()),
            app_uuid: None,
            ack_timeout_ms: None,
        };
        let config = settings.load().unwrap();
        assert_eq!(config.endpoint, "https://push.example.com");
        assert_eq!(config.ack_timeout_ms, 900);
    }
}
