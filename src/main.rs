use chatsync::credentials::Credentials;
use chatsync::session::Session;
use chatsync::time::format_timestamp;
use chatsync::types::events::Event;
use chatsync::types::ConversationId;
use chatsync::SessionConfig;
use chrono::{Local, Utc};
use clap::Parser;
use log::{error, info, warn};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

// A terminal client for poking at a chat backend.
//
// Usage:
//   cargo run -- --token <JWT>
//   cargo run -- --token <JWT> --api-url http://chat.local:8000 --ws-url ws://chat.local:8000/ws/chat/
//
// Commands: /list, /users, /open <uuid|room>, /typing, /retry, /friend <uuid>,
// /search <text>, /quit. Any other line is sent to the open conversation.

#[derive(Parser, Debug)]
#[command(version, about = "Conversation sync demo client")]
struct Args {
    /// Access token (JWT) for the backend.
    #[arg(short, long, env = "CHATSYNC_TOKEN")]
    token: String,

    /// Overrides the `user_id` claim of the token.
    #[arg(short, long)]
    user_id: Option<Uuid>,

    #[arg(long, default_value = "http://localhost:8000")]
    api_url: String,

    #[arg(long, default_value = "ws://localhost:8000/ws/chat/")]
    ws_url: String,

    /// Seconds a peer stays "typing" after its last indicator.
    #[arg(long, default_value_t = 5)]
    typing_timeout: u64,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
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

    let credentials = match args.user_id {
        Some(user_id) => Credentials::new(args.token.clone(), user_id),
        None => match Credentials::from_token(args.token.clone()) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Could not read the user id from the token: {e}. Pass --user-id.");
                return;
            }
        },
    };

    let config = SessionConfig {
        api_base_url: args.api_url,
        ws_url: args.ws_url,
        typing_timeout: Duration::from_secs(args.typing_timeout),
        ..Default::default()
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let session = match Session::builder()
            .with_config(config)
            .on_event(print_event)
            .open(credentials)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open session: {e}");
                return;
            }
        };

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            };
            if !run_command(&session, line.trim()).await {
                break;
            }
        }

        session.close().await;
        info!("Bye.");
    });
}

/// Returns false when the user asked to quit.
async fn run_command(session: &Session, line: &str) -> bool {
    let (command, argument) = match line.split_once(' ') {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };
    let result = match command {
        "" => Ok(()),
        "/quit" => return false,
        "/list" | "/search" => session.search(argument).await.map(|conversations| {
            let now = Utc::now();
            for c in conversations {
                let last = c
                    .last_message
                    .as_ref()
                    .map(|m| format!("{} ({})", m.content, format_timestamp(&m.timestamp, &now)))
                    .unwrap_or_default();
                let unread = if c.unread_count > 0 {
                    format!(" [{}]", c.unread_count)
                } else {
                    String::new()
                };
                let typing = if c.typing { " typing..." } else { "" };
                println!("{}  {}{}{}  {}", c.id, c.display_name, unread, typing, last);
            }
        }),
        "/users" => session.users().await.map(|users| {
            for u in users {
                let status = if u.is_online { "online" } else { "offline" };
                println!("{}  {}  {}", u.id, u.display_name(), status);
            }
        }),
        "/open" => {
            let id = ConversationId::parse(argument);
            match session.select_conversation(id.clone()).await {
                Ok(selected) => {
                    println!(
                        "== {} (room {}) ==",
                        selected.conversation.display_name, selected.room_id
                    );
                    session.messages(&id).await.map(|messages| {
                        for m in messages {
                            let who = if m.is_from(&session.self_id()) { "me" } else { "them" };
                            let read = if m.read_receipt { " ✓" } else { "" };
                            println!("[{}] {}: {}{}", m.timestamp.format("%H:%M"), who, m.content, read);
                        }
                    })
                }
                Err(e) => Err(e),
            }
        }
        "/typing" => session.notify_typing().await,
        "/retry" => session.retry().await,
        "/friend" => match Uuid::parse_str(argument) {
            Ok(user) => session
                .send_friendship_request(user)
                .await
                .map(|message| println!("{message}")),
            Err(_) => {
                warn!("Usage: /friend <uuid>");
                Ok(())
            }
        },
        _ => session.send_message(line).await,
    };
    if let Err(e) = result {
        warn!("{command}: {e}");
    }
    true
}

fn print_event(event: &Event) {
    match event {
        Event::ConnectionStateChanged(state) => info!("Connection {state}"),
        Event::Notification(notification) => println!("** {}", notification.text),
        Event::TypingChanged { peer, typing: true } => println!("{peer} is typing..."),
        Event::PresenceChanged { user, online } => {
            info!("{user} is {}", if *online { "online" } else { "offline" })
        }
        Event::SnapshotLoaded {
            created,
            updated,
            users,
        } => info!(
            "Snapshot: {} conversations, {} users",
            created + updated,
            users
        ),
        Event::SnapshotFailed(reason) => warn!("Snapshot failed ({reason}); type /retry"),
        _ => {}
    }
}
