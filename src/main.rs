//! Chatter - terminal chat client
//!
//! A line-oriented shell over the client core. Lines starting with `/` are
//! commands, anything else is sent to the current conversation.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatter::conversation::Role;
use chatter::core::{ChatState, Notifier, Severity};
use chatter::{App, Config};

const HELP: &str = "\
Commands:
  /signup <username> <password>   create an account
  /login <username> <password>    log in
  /logout                         log out
  /list                           refresh conversations
  /new                            start a conversation
  /open <id>                      switch conversation
  /delete <id>                    delete a conversation
  /help                           show this help
  /quit                           exit
Anything else is sent as a message.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Signup { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    List,
    New,
    Open(String),
    Delete(String),
    Help,
    Quit,
    Send(String),
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(Command::Send(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("/signup", [username, password]) => Ok(Command::Signup {
            username: username.to_string(),
            password: password.to_string(),
        }),
        ("/login", [username, password]) => Ok(Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        }),
        ("/signup", _) | ("/login", _) => Err(format!("Usage: {} <username> <password>", name)),
        ("/logout", []) => Ok(Command::Logout),
        ("/list", []) => Ok(Command::List),
        ("/new", []) => Ok(Command::New),
        ("/open", [id]) => Ok(Command::Open(id.to_string())),
        ("/delete", [id]) => Ok(Command::Delete(id.to_string())),
        ("/open", _) | ("/delete", _) => Err(format!("Usage: {} <id>", name)),
        ("/help", _) => Ok(Command::Help),
        ("/quit", _) | ("/exit", _) => Ok(Command::Quit),
        _ => Err(format!("Unknown command: {} (try /help)", name)),
    }
}

fn render_conversations(state: &ChatState) {
    if state.conversations.is_empty() {
        println!("(no conversations)");
        return;
    }
    for conversation in &state.conversations {
        let marker = if state.current_id.as_deref() == Some(conversation.id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{} {}  {}  {}",
            marker,
            conversation.id,
            conversation.title,
            conversation.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}

fn render_messages(state: &ChatState) {
    for message in &state.messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M"),
            who,
            message.content
        );
    }
}

/// Returns false when the shell should exit
async fn handle(app: &App, command: Command) -> bool {
    let needs_session = !matches!(
        command,
        Command::Signup { .. } | Command::Login { .. } | Command::Help | Command::Quit
    );
    if needs_session && !app.auth.is_authenticated().await {
        println!("Please /login or /signup first.");
        return true;
    }

    match command {
        Command::Signup { username, password } => {
            if app.auth.signup(&username, &password).await.is_ok() {
                render_conversations(&snapshot_after_list(app).await);
            }
        }
        Command::Login { username, password } => {
            if app.auth.login(&username, &password).await.is_ok() {
                render_conversations(&snapshot_after_list(app).await);
            }
        }
        Command::Logout => app.logout().await,
        Command::List => render_conversations(&snapshot_after_list(app).await),
        Command::New => {
            if let Ok(conversation) = app.chat.create_conversation().await {
                println!("Started {} ({})", conversation.title, conversation.id);
            }
        }
        Command::Open(id) => {
            app.chat.select_conversation(&id).await;
            render_messages(&app.chat.snapshot().await);
        }
        Command::Delete(id) => {
            app.chat.delete_conversation(&id).await;
            render_conversations(&app.chat.snapshot().await);
        }
        Command::Send(content) => {
            let before = app.chat.messages().await.len();
            if let Err(e) = app.chat.send_message(&content).await {
                println!("{}", e);
                return true;
            }
            let mut state = app.chat.snapshot().await;
            let seen = before.min(state.messages.len());
            state.messages.drain(..seen);
            render_messages(&state);
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

async fn snapshot_after_list(app: &App) -> ChatState {
    app.chat.list_conversations().await;
    app.chat.snapshot().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match std::env::var("CHATTER_CONFIG") {
        Ok(path) => Config::from_file(&PathBuf::from(path))?,
        Err(_) => Config::from_env()?,
    };
    tracing::info!("Using {:?} gateway at {}", config.gateway, config.api_url);

    let (notifier, mut notifications) = Notifier::channel();
    let notices = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            let marker = match notification.severity {
                Severity::Info => '*',
                Severity::Error => '!',
            };
            println!("{} {}: {}", marker, notification.title, notification.description);
        }
    });

    let app = App::init(config, notifier).await?;
    if let Some(user) = app.auth.user().await {
        println!("Welcome back, {}!", user.username);
        render_conversations(&snapshot_after_list(&app).await);
    } else {
        println!("Type /help for commands.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(command) => {
                if !handle(&app, command).await {
                    break;
                }
            }
            Err(usage) => println!("{}", usage),
        }
        // Let queued notifications print before the next prompt
        tokio::task::yield_now().await;
    }

    app.shutdown().await?;
    drop(app);
    notices.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            parse_command("  what is 2+2?  "),
            Ok(Command::Send("what is 2+2?".to_string()))
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("/login alice secret1"),
            Ok(Command::Login {
                username: "alice".to_string(),
                password: "secret1".to_string()
            })
        );
        assert_eq!(parse_command("/open conv_1"), Ok(Command::Open("conv_1".to_string())));
        assert_eq!(parse_command("/new"), Ok(Command::New));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_bad_commands() {
        assert!(parse_command("/login alice").unwrap_err().contains("Usage"));
        assert!(parse_command("/delete").unwrap_err().contains("Usage"));
        assert!(parse_command("/teleport").unwrap_err().contains("Unknown command"));
    }
}
