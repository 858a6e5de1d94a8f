use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use tracing::{info, warn};

use carelink_core::api::{ClientProvider, ConfiguredResolver};
use carelink_core::auth::claims;
use carelink_core::models::{Role, User};
use carelink_core::{AuthenticatedClient, Config, MessagePoller};

use crate::format::{
    format_date, format_datetime, format_optional, format_remaining, truncate_string,
};

pub const USAGE: &str = "\
Usage: carelink <command> [args]

Commands:
  login [email]              Sign in (prompts for the password)
  logout                     Sign out and forget the stored session
  whoami                     Show the signed-in user and session lifetime
  refresh                    Renew the access token now
  appointments               List your appointments
  records                    List your medical records
  conversations              List your conversations
  messages <conversation>    Show a conversation
  send <conversation> <text> Send a message
  watch <conversation>       Follow a conversation (Ctrl+C to stop)
  help                       Show this help

Environment:
  CARELINK_API_URL     API base URL (skips server discovery)
  CARELINK_TIMEOUT_MS  Request timeout in milliseconds
  CARELINK_STORE       Credential store: file, keyring or memory
  RUST_LOG             Log filter, e.g. carelink_core=debug";

/// Width of message/record text columns
const TEXT_COLUMN_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Logout,
    WhoAmI,
    Refresh,
    Appointments,
    Records,
    Conversations,
    Messages { conversation_id: i64 },
    Send { conversation_id: i64, text: String },
    Watch { conversation_id: i64 },
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };

        let command = match name.as_str() {
            "login" => Command::Login {
                email: rest.first().cloned(),
            },
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "refresh" => Command::Refresh,
            "appointments" => Command::Appointments,
            "records" => Command::Records,
            "conversations" => Command::Conversations,
            "messages" => Command::Messages {
                conversation_id: parse_conversation_id(rest)?,
            },
            "send" => {
                let conversation_id = parse_conversation_id(rest)?;
                let text = rest[1..].join(" ");
                if text.trim().is_empty() {
                    bail!("send needs a message text");
                }
                Command::Send {
                    conversation_id,
                    text,
                }
            }
            "watch" => Command::Watch {
                conversation_id: parse_conversation_id(rest)?,
            },
            "help" | "-h" | "--help" => Command::Help,
            other => bail!("Unknown command '{}'", other),
        };
        Ok(command)
    }
}

fn parse_conversation_id(rest: &[String]) -> Result<i64> {
    let raw = rest
        .first()
        .ok_or_else(|| anyhow::anyhow!("Missing conversation id"))?;
    raw.parse()
        .with_context(|| format!("Invalid conversation id '{}'", raw))
}

pub struct Context {
    pub config: Config,
    pub provider: ClientProvider<ConfiguredResolver>,
}

impl Context {
    async fn client(&self) -> Result<Arc<AuthenticatedClient>> {
        Ok(self.provider.client().await?)
    }

    /// Signed-in user from the cached record.
    fn user(&self) -> Result<User> {
        self.provider
            .session()
            .user()?
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `carelink login` first."))
    }
}

pub async fn run(ctx: &mut Context, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(ctx, email).await,
        Command::Logout => logout(ctx).await,
        Command::WhoAmI => whoami(ctx),
        Command::Refresh => refresh(ctx).await,
        Command::Appointments => appointments(ctx).await,
        Command::Records => records(ctx).await,
        Command::Conversations => conversations(ctx).await,
        Command::Messages { conversation_id } => messages(ctx, conversation_id).await,
        Command::Send {
            conversation_id,
            text,
        } => send(ctx, conversation_id, &text).await,
        Command::Watch { conversation_id } => watch(ctx, conversation_id).await,
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

async fn login(ctx: &mut Context, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(ctx.config.last_email.as_deref())?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    let client = ctx.client().await?;
    println!("\nAuthenticating...");
    let login = client.login(&email, &password).await?;

    ctx.config.last_email = Some(email);
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!(
        "Logged in as {} ({})",
        login.user.display_name(),
        login.user.role
    );
    Ok(())
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), last_email) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

async fn logout(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    client.logout().await?;
    println!("Logged out.");
    Ok(())
}

fn whoami(ctx: &Context) -> Result<()> {
    let session = ctx.provider.session();
    let user = ctx.user()?;

    println!("{} <{}>", user.display_name(), user.email);
    println!("Role:    {}", user.role);

    match session.access_token()? {
        Some(token) => {
            let remaining = claims::minutes_until_expiry(&token, Utc::now())
                .map(format_remaining)
                .unwrap_or_else(|| "unknown expiry".to_string());
            println!("Session: active ({})", remaining);
        }
        None => println!("Session: none"),
    }
    Ok(())
}

async fn refresh(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    client.refresh_session().await?;
    info!("Session refreshed from CLI");
    println!("Session refreshed.");
    Ok(())
}

async fn appointments(ctx: &Context) -> Result<()> {
    let role = ctx.user().map(|u| u.role).unwrap_or(Role::Patient);
    let client = ctx.client().await?;
    let appointments = client.fetch_appointments(role).await?;

    if appointments.is_empty() {
        println!("No appointments.");
        return Ok(());
    }

    let now = Utc::now();
    for appt in &appointments {
        let marker = if appt.is_upcoming(now) { "*" } else { " " };
        println!(
            "{} #{:<5} {:<20} {:<10} {}",
            marker,
            appt.id,
            format_datetime(&appt.date_time),
            appt.status.label(),
            truncate_string(&format_optional(&appt.reason, "-"), TEXT_COLUMN_WIDTH)
        );
    }
    Ok(())
}

async fn records(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    let records = client.fetch_records().await?;

    if records.is_empty() {
        println!("No medical records.");
        return Ok(());
    }

    for record in &records {
        println!(
            "#{:<5} {:<13} {}",
            record.id,
            format_date(&record.created_at),
            truncate_string(&record.summary(), TEXT_COLUMN_WIDTH)
        );
    }
    Ok(())
}

async fn conversations(ctx: &Context) -> Result<()> {
    let client = ctx.client().await?;
    let conversations = client.fetch_conversations().await?;

    if conversations.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for conv in &conversations {
        let unread = match conv.unread_count {
            0 => String::new(),
            n => format!(" ({} unread)", n),
        };
        println!(
            "#{:<5} {}{}",
            conv.id,
            format_optional(&conv.participant_name, "Unknown"),
            unread
        );
        if let Some(ref last) = conv.last_message {
            println!("       {}", truncate_string(last, TEXT_COLUMN_WIDTH));
        }
    }
    Ok(())
}

fn print_message(message: &carelink_core::models::Message, own_id: Option<i64>) {
    let who = if Some(message.sender_id) == own_id {
        "you".to_string()
    } else {
        format!("#{}", message.sender_id)
    };
    println!(
        "[{}] {:>5}: {}",
        format_datetime(&message.created_at),
        who,
        message.content
    );
}

async fn messages(ctx: &Context, conversation_id: i64) -> Result<()> {
    let own_id = ctx.user().ok().map(|u| u.id);
    let client = ctx.client().await?;
    let messages = client.fetch_messages(conversation_id).await?;

    if messages.is_empty() {
        println!("No messages yet.");
    }
    for message in &messages {
        print_message(message, own_id);
    }
    Ok(())
}

async fn send(ctx: &Context, conversation_id: i64, text: &str) -> Result<()> {
    let own_id = ctx.user().ok().map(|u| u.id);
    let client = ctx.client().await?;
    let message = client.send_message(conversation_id, text).await?;
    print_message(&message, own_id);
    Ok(())
}

async fn watch(ctx: &Context, conversation_id: i64) -> Result<()> {
    let own_id = ctx.user().ok().map(|u| u.id);
    let client = ctx.client().await?;
    let poller = MessagePoller::new(client, conversation_id, ctx.config.poll_interval());

    eprintln!(
        "Watching conversation #{} every {}s (Ctrl+C to stop)",
        conversation_id,
        ctx.config.poll_interval().as_secs()
    );

    tokio::select! {
        result = poller.run(|messages| {
            for message in &messages {
                print_message(message, own_id);
            }
        }) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Stopped.");
        }
    }
    Ok(())
}
