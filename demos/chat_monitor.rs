//! Minimal chat monitor.
//!
//! Logs into Twitch chat anonymously, joins a channel, and prints what
//! happens there. No OAuth token needed — anonymous sessions can read chat
//! but not speak.
//!
//! Usage:
//!   cargo run --example chat_monitor -- --channel sodapoppin

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tmi_sdk::event::Event;
use tmi_sdk::{Session, SystemClock, TlsTransport};

#[derive(Parser)]
#[command(name = "chat-monitor", about = "Watch a Twitch chat channel anonymously")]
struct Args {
    /// Channel to watch (without the leading '#')
    #[arg(long)]
    channel: String,

    /// Also print every raw line exchanged with the server
    #[arg(long)]
    wire: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let session = Session::new();
    session.set_transport_factory(|| Box::new(TlsTransport::twitch()) as _);
    session.set_clock(Arc::new(SystemClock::new()));
    let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    session.set_event_sink(events_tx);

    if args.wire {
        let mut wire = session.subscribe_diagnostics();
        tokio::spawn(async move {
            while let Some(line) = wire.recv().await {
                eprintln!("{line}");
            }
        });
    }

    session.log_in_anonymously();
    println!("Watching #{}. Press Ctrl-C to stop.", args.channel);

    while let Some(event) = events.recv().await {
        match event {
            Event::LoggedIn => {
                println!("* connected");
                session.join(&args.channel);
            }
            Event::LoggedOut => {
                println!("* disconnected");
                break;
            }
            Event::Doom => println!("* server going down, expect a disconnect"),
            Event::Message(message) => {
                if message.is_action {
                    println!("* {} {}", message.user, message.content);
                } else if message.bits > 0 {
                    println!("<{}> [{} bits] {}", message.user, message.bits, message.content);
                } else {
                    println!("<{}> {}", message.user, message.content);
                }
            }
            Event::Join(membership) => println!("* {} joined", membership.user),
            Event::Leave(membership) => println!("* {} left", membership.user),
            Event::Notice(notice) => println!("! {}", notice.message),
            Event::Sub(sub) => println!("* {}", sub.system_message),
            Event::Raid(raid) => {
                println!("* {} is raiding with {} viewers", raid.raider, raid.viewers);
            }
            _ => {}
        }
    }

    Ok(())
}
