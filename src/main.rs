use anyhow::Result;
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

mod transcript;
mod ui;
mod utils;

use chatline::config::load_config;
use chatline::imdn::LocalImdn;
use chatline::{bucketize, DeliveryHub, MessageId, SelectionController, Timeline};

use crate::transcript::{contact_book, history_events, Transcript};

/// Command line arguments for chatline
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatline: render a chat transcript as a grouped timeline with read receipts.",
    long_about = "chatline loads a JSON conversation transcript, replays its delivery notifications, \
    and prints the timeline with same-sender bubbles merged.\n\n\
    Set CHATLINE_SAME_SENDER_SPACING=0 to turn bubble merging off."
)]
struct Args {
    /// JSON transcript with history, contacts and delivery notifications
    #[arg(value_name = "TRANSCRIPT")]
    transcript: PathBuf,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the receipt breakdown of this message
    #[arg(long, value_name = "MESSAGE_ID")]
    receipts: Option<MessageId>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Render every bubble on its own
    #[arg(long)]
    no_grouping: bool,

    /// Delete these display rows (0 = most recent) before rendering
    #[arg(long, value_delimiter = ',', value_name = "ROWS")]
    delete: Vec<usize>,

    /// Render width in columns
    #[arg(long, default_value_t = 60)]
    width: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Installed before the config is read so its load messages are kept
    utils::setup_logging(args.log_file.as_deref().and_then(|p| p.to_str()), LevelFilter::Info)?;

    let mut config = load_config(args.config.as_deref())?;
    if let Ok(value) = env::var("CHATLINE_SAME_SENDER_SPACING") {
        match utils::parse_flag(&value) {
            Some(enabled) => config.same_sender_spacing_enabled = enabled,
            None => warn!("Ignoring invalid CHATLINE_SAME_SENDER_SPACING value '{}'", value),
        }
    }
    if args.no_grouping {
        config.same_sender_spacing_enabled = false;
    }

    let level = LevelFilter::from_str(&config.log_level).unwrap_or_else(|_| {
        warn!("Unknown log level '{}', using info", config.log_level);
        LevelFilter::Info
    });
    log::set_max_level(level);
    info!("Same-sender grouping enabled: {}", config.same_sender_spacing_enabled);

    let Transcript {
        contacts,
        history,
        notifications,
    } = Transcript::load(&args.transcript)?;
    let contacts = contact_book(&contacts);

    let (hub, mut pump) = DeliveryHub::new();
    let mut timeline = Timeline::from_history(history_events(history)?, Some(hub.clone()));
    info!("Timeline holds {} entries", timeline.size());

    // The delivery layer publishes from its own task; results are applied here
    let publisher = tokio::spawn(async move {
        notifications
            .into_iter()
            .filter(|notification| hub.publish(notification.clone()))
            .count()
    });
    let forwarded = publisher.await?;
    let applied = timeline.pump(&mut pump);
    info!("Applied {} of {} forwarded notifications", applied, forwarded);

    if !args.delete.is_empty() {
        let mut selection = SelectionController::new();
        selection.enter_editing();
        for &row in &args.delete {
            if !selection.is_selected(row) {
                selection.toggle(row);
            }
        }
        let removed = timeline.remove_many(&selection.selected_indices())?;
        selection.exit_editing();
        info!("Deleted {} rows", removed.len());
    }

    for line in ui::render_timeline(&timeline, &config, &contacts, args.width)? {
        println!("{}", line);
    }

    if let Some(message_id) = args.receipts {
        let message = timeline
            .position_of(message_id)
            .and_then(|index| timeline.at(index).ok())
            .and_then(|event| event.chat_message());
        match message {
            Some(message) => {
                println!();
                let breakdown = bucketize(message, &LocalImdn, &contacts);
                for line in ui::render_receipts(&breakdown, &config.date_format) {
                    println!("{}", line);
                }
            }
            None => warn!("Message {} is not in the timeline", message_id),
        }
    }

    Ok(())
}
