// src/bingo_operator.rs
// Operator console: one command per invocation against a draw session.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use bingosys::client::OperatorClient;
use bingosys::config::{OperatorConfig, OPERATOR_CONFIG_PATH};
use bingosys::defs::{Number, PrizeId};
use bingosys::session::{SessionSnapshot, WinnerNotice};

#[derive(Parser)]
#[command(name = env!("CARGO_BIN_NAME"))]
#[command(about = "Bingo Operator - Draw balls, sell tickets and close prizes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = OPERATOR_CONFIG_PATH)]
    config: PathBuf,

    /// Server URL, e.g. http://127.0.0.1:3000
    #[arg(long)]
    server: Option<String>,

    /// Session to operate on
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the drawn balls, winners and near-winners
    Status,
    /// Draw a ball
    Draw {
        number: Option<Number>,
        /// Pick a random ball from those left
        #[arg(long, conflicts_with = "number")]
        random: bool,
    },
    /// Cancel the last ball
    Undo,
    /// Clear the balls and results, keeping sales and prizes
    Newgame,
    /// Register a sold ticket by barcode
    Register { barcode: String },
    /// Register random unsold tickets
    Random { count: usize },
    /// Close a prize
    Realize { prize_id: PrizeId },
    /// Reopen a closed prize
    Reopen { prize_id: PrizeId },
    /// List the sessions on the server
    Sessions,
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!("Session: {} ({})", snapshot.session_id, snapshot.name);
    println!(
        "Drawn {} of {} | last: {} | registered tickets: {}",
        snapshot.drawn_numbers.len(),
        snapshot.max_balls,
        snapshot.last_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
        snapshot.registered_count
    );
    let drawn: Vec<String> = snapshot.drawn_numbers.iter().map(|n| format!("{n:2}")).collect();
    println!("Balls: {}", drawn.join(" "));

    for prize in &snapshot.prizes {
        let status = if prize.realized {
            "realized"
        } else if prize.in_turn {
            "in play"
        } else if !prize.active {
            "inactive"
        } else {
            "waiting"
        };
        println!("\n[{}] {} ({}) - {status}", prize.id, prize.name, prize.kind);
        if !prize.winners.is_empty() {
            println!("   Winners: {}", prize.winners.join(", "));
        }
        if !prize.near_winners.is_empty() {
            println!("   One away: {}", prize.near_winners.join(", "));
        }
    }

    if !snapshot.legacy.winners.is_empty() {
        println!("\nFull cards: {}", snapshot.legacy.winners.join(", "));
    }
    for (missing, barcodes) in &snapshot.legacy.near_wins {
        if !barcodes.is_empty() {
            println!("Missing {missing}: {}", barcodes.join(", "));
        }
    }
}

fn print_winners(winners: &[WinnerNotice]) {
    for winner in winners {
        println!("BINGO! {} won by ticket {}", winner.prize_name, winner.barcode);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = OperatorConfig::load_or_default(&args.config);
    if let Some(session) = args.session {
        config.session = session;
    }
    let client = match &args.server {
        Some(url) => OperatorClient::new(url, &config.session, config.timeout)?,
        None => OperatorClient::from_config(&config)?,
    };

    match args.command {
        Command::Status => print_snapshot(&client.status().await?),
        Command::Draw { number, random } => {
            let reply = match (number, random) {
                (Some(n), false) => client.draw(n).await?,
                (None, true) => client.draw_random().await?,
                _ => return Err("Give a ball number or --random".into()),
            };
            println!("Number {} drawn.", reply.number);
            print_winners(&reply.new_winners);
            print_snapshot(&reply.snapshot);
        }
        Command::Undo => {
            let reply = client.undo().await?;
            println!("Number {} cancelled.", reply.cancelled);
            print_snapshot(&reply.snapshot);
        }
        Command::Newgame => {
            let reply = client.new_game().await?;
            println!("New game started.");
            print_snapshot(&reply.snapshot);
        }
        Command::Register { barcode } => {
            let reply = client.register(&barcode).await?;
            if reply.registered {
                println!("Ticket {} registered.", reply.barcode);
            } else {
                println!("Ticket {} was already registered.", reply.barcode);
            }
        }
        Command::Random { count } => {
            let reply = client.register_random(count).await?;
            println!("{} tickets registered: {}", reply.registered.len(), reply.registered.join(", "));
            println!("Registered tickets in session: {}", reply.snapshot.registered_count);
        }
        Command::Realize { prize_id } => {
            let reply = client.set_prize_status(prize_id, true).await?;
            println!("Prize {prize_id} realized.");
            print_snapshot(&reply.snapshot);
        }
        Command::Reopen { prize_id } => {
            let reply = client.set_prize_status(prize_id, false).await?;
            println!("Prize {prize_id} reopened.");
            print_snapshot(&reply.snapshot);
        }
        Command::Sessions => {
            for summary in client.list_sessions().await? {
                println!("{}\t{}\t{} balls\tcreated {}", summary.id, summary.name, summary.drawn_count, summary.created_at);
            }
        }
    }

    Ok(())
}
