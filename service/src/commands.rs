//! Chat commands: parsing through the [`COMMANDS`] table, execution, and reply rendering.

use spinledger_types::casino::{PlayerStats, SpinResult};
use spinledger_types::Transaction;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::error::{format_amount, LedgerError, SpinError};
use crate::slots::CallContext;
use crate::Service;

/// Leading characters accepted before a command name (`!slots`, `/slots`).
const COMMAND_PREFIXES: [char; 2] = ['!', '/'];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Slots,
    SlotStats,
    Balance,
    History,
    Transfer { to: String, amount: i64 },
    Help,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// One registered command: the names it answers to and how to build it from arguments.
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
    build: fn(&[&str]) -> Result<Command, CommandError>,
}

impl CommandSpec {
    fn matches(&self, word: &str) -> bool {
        self.name == word || self.aliases.contains(&word)
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "slots",
        aliases: &["spin", "slot"],
        usage: "slots",
        summary: "spin the slot machine",
        build: |args| no_args(args, Command::Slots, "slots"),
    },
    CommandSpec {
        name: "slotstats",
        aliases: &["stats"],
        usage: "slotstats",
        summary: "your slot statistics",
        build: |args| no_args(args, Command::SlotStats, "slotstats"),
    },
    CommandSpec {
        name: "balance",
        aliases: &["bal"],
        usage: "balance",
        summary: "your current balance",
        build: |args| no_args(args, Command::Balance, "balance"),
    },
    CommandSpec {
        name: "history",
        aliases: &["tx"],
        usage: "history",
        summary: "your recent transactions",
        build: |args| no_args(args, Command::History, "history"),
    },
    CommandSpec {
        name: "transfer",
        aliases: &["give", "send"],
        usage: "transfer <user> <amount>",
        summary: "send balance to another user",
        build: build_transfer,
    },
    CommandSpec {
        name: "help",
        aliases: &["commands"],
        usage: "help",
        summary: "list commands",
        build: |_| Ok(Command::Help),
    },
];

fn no_args(args: &[&str], command: Command, usage: &'static str) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::Usage(usage))
    }
}

fn build_transfer(args: &[&str]) -> Result<Command, CommandError> {
    const USAGE: &str = "transfer <user> <amount>";
    match args {
        [to, amount] => {
            let amount = amount.parse().map_err(|_| CommandError::Usage(USAGE))?;
            Ok(Command::Transfer {
                to: to.trim_start_matches('@').to_string(),
                amount,
            })
        }
        _ => Err(CommandError::Usage(USAGE)),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut words = text.split_whitespace();
        let head = words.next().ok_or(CommandError::Empty)?;
        let name = head.trim_start_matches(COMMAND_PREFIXES).to_lowercase();
        if name.is_empty() {
            return Err(CommandError::Empty);
        }
        let args: Vec<&str> = words.collect();
        let spec = COMMANDS
            .iter()
            .find(|spec| spec.matches(&name))
            .ok_or(CommandError::Unknown(name))?;
        (spec.build)(&args)
    }
}

/// Parses and runs `text` for `user`, returning the reply to show.
///
/// Unknown users are registered first, so a player's first message always works.
pub fn handle(service: &Service, user: &str, text: &str, ctx: &CallContext) -> String {
    match text.parse::<Command>() {
        Ok(command) => dispatch(service, user, &command, ctx),
        Err(CommandError::Usage(usage)) => format!("❌ Usage: {usage}"),
        Err(CommandError::Unknown(name)) => {
            format!("❌ Unknown command: {name}. Try help")
        }
        Err(CommandError::Empty) => render_help(),
    }
}

pub fn dispatch(service: &Service, user: &str, command: &Command, ctx: &CallContext) -> String {
    if let Err(err) = service.ledger().register(user) {
        return render_ledger_error(&err);
    }
    match command {
        Command::Slots => match service.slots().play_slot(user, ctx) {
            Ok(result) => render_spin(&result),
            Err(err) => render_spin_error(&err),
        },
        Command::SlotStats => match service.stats().get(user) {
            Ok(Some(stats)) if stats.total_spins > 0 => render_stats(&stats),
            Ok(_) => "📊 No slot stats yet. Play your first spin!".to_string(),
            Err(err) => render_ledger_error(&LedgerError::Storage(err)),
        },
        Command::Balance => match service.ledger().balance(user) {
            Ok(balance) => format!("💰 Balance: {}", format_amount(balance)),
            Err(err) => render_ledger_error(&err),
        },
        Command::History => {
            let limit = service.config().history_capacity();
            match service.ledger().history(user, limit) {
                Ok(history) => render_history(user, &history),
                Err(err) => render_ledger_error(&err),
            }
        }
        Command::Transfer { to, amount } => {
            match service.ledger().transfer(user, to, *amount) {
                Ok(balances) => {
                    service.metrics().inc_transfer();
                    format!(
                        "✅ Sent {} to {to}\n💰 Balance: {}",
                        format_amount(*amount),
                        format_amount(balances.from_balance)
                    )
                }
                Err(err) => render_ledger_error(&err),
            }
        }
        Command::Help => render_help(),
    }
}

pub fn render_spin(result: &SpinResult) -> String {
    let mut reply = String::from("🎰 SLOTS 🎰\n\n");
    let _ = writeln!(reply, "{}", result.grid);

    if !result.win_lines.is_empty() {
        reply.push('\n');
        for win in &result.win_lines {
            let _ = writeln!(
                reply,
                "✅ Line {}: {}x {} → {}",
                win.line_index + 1,
                win.run_length,
                win.symbol,
                format_amount(win.payout)
            );
        }
    }

    if result.bonus_count >= 3 {
        let _ = write!(
            reply,
            "\n🎰 Scatter bonus! {} scatters → +{}",
            result.bonus_count,
            format_amount(result.bonus_credit)
        );
        if result.free_spins_awarded > 0 {
            let _ = write!(reply, " + {} free spins!", result.free_spins_awarded);
        }
        reply.push('\n');
    }

    for (index, round) in result.free_spin_rounds.iter().enumerate() {
        let _ = writeln!(
            reply,
            "🎁 Free spin {}: +{}",
            index + 1,
            format_amount(round.payout())
        );
    }

    reply.push('\n');
    if result.is_win {
        let _ = writeln!(reply, "💰 Payout: {}", format_amount(result.total_payout));
    } else {
        reply.push_str("💸 No win\n");
    }
    let _ = write!(reply, "📊 Balance: {}", format_amount(result.balance_after));
    reply
}

pub fn render_stats(stats: &PlayerStats) -> String {
    let net = stats.net_profit();
    let sign = if net > 0 { "+" } else { "" };
    format!(
        "📊 SLOT STATS\n\n\
         Total spins: {}\n\
         Wagered: {}\n\
         Won: {}\n\
         Net profit: {sign}{}\n\n\
         💎 Biggest win: {}\n\
         📈 Your RTP: {:.2}%",
        stats.total_spins,
        format_amount(stats.total_wagered),
        format_amount(stats.total_won),
        format_amount(net),
        format_amount(stats.biggest_win),
        stats.current_rtp,
    )
}

pub fn render_history(user: &str, history: &[Transaction]) -> String {
    if history.is_empty() {
        return "📜 No transactions yet.".to_string();
    }
    let mut reply = String::from("📜 Recent transactions:");
    for tx in history {
        let delta = tx.delta_for(user);
        let sign = if delta >= 0 { "+" } else { "" };
        let _ = write!(
            reply,
            "\n{sign}{} {} ({})",
            format_amount(delta),
            tx.kind,
            tx.description
        );
    }
    reply
}

fn render_help() -> String {
    let mut reply = String::from("📖 Commands:");
    for spec in COMMANDS {
        let _ = write!(reply, "\n!{} - {}", spec.usage, spec.summary);
    }
    reply
}

fn render_spin_error(err: &SpinError) -> String {
    match err {
        SpinError::Ledger(LedgerError::InsufficientFunds { needed, available }) => format!(
            "❌ Not enough balance! Bet: {}, balance: {}",
            format_amount(*needed),
            format_amount(*available)
        ),
        other => format!("❌ {}", other.user_message()),
    }
}

fn render_ledger_error(err: &LedgerError) -> String {
    format!("❌ {}", err.user_message())
}
