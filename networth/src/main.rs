extern crate dotenv;
#[macro_use]
extern crate log;
extern crate networth;
#[macro_use]
extern crate prettytable;
extern crate structopt;

use networth::commands::{self, Invocation, ParseError};
use networth::{CsvStorage, Ledger, LedgerCfg, NetWorth, UserListing};
use rust_decimal::Decimal;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "networth", about = "track asset values and compute net worth")]
struct Options {
    #[structopt(subcommand)]
    command: Option<Commands>,
    #[structopt(
        short = "d",
        long = "data-dir",
        parse(from_os_str),
        help = "directory holding the users and assets tables (env: NETWORTH_DATA_DIR)"
    )]
    data_dir: Option<PathBuf>,
    #[structopt(
        short = "r",
        long = "require-registered-user",
        help = "only record assets for registered users (env: NETWORTH_REQUIRE_REGISTERED_USER)"
    )]
    require_registered_user: bool,
}

#[derive(StructOpt)]
enum Commands {
    #[structopt(name = "add-user", about = "register a new user")]
    AddUser { username: String },
    #[structopt(name = "add-asset", about = "record today's value of an asset")]
    AddAsset {
        username: String,
        asset: String,
        #[structopt(allow_hyphen_values = true)]
        value: String,
    },
    #[structopt(name = "get-networth", about = "sum the latest value of every asset of a user")]
    GetNetworth {
        username: String,
        #[structopt(short = "b", long = "breakdown", help = "show the value of every asset")]
        breakdown: bool,
    },
    #[structopt(name = "list-users", about = "list all registered users")]
    ListUsers,
    #[structopt(name = "backup", about = "copy both tables into a timestamped directory")]
    Backup {
        #[structopt(
            long = "to",
            parse(from_os_str),
            help = "backup directory (default: <data-dir>/backups)"
        )]
        to: Option<PathBuf>,
    },
}

enum Flow {
    Continue,
    Exit,
}

fn main() {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let options = Options::from_args();

    let mut cfg = LedgerCfg::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        exit(1);
    });
    if let Some(data_dir) = options.data_dir {
        cfg.data_dir = data_dir;
    }
    cfg.require_registered_user |= options.require_registered_user;

    let storage = CsvStorage::open(&cfg.data_dir).unwrap_or_else(|e| {
        eprintln!("Could not open tables in {}: {}", cfg.data_dir.display(), e);
        exit(1);
    });
    let mut ledger = Ledger::new(storage, &cfg);

    match options.command {
        Some(Commands::AddUser { username }) => {
            one_shot(&mut ledger, Invocation::AddUser { username }, false, None)
        }
        Some(Commands::AddAsset {
            username,
            asset,
            value,
        }) => one_shot(
            &mut ledger,
            Invocation::AddAsset {
                username,
                asset,
                value,
            },
            false,
            None,
        ),
        Some(Commands::GetNetworth {
            username,
            breakdown,
        }) => one_shot(
            &mut ledger,
            Invocation::GetNetWorth { username },
            breakdown,
            None,
        ),
        Some(Commands::ListUsers) => one_shot(&mut ledger, Invocation::ListUsers, false, None),
        Some(Commands::Backup { to }) => one_shot(&mut ledger, Invocation::Backup, false, to),
        None => shell(&mut ledger),
    }
}

fn one_shot(
    ledger: &mut Ledger<CsvStorage>,
    invocation: Invocation,
    breakdown: bool,
    backup_dir: Option<PathBuf>,
) {
    if let Err(e) = execute(ledger, invocation, breakdown, backup_dir) {
        eprintln!("Error: {}", e);
        exit(1);
    }
}

fn shell(ledger: &mut Ledger<CsvStorage>) {
    println!("Welcome to the Net Worth Tracker CLI!");
    println!("{}", commands::help_text());

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Enter command (or 'exit' to quit, or 'help' to list the API): ");
        std::io::stdout().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                error!("Could not read command: {}", e);
                break;
            }
            None => {
                println!();
                break;
            }
        };

        match commands::parse(&line) {
            Ok(invocation) => match execute(ledger, invocation, false, None) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => println!("Error: {}", e),
            },
            Err(ParseError::Empty) => {}
            Err(e) => println!("{}", e),
        }
    }

    println!("Thank you for using Net Worth Tracker CLI. Goodbye!");
}

fn execute(
    ledger: &mut Ledger<CsvStorage>,
    invocation: Invocation,
    breakdown: bool,
    backup_dir: Option<PathBuf>,
) -> Result<Flow, networth::Error> {
    match invocation {
        Invocation::AddUser { username } => {
            let user = ledger.register_user(&username)?;
            println!("User {} added successfully.", user.username);
        }
        Invocation::AddAsset {
            username,
            asset,
            value,
        } => {
            let record = ledger.record_asset(&username, &asset, &value)?;
            println!("Asset {} added for user {}.", record.asset, record.username);
        }
        Invocation::GetNetWorth { username } => {
            let net_worth = ledger.compute_net_worth(&username)?;
            print_net_worth(&net_worth, breakdown);
        }
        Invocation::ListUsers => match ledger.list_users()? {
            UserListing::NoUsers => println!("No users found."),
            UserListing::Users(users) => {
                let mut table = prettytable::Table::new();
                table.set_titles(row!["Id", "Username"]);
                for user in users {
                    table.add_row(row![r -> user.id, user.username]);
                }
                table.set_format(*prettytable::format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
                table.printstd();
            }
        },
        Invocation::Backup => {
            let dest = backup_dir.unwrap_or_else(|| ledger.storage().dir().join("backups"));
            let target = ledger
                .storage()
                .backup(&dest, chrono::Local::now().naive_local())?;
            println!("Tables backed up to {}.", target.display());
        }
        Invocation::Help => println!("{}", commands::help_text()),
        Invocation::Exit => return Ok(Flow::Exit),
    }

    Ok(Flow::Continue)
}

fn print_net_worth(net_worth: &NetWorth, breakdown: bool) {
    if breakdown && !net_worth.holdings.is_empty() {
        let mut table = prettytable::Table::new();
        table.set_titles(row!["Asset", "Value", "Date"]);
        for record in &net_worth.holdings {
            table.add_row(row![
                record.asset,
                r -> format_money(record.value),
                record.date,
            ]);
        }
        table.add_empty_row();
        table.add_row(row!(b -> "Sum", br -> format_money(net_worth.total), ""));
        table.set_format(*prettytable::format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.printstd();
    }

    println!(
        "Networth of {} on {} is ${}",
        net_worth.username,
        net_worth.as_of.format("%Y-%m-%d"),
        format_money(net_worth.total)
    );
}

fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let base = format!("{:.2}", rounded.abs());
    let (integer, fraction) = base.split_at(base.len() - 3);

    let mut money = String::new();
    if rounded.is_sign_negative() && !rounded.is_zero() {
        money.push('-');
    }
    for (idx, digit) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            money.push(',');
        }
        money.push(digit);
    }
    money.push_str(fraction);

    money
}
