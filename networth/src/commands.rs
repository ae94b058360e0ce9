//! Line oriented commands understood by the interactive shell.
//!
//! Every command is described by one [`CommandSpec`] entry: its name, the
//! exact number of positional arguments it takes and the help texts. Parsing
//! a line looks the name up in [`COMMANDS`], checks the arity and builds an
//! [`Invocation`] for the caller to execute.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    AddUser {
        username: String,
    },
    AddAsset {
        username: String,
        asset: String,
        value: String,
    },
    GetNetWorth {
        username: String,
    },
    ListUsers,
    Backup,
    Help,
    Exit,
}

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: usize,
    pub usage: &'static str,
    pub description: &'static str,
    pub example: &'static str,
    build: fn(Vec<String>) -> Invocation,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "add_user",
        arity: 1,
        usage: "add_user <username>",
        description: "Adds a new user to the system.",
        example: "add_user john",
        build: add_user,
    },
    CommandSpec {
        name: "add_asset",
        arity: 3,
        usage: "add_asset <username> <asset_name> <value>",
        description: "Records the current value of an asset for a user.",
        example: "add_asset john savings 5000",
        build: add_asset,
    },
    CommandSpec {
        name: "get_networth",
        arity: 1,
        usage: "get_networth <username>",
        description: "Calculates and displays the net worth of a user.",
        example: "get_networth john",
        build: get_networth,
    },
    CommandSpec {
        name: "list_users",
        arity: 0,
        usage: "list_users",
        description: "Displays a list of all users in the system.",
        example: "list_users",
        build: list_users,
    },
    CommandSpec {
        name: "backup",
        arity: 0,
        usage: "backup",
        description: "Copies both tables into a timestamped backup directory.",
        example: "backup",
        build: backup,
    },
    CommandSpec {
        name: "help",
        arity: 0,
        usage: "help",
        description: "Displays this help message.",
        example: "help",
        build: help,
    },
    CommandSpec {
        name: "exit",
        arity: 0,
        usage: "exit",
        description: "Exits the application.",
        example: "exit",
        build: exit,
    },
];

fn add_user(args: Vec<String>) -> Invocation {
    let mut args = args.into_iter();
    Invocation::AddUser {
        username: args.next().unwrap_or_default(),
    }
}

fn add_asset(args: Vec<String>) -> Invocation {
    let mut args = args.into_iter();
    Invocation::AddAsset {
        username: args.next().unwrap_or_default(),
        asset: args.next().unwrap_or_default(),
        value: args.next().unwrap_or_default(),
    }
}

fn get_networth(args: Vec<String>) -> Invocation {
    let mut args = args.into_iter();
    Invocation::GetNetWorth {
        username: args.next().unwrap_or_default(),
    }
}

fn list_users(_: Vec<String>) -> Invocation {
    Invocation::ListUsers
}

fn backup(_: Vec<String>) -> Invocation {
    Invocation::Backup
}

fn help(_: Vec<String>) -> Invocation {
    Invocation::Help
}

fn exit(_: Vec<String>) -> Invocation {
    Invocation::Exit
}

pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Splits `line` on whitespace and matches it against the command table.
pub fn parse(line: &str) -> Result<Invocation, ParseError> {
    let mut parts = line.split_whitespace();
    let name = parts.next().ok_or(ParseError::Empty)?;
    let spec = find(name).ok_or_else(|| ParseError::UnknownCommand(name.to_string()))?;

    let args = parts.map(str::to_string).collect::<Vec<_>>();
    if args.len() != spec.arity {
        return Err(ParseError::Usage(spec));
    }

    Ok((spec.build)(args))
}

pub fn help_text() -> String {
    let mut help = String::from("Net Worth Tracker CLI - Available Commands:\n");
    for spec in COMMANDS {
        help.push_str(&format!(
            "\n{}\n   {}\n   Example: {}\n",
            spec.usage, spec.description, spec.example
        ));
    }
    help
}

#[derive(Debug)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    Usage(&'static CommandSpec),
}

impl std::error::Error for ParseError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "No command given. Type 'help' for correct usage."),
            ParseError::UnknownCommand(name) => {
                write!(f, "Unknown command '{}'. Type 'help' for correct usage.", name)
            }
            ParseError::Usage(spec) => write!(
                f,
                "Invalid usage of '{}', expected: {}. Type 'help' for correct usage.",
                spec.name, spec.usage
            ),
        }
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
