//! Command-line demo and status viewer for the tag-based rendezvous service (§4.7).
//!
//! Grounded on the teacher's `clap`-derived harness binary
//! (`frankenlibc-harness/src/bin/harness.rs`) for subcommand structure, and on
//! `r3dlight-couic/couic-report/src/main.rs` for the `tracing_subscriber::fmt::init()` +
//! `clap::Parser` startup sequence.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use tagipc_core::{CancellationToken, Config, Service, TagError};

/// Demo and status viewer for the tag rendezvous service.
#[derive(Debug, Parser)]
#[command(name = "tagipc")]
#[command(about = "Tag-based rendezvous message-passing demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a tag and print its descriptor.
    Create {
        /// Tag key (use -1 for a private tag).
        key: i32,
        /// Owner uid (use -1 for "any").
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Open an existing tag by key and print its descriptor.
    Open {
        key: i32,
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Publish a message on `(desc, level)`.
    Send {
        desc: i32,
        level: i32,
        message: String,
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Block waiting for a message on `(desc, level)`, then print it.
    Receive {
        desc: i32,
        level: i32,
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Wake every receiver currently blocked on a tag.
    AwakeAll {
        desc: i32,
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Remove a tag. Fails with Busy if any receiver is still blocked on it.
    Remove {
        desc: i32,
        #[arg(default_value_t = -1)]
        uid: i32,
    },
    /// Print the fixed-width registry snapshot.
    Status,
    /// Run an interactive loop over the subcommands above, keeping one registry alive so the
    /// broadcast scenarios of §8 can be demonstrated within a single process.
    Repl,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let service = Arc::new(Service::new(Config::default()));

    match cli.command {
        Command::Repl => run_repl(service),
        other => run_one(&service, other),
    }
}

fn run_one(service: &Service, command: Command) {
    match dispatch(service, command) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run_repl(service: Arc<Service>) {
    println!("tagipc repl — one command per line, e.g.:");
    println!("  create 7 1000");
    println!("  open 7 -1");
    println!("  send 0 1 hello -1");
    println!("  receive 0 1 -1   (spawns a blocking thread, prints when it returns)");
    println!("  awake-all 0 -1");
    println!("  remove 0 -1");
    println!("  status");
    println!("  quit");

    let stdin = io::stdin();
    let mut handles = Vec::new();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let args: Vec<&str> = line.split_whitespace().collect();
        let parsed = match parse_repl_line(&args) {
            Ok(cmd) => cmd,
            Err(msg) => {
                eprintln!("error: {msg}");
                continue;
            }
        };

        if matches!(parsed, Command::Receive { .. }) {
            let service = service.clone();
            handles.push(thread::spawn(move || {
                let result = dispatch(&service, parsed);
                match result {
                    Ok(line) => println!("[receive] {line}"),
                    Err(err) => println!("[receive] error: {err}"),
                }
            }));
            continue;
        }

        run_one(&service, parsed);
        io::stdout().flush().ok();
    }

    for handle in handles {
        let _ = handle.join();
    }
}

fn parse_repl_line(args: &[&str]) -> Result<Command, String> {
    let parse_i32 = |s: &str| s.parse::<i32>().map_err(|e| e.to_string());
    match args {
        ["create", key] => Ok(Command::Create { key: parse_i32(key)?, uid: -1 }),
        ["create", key, uid] => Ok(Command::Create { key: parse_i32(key)?, uid: parse_i32(uid)? }),
        ["open", key] => Ok(Command::Open { key: parse_i32(key)?, uid: -1 }),
        ["open", key, uid] => Ok(Command::Open { key: parse_i32(key)?, uid: parse_i32(uid)? }),
        ["send", desc, level, message] => Ok(Command::Send {
            desc: parse_i32(desc)?,
            level: parse_i32(level)?,
            message: message.to_string(),
            uid: -1,
        }),
        ["send", desc, level, message, uid] => Ok(Command::Send {
            desc: parse_i32(desc)?,
            level: parse_i32(level)?,
            message: message.to_string(),
            uid: parse_i32(uid)?,
        }),
        ["receive", desc, level] => Ok(Command::Receive { desc: parse_i32(desc)?, level: parse_i32(level)?, uid: -1 }),
        ["receive", desc, level, uid] => Ok(Command::Receive {
            desc: parse_i32(desc)?,
            level: parse_i32(level)?,
            uid: parse_i32(uid)?,
        }),
        ["awake-all", desc] => Ok(Command::AwakeAll { desc: parse_i32(desc)?, uid: -1 }),
        ["awake-all", desc, uid] => Ok(Command::AwakeAll { desc: parse_i32(desc)?, uid: parse_i32(uid)? }),
        ["remove", desc] => Ok(Command::Remove { desc: parse_i32(desc)?, uid: -1 }),
        ["remove", desc, uid] => Ok(Command::Remove { desc: parse_i32(desc)?, uid: parse_i32(uid)? }),
        ["status"] => Ok(Command::Status),
        _ => Err(format!("unrecognized command: {args:?}")),
    }
}

fn dispatch(service: &Service, command: Command) -> Result<String, TagError> {
    match command {
        Command::Create { key, uid } => {
            let desc = service.get(key, 1, uid)?;
            Ok(format!("descriptor {desc}"))
        }
        Command::Open { key, uid } => {
            let desc = service.get(key, 2, uid)?;
            Ok(format!("descriptor {desc}"))
        }
        Command::Send { desc, level, message, uid } => {
            service.send(desc, level, uid, message.as_bytes())?;
            Ok(format!("sent {} bytes to ({desc}, {level})", message.len()))
        }
        Command::Receive { desc, level, uid } => {
            let mut buf = vec![0u8; service.config().max_message_size];
            let token = CancellationToken::new();
            let n = service.receive(desc, level, uid, &mut buf, &token)?;
            let text = String::from_utf8_lossy(&buf[..n]);
            Ok(format!("received {n} bytes on ({desc}, {level}): {text}"))
        }
        Command::AwakeAll { desc, uid } => {
            service.ctl(desc, 3, uid)?;
            Ok(format!("woke all receivers on {desc}"))
        }
        Command::Remove { desc, uid } => {
            service.ctl(desc, 4, uid)?;
            Ok(format!("removed {desc}"))
        }
        Command::Status => Ok(tagipc_core::render_status(&service.snapshot())),
        Command::Repl => unreachable!("handled by run_repl"),
    }
}
