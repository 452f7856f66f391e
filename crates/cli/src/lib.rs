pub mod commands;
mod logging;

use clap::{Parser, Subcommand};
use parley_core::Language;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley assistant CLI",
    long_about = "Run one-shot conversational turns, inspect lead qualification, provider order and effective configuration.",
    after_help = "Examples:\n  parley respond --message \"Bonjour, budget 1500€\"\n  parley qualify --text \"I'm the CEO, urgent\"\n  parley providers --language ary\n  parley config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Generate one reply through the provider chain and print the turn as JSON")]
    Respond {
        #[arg(long, help = "Inbound user message")]
        message: String,
        #[arg(long, help = "Conversation language (fr|en|es|ar|ary)")]
        language: Option<Language>,
        #[arg(long, help = "Session id to attach the turn to")]
        session: Option<String>,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Provider names to treat as failed (comma separated)"
        )]
        force_fail: Vec<String>,
    },
    #[command(about = "Extract qualification signals from text and score them")]
    Qualify {
        #[arg(long, help = "Text to analyse")]
        text: String,
        #[arg(long, default_value_t = 1, help = "Message count used for engagement")]
        messages: usize,
    },
    #[command(about = "List provider descriptors and the effective fallback order")]
    Providers {
        #[arg(long, help = "Conversation language used to compute the order")]
        language: Option<Language>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let result = match cli.command {
        Command::Respond { message, language, session, force_fail } => {
            commands::respond::run(commands::respond::RespondArgs {
                message,
                language,
                session,
                force_fail,
            })
        }
        Command::Qualify { text, messages } => commands::qualify::run(&text, messages),
        Command::Providers { language } => commands::providers::run(language),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
