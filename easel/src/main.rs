use colored::Colorize;
use commands::command_argument_builder;
use easel::handlers::{handle_archive, handle_cache_clear, handle_cache_list, print_banner};
use tracing_subscriber::EnvFilter;

mod commands;

fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    let verbose = chosen_command.get_count("verbose");

    init_tracing(quiet, verbose);

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        Some(("archive", primary_command)) => handle_archive(primary_command, quiet).await,
        Some(("cache", primary_command)) => match primary_command.subcommand() {
            Some(("list", secondary_command)) => handle_cache_list(secondary_command),
            Some(("clear", secondary_command)) => handle_cache_clear(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        _ => {
            // No subcommand provided, show usage
            let _ = command_argument_builder().print_help();
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
