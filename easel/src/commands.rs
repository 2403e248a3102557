use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;
use url::Url;

fn config_arg() -> clap::Arg {
    arg!(-c --"config" <PATH>)
        .required(false)
        .help("JSON settings file; command-line flags override its values")
        .value_parser(clap::value_parser!(PathBuf))
}

fn cache_dir_arg() -> clap::Arg {
    arg!(--"cache-dir" <PATH>)
        .required(false)
        .help("Directory holding cached listings (default: .easel-cache)")
        .value_parser(clap::value_parser!(PathBuf))
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("easel")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("easel")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner, progress bars and informational logs").required(false))
        .arg(
            arg!(-v --"verbose" ...)
                .required(false)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("archive")
                .about(
                    "Walk a catalog listing (artist, collection, topic, search, category...) and \
                download every artwork on it. Prompts for URLs when none are given.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The listing URL to archive")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("urls-file"),
                )
                .arg(
                    arg!(-U --"urls-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of listing URLs")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-t --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Number of concurrent download workers (default: 5)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Root directory for downloaded artworks (default: 'Artvee Artworks')")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(cache_dir_arg())
                .arg(config_arg())
                .arg(
                    arg!(--"site" <URL>)
                        .required(false)
                        .help("Catalog site root used for download links and resolution")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"cookie" <COOKIE>)
                        .required(false)
                        .help("Session cookie header value from an existing login"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds (default: 10)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"max-pages" <PAGES>)
                        .required(false)
                        .help("Stop walking a listing after this many pages")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    arg!(--"refresh")
                        .required(false)
                        .help("Ignore cached listings and walk the catalog again")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-r --"report" <PATH>)
                        .required(false)
                        .help("Save a run report to this file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text or json (default: from the report file extension)")
                        .value_parser(["text", "json"]),
                ),
        )
        .subcommand(
            command!("cache")
                .about("Inspect or clear cached listings")
                .subcommand_required(true)
                .subcommand(
                    command!("list")
                        .about("List cached listings")
                        .arg(cache_dir_arg())
                        .arg(config_arg()),
                )
                .subcommand(
                    command!("clear")
                        .about("Delete cached listings so the next run walks again")
                        .arg(
                            arg!(-u --"url" <URL>)
                                .required(false)
                                .help("Only forget the listing this URL belongs to"),
                        )
                        .arg(cache_dir_arg())
                        .arg(config_arg()),
                ),
        )
}
