mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "datashare", version, about = "Cross-process data sharing CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_subcommand() {
        let cli = Cli::try_parse_from([
            "datashare",
            "select",
            "/tmp/sockets",
            "--provider-id",
            "org.example.provider",
            "--data-id",
            "contacts",
            "--columns",
            "id,name",
            "--where",
            "id = 1",
        ])
        .expect("select args should parse");

        let Command::Select(args) = cli.command else {
            panic!("expected select");
        };
        assert_eq!(args.columns, ["id", "name"]);
        assert_eq!(args.where_clause.as_deref(), Some("id = 1"));
        assert_eq!(args.page.page, 1);
        assert_eq!(args.page.per_page, 20);
    }

    #[test]
    fn insert_requires_values() {
        let err = Cli::try_parse_from([
            "datashare",
            "insert",
            "/tmp/sockets",
            "-p",
            "org.example.provider",
            "-d",
            "contacts",
        ])
        .expect_err("insert without --set should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_map_remove_subcommand() {
        let cli = Cli::try_parse_from([
            "datashare",
            "--format",
            "json",
            "map-remove",
            "/tmp/sockets",
            "-p",
            "org.example.provider",
            "-d",
            "settings",
            "--key",
            "theme",
            "--value",
            "dark",
        ])
        .expect("map-remove args should parse");
        assert!(matches!(cli.command, Command::MapRemove(_)));
    }
}
