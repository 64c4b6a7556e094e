//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Search a book archive and download books in the background.
///
/// Requests become durable jobs; `serve` runs the scheduler that turns them
/// into files in the download directory.
#[derive(Parser, Debug)]
#[command(name = "bookfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SQLite database file
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Directory downloaded books are written to
    #[arg(long, value_name = "DIR", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Config file (defaults to $XDG_CONFIG_HOME/bookfetch/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the acquisition scheduler until interrupted (Ctrl-C)
    Serve,

    /// Search the archive, print results, and cache them for `request`
    Search(SearchArgs),

    /// Request a book by hash or by cached search result
    Request(RequestArgs),

    /// Show a download job's status
    Status(StatusArgs),
}

#[derive(ClapArgs, Debug)]
pub struct SearchArgs {
    /// Search terms
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// User the cached results belong to
    #[arg(long, default_value_t = 0)]
    pub user: i64,
}

impl SearchArgs {
    /// Joined query string.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(ClapArgs, Debug)]
pub struct RequestArgs {
    /// Content hash of the book
    #[arg(required_unless_present = "search_id", conflicts_with_all = ["search_id", "index"])]
    pub hash: Option<String>,

    /// Cached search id printed by `search`
    #[arg(long, requires = "index")]
    pub search_id: Option<i64>,

    /// Zero-based result index within the cached search
    #[arg(long, requires = "search_id")]
    pub index: Option<usize>,

    /// User making the request
    #[arg(long, default_value_t = 0)]
    pub user: i64,
}

#[derive(ClapArgs, Debug)]
pub struct StatusArgs {
    /// Job id printed by `request`
    pub job_id: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_serve_parses_with_defaults() {
        let args = Args::try_parse_from(["bookfetch", "serve"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.database.is_none());
        assert!(matches!(args.command, Command::Serve));
    }

    #[test]
    fn test_cli_missing_subcommand_is_error() {
        let err = Args::try_parse_from(["bookfetch"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["bookfetch", "-v", "serve"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["bookfetch", "serve", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["bookfetch", "--quiet", "serve"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["bookfetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["bookfetch", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_global_paths_after_subcommand() {
        let args = Args::try_parse_from([
            "bookfetch",
            "status",
            "7",
            "--database",
            "/tmp/b.db",
            "--download-dir",
            "/tmp/books",
        ])
        .unwrap();
        assert_eq!(args.database, Some(PathBuf::from("/tmp/b.db")));
        assert_eq!(args.download_dir, Some(PathBuf::from("/tmp/books")));
        let Command::Status(status) = args.command else {
            panic!("expected status");
        };
        assert_eq!(status.job_id, 7);
    }

    // ==================== Search Tests ====================

    #[test]
    fn test_cli_search_joins_terms() {
        let args = Args::try_parse_from(["bookfetch", "search", "programming", "golang"]).unwrap();
        let Command::Search(search) = args.command else {
            panic!("expected search");
        };
        assert_eq!(search.query_string(), "programming golang");
        assert_eq!(search.user, 0);
    }

    #[test]
    fn test_cli_search_requires_query() {
        let err = Args::try_parse_from(["bookfetch", "search"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    // ==================== Request Tests ====================

    #[test]
    fn test_cli_request_by_hash() {
        let args = Args::try_parse_from(["bookfetch", "request", "abc123", "--user", "4"]).unwrap();
        let Command::Request(request) = args.command else {
            panic!("expected request");
        };
        assert_eq!(request.hash.as_deref(), Some("abc123"));
        assert_eq!(request.user, 4);
    }

    #[test]
    fn test_cli_request_by_search_index() {
        let args = Args::try_parse_from([
            "bookfetch",
            "request",
            "--search-id",
            "3",
            "--index",
            "0",
        ])
        .unwrap();
        let Command::Request(request) = args.command else {
            panic!("expected request");
        };
        assert!(request.hash.is_none());
        assert_eq!(request.search_id, Some(3));
        assert_eq!(request.index, Some(0));
    }

    #[test]
    fn test_cli_request_requires_hash_or_search() {
        assert!(Args::try_parse_from(["bookfetch", "request"]).is_err());
    }

    #[test]
    fn test_cli_request_search_id_requires_index() {
        assert!(Args::try_parse_from(["bookfetch", "request", "--search-id", "3"]).is_err());
    }

    #[test]
    fn test_cli_request_hash_conflicts_with_search() {
        let result = Args::try_parse_from([
            "bookfetch",
            "request",
            "abc",
            "--search-id",
            "3",
            "--index",
            "0",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["bookfetch", "serve", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
