use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "verdist",
    about = "verdist: versioned file distribution control plane",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override storage.data_dir
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the ingest service
    Ingest(ServeOneArgs),
    /// Run the consumer service
    Consumer(ServeOneArgs),
    /// Run both services in one process
    Serve(ServeArgs),
    /// Publish a local file as a version
    Upload(UploadArgs),
    /// Fetch the latest or a specific version
    Get(GetArgs),
    /// Show metadata of the latest version
    Info(FileArgs),
    /// List published versions, newest first
    Versions(FileArgs),
    /// List every published file name
    Files,
}

#[derive(Args)]
pub struct ServeOneArgs {
    /// Listen address, overriding the configuration
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub ingest_bind: Option<SocketAddr>,
    #[arg(long)]
    pub consumer_bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct UploadArgs {
    pub filename: String,
    pub version: String,
    /// File whose bytes are uploaded
    pub path: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    pub filename: String,
    #[arg(long)]
    pub version: Option<String>,
    /// Wait for the version to become visible instead of failing at once
    #[arg(long, requires = "version")]
    pub wait: bool,
    /// Write content here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct FileArgs {
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ingest_bind() {
        let cli = Cli::try_parse_from(["verdist", "ingest", "--bind", "127.0.0.1:9000"]).unwrap();
        if let Command::Ingest(args) = cli.command {
            assert_eq!(args.bind, Some("127.0.0.1:9000".parse().unwrap()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_consumer_defaults() {
        let cli = Cli::try_parse_from(["verdist", "consumer"]).unwrap();
        if let Command::Consumer(args) = cli.command {
            assert!(args.bind.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["verdist", "serve", "--consumer-bind", "0.0.0.0:7001"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert!(args.ingest_bind.is_none());
            assert_eq!(args.consumer_bind.unwrap().port(), 7001);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_upload() {
        let cli = Cli::try_parse_from(["verdist", "upload", "test-config", "1.0.0", "./v1.txt"]).unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.filename, "test-config");
            assert_eq!(args.version, "1.0.0");
            assert_eq!(args.path, PathBuf::from("./v1.txt"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_get_version_output() {
        let cli = Cli::try_parse_from(["verdist", "get", "app", "--version", "2.0.0", "-o", "out.bin"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.version, Some("2.0.0".into()));
            assert_eq!(args.output, Some(PathBuf::from("out.bin")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_info_and_versions() {
        let cli = Cli::try_parse_from(["verdist", "info", "app"]).unwrap();
        assert!(matches!(cli.command, Command::Info(_)));
        let cli = Cli::try_parse_from(["verdist", "versions", "app"]).unwrap();
        assert!(matches!(cli.command, Command::Versions(_)));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "verdist", "--verbose", "--config", "verdist.toml", "--data-dir", "/srv", "--format", "json", "info", "app",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("verdist.toml")));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv")));
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn upload_requires_path() {
        assert!(Cli::try_parse_from(["verdist", "upload", "app", "1.0.0"]).is_err());
    }

    #[test]
    fn parse_files() {
        let cli = Cli::try_parse_from(["verdist", "--format", "json", "files"]).unwrap();
        assert!(matches!(cli.command, Command::Files));
    }

    #[test]
    fn get_wait_requires_version() {
        assert!(Cli::try_parse_from(["verdist", "get", "app", "--wait"]).is_err());
        let cli = Cli::try_parse_from(["verdist", "get", "app", "--version", "1.0.0", "--wait"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert!(args.wait);
        } else { panic!("wrong command"); }
    }
}
