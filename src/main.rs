use std::path::PathBuf;

use swipefeed::config::ServerConfig;
use swipefeed::main_axum::serve_forever;
use swipefeed::utils::log::init_logger_once;

#[derive(Debug, Default)]
struct CliArgs {
    addr: Option<String>,
    media_root: Option<PathBuf>,
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger_once();

    let args = parse_args(std::env::args().skip(1).collect())?;
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::from_env()?,
    };
    if args.config.is_some() {
        config.apply_env();
    }
    if let Some(addr) = args.addr {
        config.bind_addr = addr;
    }
    if let Some(root) = args.media_root {
        config.media_root = root;
    }

    serve_forever(config).await
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            flag @ ("--addr" | "--media-root" | "--config") => {
                index += 1;
                let Some(value) = args.get(index).map(|v| v.trim()) else {
                    anyhow::bail!("{flag} requires a value");
                };
                if value.is_empty() {
                    anyhow::bail!("{flag} cannot be empty");
                }
                match flag {
                    "--addr" => out.addr = Some(value.to_string()),
                    "--media-root" => out.media_root = Some(PathBuf::from(value)),
                    _ => out.config = Some(PathBuf::from(value)),
                }
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("swipefeed catalogue server");
    println!("  --addr host:port     Bind address (default 0.0.0.0:3001)");
    println!("  --media-root DIR     Directory with one folder per category");
    println!("  --config FILE        JSON settings file");
}
