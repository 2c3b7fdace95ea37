use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;

use ipfs_dagfs::{ByteRange, Entry, Error, IpfsClient, IpfsFs, Options, Result, RootRegistry};

#[derive(Parser, Debug)]
#[command(name = "ipfs-dagfs", about = "Browse and edit an IPFS DAG persisted to MFS or IPNS")]
struct Args {
    /// IPFS API server URL (default: $IPFS_API_URL or http://localhost:5001)
    #[arg(long)]
    url: Option<String>,

    /// Root path: empty for MFS, /ipfs/<hash> or /ipns/<name> (default: $IPFS_ROOT)
    #[arg(long)]
    root: Option<String>,

    /// Seconds between two background persists (default: $IPFS_UPDATE_PERIOD or 15)
    #[arg(long)]
    update_period: Option<u64>,

    /// Per-operation timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        dir: String,
    },
    /// Show size and hash of a file
    Stat { remote: String },
    /// Print a file to stdout
    Cat {
        remote: String,
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        length: Option<u64>,
        /// Print only the last N bytes
        #[arg(long, conflicts_with_all = ["offset", "length"])]
        tail: Option<u64>,
    },
    /// Upload a local file
    Put { local: PathBuf, remote: String },
    Mkdir { dir: String },
    Rmdir { dir: String },
    /// Remove a file
    Rm { remote: String },
    /// Copy a file
    Cp { src: String, dst: String },
    /// Move a file or a directory
    Mv { src: String, dst: String },
    /// Delete a directory and its content ("" for the whole tree)
    Purge {
        #[arg(default_value = "")]
        dir: String,
    },
    /// Print a public gateway URL
    Link { remote: String },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args = Args::parse();

    let mut options = Options::from_env();
    if let Some(url) = &args.url {
        options = options.with_endpoint(url);
    }
    if let Some(root) = &args.root {
        options = options.with_root(root);
    }
    if let Some(secs) = args.update_period {
        options = options.with_update_period(Duration::from_secs(secs));
    }

    let client = Arc::new(IpfsClient::new(&options.endpoint));
    let registry = RootRegistry::new();

    let result = tokio::select! {
        result = run(&registry, &options, client, args.timeout, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted");
            Ok(())
        }
    };

    // Flush pending changes before exiting.
    registry.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(
    registry: &RootRegistry<IpfsClient>,
    options: &Options,
    client: Arc<IpfsClient>,
    timeout: Option<u64>,
    command: Command,
) -> Result<()> {
    let mut fs = IpfsFs::new(registry, options, client, "").await?;
    if let Some(secs) = timeout {
        fs = fs.with_timeout(Duration::from_secs(secs));
    }

    match command {
        Command::Ls { dir } => {
            for entry in fs.list(&dir).await? {
                match entry {
                    Entry::Dir(remote) => println!("{:>12}  {}/", "-", remote),
                    Entry::Object(object) => println!("{:>12}  {}", object.size, object.remote),
                }
            }
        }
        Command::Stat { remote } => match fs.new_object(&remote).await {
            Ok(object) => println!("{}\t{}\t{}", object.remote, object.size, object.hash),
            Err(Error::NotAFile(_)) => println!("{}\tdirectory", remote),
            Err(e) => return Err(e),
        },
        Command::Cat {
            remote,
            offset,
            length,
            tail,
        } => {
            let object = fs.new_object(&remote).await?;
            let range = match (tail, offset, length) {
                (Some(n), _, _) => Some(ByteRange::Last(n)),
                (None, _, Some(0)) => return Ok(()),
                (None, start, Some(len)) => {
                    let start = start.unwrap_or(0);
                    Some(ByteRange::Span {
                        start,
                        end: start.saturating_add(len - 1),
                    })
                }
                (None, Some(start), None) => Some(ByteRange::From(start)),
                (None, None, None) => None,
            };
            let data = fs.open(&object, range).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Command::Put { local, remote } => {
            let data = tokio::fs::read(&local).await?;
            let object = fs.put(&remote, data).await?;
            println!("{}\t{}\t{}", object.remote, object.size, object.hash);
        }
        Command::Mkdir { dir } => fs.mkdir(&dir).await?,
        Command::Rmdir { dir } => fs.rmdir(&dir).await?,
        Command::Rm { remote } => {
            let object = fs.new_object(&remote).await?;
            fs.remove(&object).await?;
        }
        Command::Cp { src, dst } => {
            let object = fs.new_object(&src).await?;
            fs.copy(&object, &dst).await?;
        }
        Command::Mv { src, dst } => match fs.new_object(&src).await {
            Ok(object) => {
                fs.move_object(&object, &dst).await?;
            }
            Err(Error::NotAFile(_)) => fs.dir_move(&src, &dst).await?,
            Err(e) => return Err(e),
        },
        Command::Purge { dir } => fs.purge(&dir).await?,
        Command::Link { remote } => println!("{}", fs.public_link(&remote).await?),
    }
    Ok(())
}
