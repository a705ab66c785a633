use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use segdir::output;
use segdir::store::lock::LOCK_POLL_INTERVAL;
use segdir::store::{DataInput, Directory, FsDirectory, IndexInput, IoContext};
use segdir::utils::{StoreConfig, get_config_path};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "segdir")]
#[command(about = "Inspect index directories through the buffered read layer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a directory
    Ls {
        /// Directory to list
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Hex dump part of a file
    Dump {
        dir: PathBuf,
        file: String,

        /// Byte offset to start at
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Number of bytes to dump
        #[arg(long, default_value_t = 256)]
        len: u64,

        /// Read with the merge context (larger buffer)
        #[arg(long)]
        merge: bool,

        /// Explicit buffer size, overriding the context
        #[arg(long)]
        buffer_size: Option<usize>,
    },
    /// Decode one value at an offset
    Read {
        dir: PathBuf,
        file: String,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Encoding of the value
        #[arg(long = "as", value_enum)]
        kind: ValueKind,
    },
    /// Print the lock id of a directory
    LockId { dir: PathBuf },
    /// Inspect or manipulate a named lock
    Lock {
        dir: PathBuf,
        name: String,

        #[command(subcommand)]
        action: LockAction,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ValueKind {
    Short,
    Int,
    Long,
    Vint,
    Vlong,
    String,
}

#[derive(Subcommand)]
enum LockAction {
    /// Acquire the lock, hold it, then release it
    Obtain {
        /// Seconds to keep retrying while someone else holds it
        #[arg(long, default_value_t = 0)]
        timeout: u64,

        /// Seconds to hold the lock before releasing
        #[arg(long, default_value_t = 0)]
        hold: u64,
    },
    /// Report whether the lock is held
    Status,
    /// Forcibly remove the lock
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let color = !cli.no_color;

    match cli.command {
        Commands::Ls { dir } => {
            let dir = open_directory(&dir)?;
            let mut entries = Vec::new();
            for name in dir.list_all()? {
                if dir.path().join(&name).is_dir() {
                    entries.push((name, None));
                } else {
                    let len = dir.file_length(&name)?;
                    entries.push((name, Some(len)));
                }
            }
            output::print_listing(&entries, color)?;
        }
        Commands::Dump {
            dir,
            file,
            offset,
            len,
            merge,
            buffer_size,
        } => {
            let dir = open_directory(&dir)?;
            let mut input: Box<dyn IndexInput> = match buffer_size {
                Some(0) => bail!("--buffer-size must be greater than 0"),
                Some(size) => Box::new(dir.open_buffered(&file, size)?),
                None if merge => dir.open_input(&file, IoContext::MERGE)?,
                None => dir.open_input(&file, IoContext::READ)?,
            };
            if offset > input.length() {
                bail!(
                    "offset {} is past the end of {} ({} bytes)",
                    offset,
                    file,
                    input.length()
                );
            }
            input.seek(offset)?;
            let count = len.min(input.remaining()) as usize;
            let mut bytes = vec![0u8; count];
            input.read_bytes(&mut bytes)?;
            debug!(input = %input, count, "dumped bytes");
            input.close()?;
            output::print_hex_dump(offset, &bytes, color)?;
        }
        Commands::Read {
            dir,
            file,
            offset,
            kind,
        } => {
            let dir = open_directory(&dir)?;
            let mut input = dir.open_input(&file, IoContext::READ_ONCE)?;
            input.seek(offset)?;
            let value = read_value(input.as_mut(), kind)
                .with_context(|| format!("Failed to decode value at offset {}", offset))?;
            println!("{}", value);
            println!("next offset: {}", input.file_pointer());
            input.close()?;
        }
        Commands::LockId { dir } => {
            let dir = open_directory(&dir)?;
            println!("{}", dir.lock_id());
        }
        Commands::Lock { dir, name, action } => {
            let dir = open_directory(&dir)?;
            handle_lock_command(&dir, &name, action)?;
        }
        Commands::Config { action } => {
            handle_config_command(action)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_directory(path: &Path) -> Result<FsDirectory> {
    let config = StoreConfig::load()?;
    let dir = FsDirectory::open_with_config(path, &config)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(dir)
}

fn read_value(input: &mut dyn IndexInput, kind: ValueKind) -> segdir::Result<String> {
    Ok(match kind {
        ValueKind::Short => input.read_short()?.to_string(),
        ValueKind::Int => input.read_int()?.to_string(),
        ValueKind::Long => input.read_long()?.to_string(),
        ValueKind::Vint => input.read_vint()?.to_string(),
        ValueKind::Vlong => input.read_vlong()?.to_string(),
        ValueKind::String => format!("{:?}", input.read_string()?),
    })
}

fn handle_lock_command(dir: &FsDirectory, name: &str, action: LockAction) -> Result<()> {
    match action {
        LockAction::Obtain { timeout, hold } => {
            let mut lock = dir.make_lock(name);
            lock.obtain_timeout(Duration::from_secs(timeout), LOCK_POLL_INTERVAL)?;
            println!("Obtained {}", lock);
            if hold > 0 {
                thread::sleep(Duration::from_secs(hold));
            }
            lock.release()?;
            println!("Released {}", lock);
        }
        LockAction::Status => {
            let lock = dir.make_lock(name);
            if lock.is_locked()? {
                println!("{} is held", lock);
            } else {
                println!("{} is free", lock);
            }
        }
        LockAction::Clear => {
            dir.clear_lock(name)?;
            println!("Cleared lock '{}'", name);
        }
    }

    Ok(())
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = StoreConfig::load()?;
            println!("# {}", get_config_path()?.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            let path = get_config_path()?;
            if path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            let path = StoreConfig::default().save()?;
            println!("Wrote default config to {}", path.display());
        }
    }

    Ok(())
}
