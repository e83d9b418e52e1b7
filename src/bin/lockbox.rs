//! Lockbox CLI - Password-based encryption of strings, files and directories
//!
//! Command-line interface over the `lockbox` library. Envelopes and plaintext
//! go to stdout; prompts, progress and logs go to stderr.

use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use lockbox::cancel::CancelToken;
use lockbox::commands::{self, Destination, Request, Session, Source};
use lockbox::confirm::{AlwaysOverwrite, OverwriteConfirm, TerminalConfirm};
use lockbox::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use lockbox::passphrase::{
    ConfirmingPassphraseReader, PassphraseReader, ReaderPassphraseReader,
    TerminalPassphraseReader,
};
use lockbox::progress::BarProgress;

/// Environment variable holding the log filter, e.g. `LOCKBOX_LOG=debug`.
const LOG_ENV: &str = "LOCKBOX_LOG";

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(version)]
#[command(about = "Password-based encryption of strings, files and directories.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a string, stdin, a file or a directory
    #[command(alias = "e")]
    Encrypt(OperationArgs),

    /// Decrypt a string, stdin, a file or a directory
    #[command(alias = "d")]
    Decrypt(OperationArgs),
}

#[derive(Args)]
struct OperationArgs {
    /// File or directory to process; omit or use - to read stdin
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Literal string to process instead of INPUT
    #[arg(short, long, value_name = "STRING", conflicts_with = "input")]
    string: Option<String>,

    /// Where to write the result; - means stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Process every file under a directory, replacing each original
    #[arg(short, long)]
    recursive: bool,

    /// Overwrite existing files without asking
    #[arg(short, long)]
    force: bool,

    /// Delete the input file once the output has been written
    #[arg(long)]
    remove_original: bool,
}

#[derive(Clone, Copy)]
enum Operation {
    Encrypt,
    Decrypt,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let result = match cli.command {
        Commands::Encrypt(args) => run(Operation::Encrypt, args, cli.passphrase_stdin, cancel),
        Commands::Decrypt(args) => run(Operation::Decrypt, args, cli.passphrase_stdin, cancel),
    };

    if let Err(e) = result {
        if e.is(ErrorKind::Aborted) {
            eprintln!("Aborted");
            process::exit(EXIT_INTERRUPTED);
        }
        eprintln!("Error: {}", e.report());
        process::exit(EXIT_FAILURE);
    }
}

fn run(
    operation: Operation,
    args: OperationArgs,
    passphrase_stdin: bool,
    cancel: CancelToken,
) -> Result<()> {
    let source = read_source(args.string, args.input, passphrase_stdin)?;
    let request = Request {
        source,
        destination: Destination::from_arg(args.output),
        recursive: args.recursive,
        remove_original: args.remove_original,
    };

    let mut reader = passphrase_reader(operation, passphrase_stdin);
    let mut confirm: Box<dyn OverwriteConfirm> = if args.force {
        Box::new(AlwaysOverwrite)
    } else {
        Box::new(TerminalConfirm)
    };
    let mut progress = BarProgress::new(match operation {
        Operation::Encrypt => "Encrypting",
        Operation::Decrypt => "Decrypting",
    });

    let mut session = Session {
        passphrase: &mut *reader,
        confirm: &mut *confirm,
        progress: &mut progress,
        cancel,
    };
    match operation {
        Operation::Encrypt => commands::encrypt(request, &mut session),
        Operation::Decrypt => commands::decrypt(request, &mut session),
    }
}

/// Resolves the data source. Data on stdin is read in full up front.
fn read_source(
    string: Option<String>,
    input: Option<PathBuf>,
    passphrase_stdin: bool,
) -> Result<Source> {
    if let Some(string) = string {
        return Ok(Source::Data(Zeroizing::new(string.into_bytes())));
    }
    match input {
        Some(path) if path.as_os_str() != "-" => Ok(Source::Path(path)),
        _ => {
            if passphrase_stdin {
                return Err(LockboxError::new(
                    ErrorCategory::User,
                    "--passphrase-stdin cannot be used while reading data from stdin",
                ));
            }
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("Reading data from stdin; end with Ctrl-D");
            }
            let mut data = Zeroizing::new(Vec::new());
            stdin.read_to_end(&mut data).map_err(|e| {
                LockboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to read data from stdin",
                    e,
                )
            })?;
            Ok(Source::Data(data))
        }
    }
}

fn passphrase_reader(operation: Operation, passphrase_stdin: bool) -> Box<dyn PassphraseReader> {
    if passphrase_stdin {
        return Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())));
    }
    match operation {
        Operation::Encrypt => Box::new(ConfirmingPassphraseReader::terminal()),
        Operation::Decrypt => Box::new(TerminalPassphraseReader::default()),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// The first Ctrl-C during a cancellable operation asks it to stop at the next
/// chunk or file. Otherwise, and on any further Ctrl-C, exit at once.
fn install_interrupt_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_armed() && !cancel.is_cancelled() {
            cancel.cancel();
            return;
        }
        eprintln!("\nAborted");
        process::exit(EXIT_INTERRUPTED);
    });
    if let Err(e) = result {
        warn!("failed to install interrupt handler: {}", e);
    }
}
