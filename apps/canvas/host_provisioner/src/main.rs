use clap::{Parser, Subcommand};
use common::ServiceError;
use common::config::ServiceConfig;
use common::logger::component_logger;
use common::provision::{CreateHost, Provisioned, Provisioner, parse_expiry, preview_host};
use common::store::CanvasStore;
use common::recovery::ConnectRetry;
use slog::{Logger, error, info};
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "host_provisioner", version, about = "Provision host access for canvas sessions")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or re-provision the canvas session for a library session
    Create {
        #[arg(long)]
        session_id: i64,
        #[arg(long, env = "PROVISIONER_CREATED_BY")]
        created_by: Option<String>,
        /// Expiry date as YYYY-MM-DD (defaults to the configured TTL)
        #[arg(long)]
        expires: Option<String>,
        /// Also register a provisioner participant
        #[arg(long)]
        create_user: bool,
        /// Print a fresh GUID without touching the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace the host GUID and host token of an existing session
    Rotate {
        #[arg(long)]
        session_id: i64,
        /// Print a fresh GUID without touching the database
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    /// Session of a dry run, which is answered without a database.
    fn dry_run_session(&self) -> Option<i64> {
        match *self {
            Command::Create {
                session_id,
                dry_run: true,
                ..
            }
            | Command::Rotate {
                session_id,
                dry_run: true,
            } => Some(session_id),
            _ => None,
        }
    }
}

fn print_outcome(outcome: &Provisioned) {
    println!();
    println!("Session:          {}", outcome.session_id);
    println!("Host GUID:        {}", outcome.host_guid);
    match (&outcome.host_token, &outcome.host_url) {
        (Some(token), Some(url)) => {
            println!("Host token:       {}", token);
            println!("Host URL:         {}", url);
        }
        _ => println!("(dry run, nothing was written)"),
    }
    if let (Some(token), Some(url)) = (&outcome.user_token, &outcome.participant_url) {
        println!("User token:       {}", token);
        println!("Participant URL:  {}", url);
    }
    if let Some(expires_at) = outcome.expires_at {
        println!("Expires:          {}", expires_at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(guid) = &outcome.provisioner_guid {
        println!("Provisioner user: {}", guid);
    }
    println!();
}

async fn run_command(
    provisioner: &Provisioner,
    logger: &Logger,
    command: Command,
) -> Result<(), ServiceError> {
    let outcome = match command {
        Command::Create {
            session_id,
            created_by,
            expires,
            create_user,
            dry_run,
        } => {
            let expires_at = expires.as_deref().map(parse_expiry).transpose()?;
            info!(logger, "Provisioning host"; "session_id" => session_id, "dry_run" => dry_run);
            provisioner
                .create_host(CreateHost {
                    session_id,
                    created_by,
                    expires_at,
                    create_user,
                    dry_run,
                })
                .await?
        }
        Command::Rotate {
            session_id,
            dry_run,
        } => {
            info!(logger, "Rotating host credentials"; "session_id" => session_id, "dry_run" => dry_run);
            provisioner.rotate_host(session_id, dry_run).await?
        }
    };
    print_outcome(&outcome);
    Ok(())
}

fn print_help() {
    println!("Enter a library session id to provision its host, or one of:");
    println!("  help   show this message");
    println!("  clear  clear the screen");
    println!("  exit   quit");
}

async fn interactive(provisioner: &Provisioner, logger: &Logger) -> Result<(), ServiceError> {
    print_help();
    let stdin = io::stdin();
    loop {
        print!("session id> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "" => continue,
            "exit" | "quit" => return Ok(()),
            "help" => print_help(),
            "clear" => print!("\x1B[2J\x1B[1;1H"),
            input => match input.parse::<i64>() {
                Ok(session_id) => {
                    let command = Command::Create {
                        session_id,
                        created_by: Some("interactive".to_string()),
                        expires: None,
                        create_user: false,
                        dry_run: false,
                    };
                    if let Err(e) = run_command(provisioner, logger, command).await {
                        error!(logger, "Provisioning failed"; "session_id" => session_id, "error" => %e);
                    }
                }
                Err(_) => println!("'{}' is not a session id; type 'help' for options", input),
            },
        }
    }
}

async fn run(cli: Cli, logger: &Logger) -> Result<(), ServiceError> {
    let config = ServiceConfig::new()?;
    if let Some(session_id) = cli.command.as_ref().and_then(Command::dry_run_session) {
        info!(logger, "Dry run, database not contacted"; "session_id" => session_id);
        print_outcome(&preview_host(&config, session_id)?);
        return Ok(());
    }

    let db = ConnectRetry::from_config(&config)
        .connect(&config.database_url)
        .await?;
    let provisioner = Provisioner::new(CanvasStore::new(db), config);

    match cli.command {
        Some(command) => run_command(&provisioner, logger, command).await,
        None => interactive(&provisioner, logger).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = component_logger("host_provisioner");

    match run(cli, &logger).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(logger, "Host provisioning failed"; "error" => %e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        let cli = Cli::try_parse_from(args).unwrap();
        cli.command.unwrap()
    }

    #[test]
    fn test_dry_runs_are_recognised_before_connecting() {
        let create = parse(&["host_provisioner", "create", "--session-id", "215", "--dry-run"]);
        assert_eq!(create.dry_run_session(), Some(215));
        let rotate = parse(&["host_provisioner", "rotate", "--session-id", "9", "--dry-run"]);
        assert_eq!(rotate.dry_run_session(), Some(9));
    }

    #[test]
    fn test_real_runs_need_the_database() {
        let create = parse(&["host_provisioner", "create", "--session-id", "215"]);
        assert_eq!(create.dry_run_session(), None);
        let rotate = parse(&["host_provisioner", "rotate", "--session-id", "9"]);
        assert_eq!(rotate.dry_run_session(), None);
    }
}
