use std::{
    error::Error,
    io::{Stderr, Write},
};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, ClearType},
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

type AdminResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

const ATTEMPTS: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "tally_admin")]
#[command(about = "Admin utilities for the tally remote store (owner accounts)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./tally.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Owner(Owner),
}

#[derive(Args, Debug)]
struct Owner {
    #[command(subcommand)]
    command: OwnerCommand,
}

#[derive(Subcommand, Debug)]
enum OwnerCommand {
    /// Register an owner; the password is asked on the terminal.
    Create {
        #[arg(long)]
        username: String,
    },
    /// Print every registered username.
    List,
}

/// Line editor that echoes `*` instead of the typed characters.
struct SecretPrompt {
    out: Stderr,
}

impl SecretPrompt {
    fn open() -> AdminResult<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            out: std::io::stderr(),
        })
    }

    fn line(&mut self, text: &str) -> AdminResult<()> {
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print(text)
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn ask(&mut self, label: &str) -> AdminResult<String> {
        self.line(label)?;

        let mut secret = String::new();
        loop {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            else {
                continue;
            };
            let control = modifiers.contains(KeyModifiers::CONTROL);

            match code {
                KeyCode::Enter => break,
                KeyCode::Char('c') if control => {
                    self.line("\r\n")?;
                    return Err("interrupted".into());
                }
                KeyCode::Char(ch) if !control => {
                    secret.push(ch);
                    queue!(self.out, Print('*'))?;
                }
                KeyCode::Backspace => {
                    if secret.pop().is_none() {
                        continue;
                    }
                    queue!(self.out, cursor::MoveLeft(1), Print(' '), cursor::MoveLeft(1))?;
                }
                _ => continue,
            }
            self.out.flush()?;
        }

        queue!(self.out, Print("\r\n"))?;
        self.out.flush()?;
        Ok(secret)
    }

    /// Ask twice until both entries match and are not empty.
    fn confirmed(&mut self) -> AdminResult<String> {
        for _ in 0..ATTEMPTS {
            let first = self.ask("Password: ")?;
            if first.is_empty() {
                self.line("The password cannot be empty.\r\n")?;
                continue;
            }
            if self.ask("Repeat password: ")? == first {
                return Ok(first);
            }
            self.line("The passwords differ.\r\n")?;
        }
        Err(format!("no matching password after {ATTEMPTS} attempts").into())
    }
}

impl Drop for SecretPrompt {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

async fn connect_db(database_url: &str) -> AdminResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> AdminResult<()> {
    let cli = Cli::parse();
    let db = connect_db(&cli.database_url).await?;

    let Command::Owner(Owner { command }) = cli.command;
    match command {
        OwnerCommand::Create { username } => {
            let password = SecretPrompt::open()?.confirmed()?;
            if !server::owner::create(&db, &username, &password).await? {
                eprintln!("owner already exists: {username}");
                std::process::exit(1);
            }
            println!("created owner: {username}");
        }
        OwnerCommand::List => {
            for username in server::owner::usernames(&db).await? {
                println!("{username}");
            }
        }
    }

    Ok(())
}
