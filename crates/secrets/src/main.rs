//! indietool-secrets - Encrypted secrets vault for indietool
//!
//! Commands:
//! - init [KEY_PATH]: Generate (or import) the key for a database
//! - set <NAME[@DB]> [VALUE]: Store a secret (prompts if no value)
//! - get <NAME[@DB]>: Show a secret (value masked unless --show)
//! - list: List secrets in a database (values never shown)
//! - delete <NAME[@DB]>: Delete a secret
//! - key: Show the public key of a database
//! - db list | db delete <DB> | db purge-key <DB>: Manage databases

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indietool_core::{format, Config, SecretsConfig};
use indietool_secrets::{Identifier, SecretManager, SecretsError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "indietool-secrets")]
#[command(about = "Encrypted secrets vault for indietool - per-database keys kept in your OS keyring")]
#[command(version)]
#[command(after_help = r#"IDENTIFIERS:
    Secrets are addressed as NAME[@DATABASE]:
    - stripe-key           in the default database
    - stripe-key@work      in the "work" database

SECURITY:
    - Secrets are encrypted with age (X25519 + ChaCha20-Poly1305)
    - One key per database, stored only in the OS keyring
    - Databases stored in ~/.config/indietool/secrets/<database>/
    - Expiry dates are reminders; expired secrets stay readable"#)]
struct Cli {
    /// Config file (default: ~/.config/indietool/indietool.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the encryption key for a database
    Init {
        /// Existing age identity file to import instead of generating a key
        key_path: Option<PathBuf>,
        /// Database to initialize (default from config)
        #[arg(short, long)]
        database: Option<String>,
        /// Replace an existing key (its secrets become unreadable)
        #[arg(long)]
        force: bool,
    },

    /// Store an encrypted secret (prompts securely if value not provided)
    Set {
        /// Secret name, optionally with @database
        identifier: String,
        /// Secret value (omit for secure hidden prompt)
        value: Option<String>,
        /// Note describing the secret
        #[arg(long)]
        note: Option<String>,
        /// Expiration date (RFC3339, e.g. 2025-12-31T23:59:59Z)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Show a secret (value masked unless --show)
    Get {
        /// Show the actual value (visible in terminal)
        #[arg(short, long)]
        show: bool,
        /// Print only the raw value without trailing newline (useful for piping)
        #[arg(short = 'n')]
        no_newline: bool,
        /// Secret name, optionally with @database
        identifier: String,
    },

    /// List secrets in a database (values are never shown)
    List {
        /// Database to list (default from config)
        #[arg(short, long)]
        database: Option<String>,
        /// Include notes in the output
        #[arg(long)]
        show_notes: bool,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Delete a secret
    Delete {
        /// Secret name, optionally with @database
        identifier: String,
    },

    /// Show the public key of a database
    Key {
        /// Database (default from config)
        #[arg(short, long)]
        database: Option<String>,
    },

    /// Manage secrets databases
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// List all secrets databases
    List,

    /// Delete a database and all its secrets (irreversible)
    Delete {
        /// Database name
        database: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Remove a database's encryption key from the keyring (irreversible)
    PurgeKey {
        /// Database name
        database: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Diagnostics go to stderr; secret values are never logged
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let secrets_config = config.secrets();
    let manager = SecretManager::new(&secrets_config)
        .context("Failed to open secrets storage")?;

    match cli.command {
        Some(Commands::Init {
            key_path,
            database,
            force,
        }) => cmd_init(&manager, database.as_deref(), key_path, force),
        Some(Commands::Set {
            identifier,
            value,
            note,
            expires,
        }) => cmd_set(&manager, &identifier, value, note, expires),
        Some(Commands::Get {
            show,
            no_newline,
            identifier,
        }) => cmd_get(&manager, &secrets_config, &identifier, show, no_newline),
        Some(Commands::List {
            database,
            show_notes,
            json,
        }) => cmd_list(&manager, database.as_deref(), show_notes, json),
        Some(Commands::Delete { identifier }) => cmd_delete(&manager, &identifier),
        Some(Commands::Key { database }) => cmd_key(&manager, database.as_deref()),
        Some(Commands::Db { command }) => match command {
            DbCommands::List => cmd_db_list(&manager),
            DbCommands::Delete { database, force } => cmd_db_delete(&manager, &database, force),
            DbCommands::PurgeKey { database, force } => {
                cmd_db_purge_key(&manager, &database, force)
            }
        },
        None => {
            // Default to listing secrets
            cmd_list(&manager, None, false, false)
        }
    }
}

/// Parse NAME[@DB], rejecting an empty name
fn parse_identifier(identifier: &str) -> Result<Identifier> {
    let parsed = Identifier::parse(identifier.trim());
    if parsed.name.trim().is_empty() {
        bail!("Secret name cannot be empty");
    }
    Ok(parsed)
}

fn parse_expires(expires: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(expires.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| {
            format!(
                "Invalid expiration date '{}' (use RFC3339: 2025-12-31T23:59:59Z)",
                expires
            )
        })
}

/// Ask for an explicit "yes" on stdin
fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut response = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut response)
        .context("Failed to read confirmation")?;

    Ok(response.trim().eq_ignore_ascii_case("yes"))
}

/// Initialize a database key
fn cmd_init(
    manager: &SecretManager,
    database: Option<&str>,
    key_path: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let database = database.unwrap_or(manager.default_database());

    if manager.has_key(Some(database)) {
        if !force {
            println!(
                "warning: An encryption key already exists for database '{}'",
                database
            );
            println!("  Reinitializing would replace it and make current secrets permanently unreadable.");
            println!("  Use a different database name, or pass --force if you really mean it.");
            bail!("Refusing to overwrite existing encryption key");
        }
        println!(
            "warning: Replacing the encryption key for database '{}'",
            database
        );
    }

    let pubkey = manager.init_database(Some(database), key_path.as_deref(), force)?;

    match &key_path {
        Some(path) => println!(
            "success: Encryption key loaded from '{}' for database '{}'",
            path.display(),
            database
        ),
        None => println!(
            "success: New encryption key generated for database '{}'",
            database
        ),
    }
    println!();
    println!("Public key:");
    println!("  {}", pubkey);
    println!();
    println!("Store secrets with: indietool-secrets set <name>[@{}] <value>", database);

    Ok(())
}

/// Store a secret
fn cmd_set(
    manager: &SecretManager,
    identifier: &str,
    value: Option<String>,
    note: Option<String>,
    expires: Option<String>,
) -> Result<()> {
    let id = parse_identifier(identifier)?;
    let expires_at = expires.as_deref().map(parse_expires).transpose()?;

    // Don't trim the value - whitespace may be intentional
    let secret_value = match value {
        Some(v) => v,
        None => rpassword::prompt_password("Enter secret value: ")
            .context("Failed to read secret value")?,
    };
    if secret_value.is_empty() {
        bail!("Empty value not allowed");
    }

    let note = note.unwrap_or_default();
    let secret = manager.set_secret(
        &id.name,
        &secret_value,
        id.database.as_deref(),
        &note,
        expires_at,
    )?;

    print!(
        "success: Secret '{}' stored in database '{}'",
        secret.name,
        id.database_or(manager.default_database())
    );
    if !secret.note.is_empty() {
        print!(" with note: {}", secret.note);
    }
    if let Some(expires_at) = secret.expires_at {
        print!(" (expires: {})", format::timestamp(expires_at));
    }
    println!();

    Ok(())
}

/// Show a secret
fn cmd_get(
    manager: &SecretManager,
    config: &SecretsConfig,
    identifier: &str,
    show: bool,
    no_newline: bool,
) -> Result<()> {
    let id = parse_identifier(identifier)?;
    let secret = manager.get_secret(&id.name, id.database.as_deref())?;

    if no_newline {
        if secret.is_expired() {
            eprintln!("warning: Secret '{}' has expired", secret.name);
        }
        print!("{}", secret.value());
        return Ok(());
    }

    if secret.is_expired() {
        println!("warning: Secret '{}' has expired!", secret.name);
    }

    println!("Name:     {}", secret.name);
    if show || !config.mask_output {
        println!("Value:    {}", secret.value());
    } else {
        println!("Value:    {} (use --show to reveal)", format::MASK);
    }
    if !secret.note.is_empty() {
        println!("Note:     {}", secret.note);
    }
    println!("Created:  {}", format::timestamp(secret.created_at));
    println!("Updated:  {}", format::timestamp(secret.updated_at));
    if let Some(expires_at) = secret.expires_at {
        let status = if secret.is_expired() { "EXPIRED" } else { "expires" };
        println!(
            "Expires:  {} ({} {})",
            format::timestamp(expires_at),
            status,
            format::relative_time(expires_at)
        );
    }

    Ok(())
}

/// List secrets in a database
fn cmd_list(
    manager: &SecretManager,
    database: Option<&str>,
    show_notes: bool,
    json: bool,
) -> Result<()> {
    let database = database.unwrap_or(manager.default_database());

    let mut secrets = match manager.list_secrets(Some(database)) {
        Ok(secrets) => secrets,
        Err(SecretsError::DatabaseNotFound { .. }) => vec![],
        Err(e) => return Err(e.into()),
    };
    secrets.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        println!("{}", serde_json::to_string_pretty(&secrets)?);
        return Ok(());
    }

    if secrets.is_empty() {
        println!("No secrets found in database '{}'", database);
        println!("Add one with: indietool-secrets set <name> <value>");
        return Ok(());
    }

    println!("Secrets in database '{}':", database);
    println!();

    let name_width = secrets
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let note_width = secrets
        .iter()
        .map(|s| format::truncate(&s.note, 40).chars().count())
        .max()
        .unwrap_or(0)
        .max("NOTE".len());

    let mut header = format!(
        "{}  {}  {}",
        format::pad_right("NAME", name_width),
        format::pad_right("CREATED", 19),
        format::pad_right("UPDATED", 19)
    );
    let mut rule = format!("{}  {}  {}", "-".repeat(name_width), "-".repeat(19), "-".repeat(19));
    if show_notes {
        header.push_str(&format!("  {}", format::pad_right("NOTE", note_width)));
        rule.push_str(&format!("  {}", "-".repeat(note_width)));
    }
    println!("{}  STATUS", header);
    println!("{}  {}", rule, "-".repeat(7));

    for secret in &secrets {
        let status = if secret.expired {
            "EXPIRED"
        } else if secret.expires_at.is_some() {
            "EXPIRES"
        } else {
            "OK"
        };

        let mut line = format!(
            "{}  {}  {}",
            format::pad_right(&secret.name, name_width),
            format::timestamp(secret.created_at),
            format::timestamp(secret.updated_at)
        );
        if show_notes {
            line.push_str(&format!(
                "  {}",
                format::pad_right(&format::truncate(&secret.note, 40), note_width)
            ));
        }
        println!("{}  {}", line, status);
    }

    println!();
    println!("Total: {} secret(s)", secrets.len());

    Ok(())
}

/// Delete a secret
fn cmd_delete(manager: &SecretManager, identifier: &str) -> Result<()> {
    let id = parse_identifier(identifier)?;
    manager.delete_secret(&id.name, id.database.as_deref())?;
    println!(
        "success: Secret '{}' deleted from database '{}'",
        id.name,
        id.database_or(manager.default_database())
    );
    Ok(())
}

/// Show the public key
fn cmd_key(manager: &SecretManager, database: Option<&str>) -> Result<()> {
    let pubkey = manager.public_key(database)?;
    println!("{}", pubkey);
    Ok(())
}

/// List databases
fn cmd_db_list(manager: &SecretManager) -> Result<()> {
    let databases = manager.list_databases()?;

    if databases.is_empty() {
        println!("No secrets databases found.");
        return Ok(());
    }

    println!("Available secrets databases:");
    for database in &databases {
        if database == manager.default_database() {
            println!("  {} (default)", database);
        } else {
            println!("  {}", database);
        }
    }

    Ok(())
}

/// Delete a database
fn cmd_db_delete(manager: &SecretManager, database: &str, force: bool) -> Result<()> {
    let database = database.trim();
    if database.is_empty() {
        bail!("Database name cannot be empty");
    }
    if !manager.database_exists(database)? {
        bail!("Database '{}' does not exist", database);
    }

    if !force {
        println!(
            "warning: This will permanently delete the database '{}' and ALL its secrets.",
            database
        );
        println!("  This action cannot be undone.");
        if !confirm("  Type 'yes' to confirm deletion: ")? {
            println!("Database deletion cancelled.");
            return Ok(());
        }
    }

    manager.delete_database(database)?;

    println!("success: Database '{}' deleted", database);
    if manager.has_key(Some(database)) {
        println!(
            "  Its encryption key is still in the keyring. Remove it with: indietool-secrets db purge-key {}",
            database
        );
    }

    Ok(())
}

/// Remove a database key from the keyring
fn cmd_db_purge_key(manager: &SecretManager, database: &str, force: bool) -> Result<()> {
    if !manager
        .key_exists(Some(database))
        .context("Failed to check the keyring")?
    {
        println!("No encryption key found for database '{}'", database);
        return Ok(());
    }

    if !force {
        println!(
            "warning: This removes the encryption key for database '{}' from the keyring.",
            database
        );
        println!("  Any secrets still stored in it become permanently unreadable.");
        if !confirm("  Type 'yes' to confirm: ")? {
            println!("Key purge cancelled.");
            return Ok(());
        }
    }

    manager.purge_key(database)?;
    println!("success: Encryption key for database '{}' removed", database);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indietool_secrets::keystore::CredentialError;
    use indietool_secrets::{CredentialStore, MemoryCredentials};
    use tempfile::TempDir;

    struct UnreachableKeyring;

    impl CredentialStore for UnreachableKeyring {
        fn set(&self, _: &str, _: &str) -> std::result::Result<(), CredentialError> {
            Err(CredentialError::Unavailable("locked".to_string()))
        }

        fn get(&self, _: &str) -> std::result::Result<Option<String>, CredentialError> {
            Err(CredentialError::Unavailable("locked".to_string()))
        }

        fn delete(&self, _: &str) -> std::result::Result<bool, CredentialError> {
            Err(CredentialError::Unavailable("locked".to_string()))
        }
    }

    fn manager_with(credentials: Box<dyn CredentialStore>) -> (SecretManager, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = SecretsConfig::with_storage_dir(tmp.path().join("secrets"));
        let manager = SecretManager::with_credentials(&config, credentials).unwrap();
        (manager, tmp)
    }

    #[test]
    fn test_purge_key_reports_unreachable_keyring() {
        let (manager, _tmp) = manager_with(Box::new(UnreachableKeyring));
        let err = cmd_db_purge_key(&manager, "default", true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SecretsError>(),
            Some(SecretsError::KeyringUnavailable { .. })
        ));
    }

    #[test]
    fn test_purge_key() {
        let (manager, _tmp) = manager_with(Box::new(MemoryCredentials::new()));

        // Nothing to purge is not an error
        cmd_db_purge_key(&manager, "default", true).unwrap();

        manager.init_database(None, None, false).unwrap();
        cmd_db_purge_key(&manager, "default", true).unwrap();
        assert!(!manager.key_exists(None).unwrap());
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["indietool-secrets", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Init {
                key_path: None,
                database: None,
                force: false
            })
        ));

        let cli = Cli::try_parse_from([
            "indietool-secrets",
            "set",
            "stripe-key@work",
            "sk_live_123",
            "--note",
            "prod",
        ])
        .unwrap();
        if let Some(Commands::Set {
            identifier,
            value,
            note,
            expires,
        }) = cli.command
        {
            assert_eq!(identifier, "stripe-key@work");
            assert_eq!(value.as_deref(), Some("sk_live_123"));
            assert_eq!(note.as_deref(), Some("prod"));
            assert!(expires.is_none());
        } else {
            panic!("Expected Set command");
        }

        let cli = Cli::try_parse_from(["indietool-secrets", "get", "-s", "stripe-key"]).unwrap();
        if let Some(Commands::Get {
            show,
            no_newline,
            identifier,
        }) = cli.command
        {
            assert!(show);
            assert!(!no_newline);
            assert_eq!(identifier, "stripe-key");
        } else {
            panic!("Expected Get command");
        }
    }

    #[test]
    fn test_cli_db_commands() {
        let cli =
            Cli::try_parse_from(["indietool-secrets", "db", "delete", "work", "--force"]).unwrap();
        if let Some(Commands::Db {
            command: DbCommands::Delete { database, force },
        }) = cli.command
        {
            assert_eq!(database, "work");
            assert!(force);
        } else {
            panic!("Expected db delete command");
        }

        let cli = Cli::try_parse_from(["indietool-secrets", "db", "purge-key", "old"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Db {
                command: DbCommands::PurgeKey { force: false, .. }
            })
        ));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from([
            "indietool-secrets",
            "list",
            "--config",
            "/tmp/indietool.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/indietool.yaml")));
    }

    #[test]
    fn test_parse_expires() {
        let expires = parse_expires("2025-12-31T23:59:59Z").unwrap();
        assert_eq!(expires.to_rfc3339(), "2025-12-31T23:59:59+00:00");

        let offset = parse_expires("2025-12-31T23:59:59+02:00").unwrap();
        assert_eq!(offset.to_rfc3339(), "2025-12-31T21:59:59+00:00");

        assert!(parse_expires("next tuesday").is_err());
    }

    #[test]
    fn test_parse_identifier() {
        let id = parse_identifier(" stripe-key@work ").unwrap();
        assert_eq!(id.name, "stripe-key");
        assert_eq!(id.database.as_deref(), Some("work"));

        assert!(parse_identifier("@work").is_err());
        assert!(parse_identifier("").is_err());
    }
}
