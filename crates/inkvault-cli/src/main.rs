use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use inkvault_core::error::CryptoError;
use inkvault_core::password::{PasswordError, PasswordHash};
use inkvault_core::paths::settings_path;
use inkvault_core::settings::SettingsStore;
use inkvault_core::{EncryptionEngine, PasswordGuard};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const PASSWORD_ENV: &str = "INKVAULT_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about = "Inkvault encrypted notes", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a note file into an envelope
    Encrypt {
        input: PathBuf,
        /// Output path (defaults to `<input>.enc`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// aes256 or chacha20 (defaults to the configured cipher)
        #[arg(short, long)]
        algorithm: Option<String>,
    },
    /// Decrypt an envelope back to plain text
    Decrypt {
        input: PathBuf,
        /// Output path (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score a password and list suggestions
    Strength { password: Option<String> },
    /// Print a PBKDF2 hash record for a password as JSON
    HashPassword,
    /// Check a password against a JSON hash record
    VerifyPassword { hash_file: PathBuf },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Autosave interval in minutes (1-60)
    SetInterval { minutes: u32 },
    SetEncryption { algorithm: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = SettingsStore::new(match cli.settings {
        Some(path) => path,
        None => settings_path()?,
    });

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            algorithm,
        } => encrypt_command(&store, &input, output, algorithm),
        Commands::Decrypt { input, output } => decrypt_command(&input, output),
        Commands::Strength { password } => strength_command(password),
        Commands::HashPassword => hash_command(),
        Commands::VerifyPassword { hash_file } => verify_command(&hash_file),
        Commands::Settings { action } => settings_command(&store, action.unwrap_or(SettingsAction::Show)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn encrypt_command(
    store: &SettingsStore,
    input: &Path,
    output: Option<PathBuf>,
    algorithm: Option<String>,
) -> Result<()> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let algorithm = match algorithm {
        Some(a) => a,
        None => store.load()?.default_encryption.to_string(),
    };

    let engine = EncryptionEngine::new();
    let password = prompt_password_twice("Note password")?;
    if !engine.validate_password(&password) {
        let (_, suggestions) = PasswordGuard::new().check_password_strength(&password);
        bail!(
            "password does not meet policy (8-128 chars, upper, lower, digit, symbol): {}",
            suggestions.join("; ")
        );
    }

    let sealed = engine.encrypt_content(&content, &password, &algorithm)?;
    let output = output.unwrap_or_else(|| append_extension(input, "enc"));
    fs::write(&output, sealed).with_context(|| format!("failed to write {}", output.display()))?;
    info!(path = %output.display(), %algorithm, "note encrypted");
    println!("Encrypted {} -> {}", input.display(), output.display());
    Ok(())
}

fn decrypt_command(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let envelope =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let engine = EncryptionEngine::new();
    let guard = PasswordGuard::new();
    let identifier = input.display().to_string();

    let plaintext = loop {
        let password = prompt_password_once("Note password")?;
        match engine.decrypt_content(&envelope, &password, "") {
            Ok(text) => {
                guard.reset_retry_count(&identifier);
                break Zeroizing::new(text);
            }
            Err(CryptoError::AeadDecrypt) => {
                debug!(identifier = %identifier, "wrong password");
                if let Err(e) = guard.record_failed_attempt(&identifier) {
                    return Err(lockout_error(e));
                }
                eprintln!("Wrong password, try again.");
                if std::env::var(PASSWORD_ENV).is_ok() {
                    bail!("wrong password");
                }
            }
            Err(CryptoError::ChecksumMismatch) => {
                bail!("{} is corrupted (checksum mismatch)", input.display())
            }
            Err(e) => return Err(e.into()),
        }
    };

    match output {
        Some(path) => {
            fs::write(&path, plaintext.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Decrypted {} -> {}", input.display(), path.display());
        }
        None => print!("{}", plaintext.as_str()),
    }
    Ok(())
}

fn lockout_error(err: PasswordError) -> anyhow::Error {
    match err.lock_remaining() {
        Some(remaining) => anyhow!(
            "too many wrong passwords, try again in {} seconds",
            remaining.as_secs().max(1)
        ),
        None => err.into(),
    }
}

fn strength_command(password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => Zeroizing::new(p),
        None => prompt_password_once("Password to check")?,
    };
    let (level, suggestions) = PasswordGuard::new().check_password_strength(&password);
    println!("Strength: {level}");
    for s in suggestions {
        println!("  - {s}");
    }
    Ok(())
}

fn hash_command() -> Result<()> {
    let password = prompt_password_twice("Password")?;
    let hash = PasswordGuard::new().hash_password(&password)?;
    println!("{}", serde_json::to_string_pretty(&hash)?);
    Ok(())
}

fn verify_command(hash_file: &Path) -> Result<()> {
    let data = fs::read(hash_file)
        .with_context(|| format!("failed to read {}", hash_file.display()))?;
    let hash: PasswordHash = serde_json::from_slice(&data)?;
    let password = prompt_password_once("Password")?;
    if PasswordGuard::new().verify_password(&password, Some(&hash))? {
        println!("Password matches");
        Ok(())
    } else {
        bail!("password does not match")
    }
}

fn settings_command(store: &SettingsStore, action: SettingsAction) -> Result<()> {
    let mut settings = store.load()?;
    match action {
        SettingsAction::Show => {
            println!("# {}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        SettingsAction::SetInterval { minutes } => settings.update_auto_save_interval(minutes)?,
        SettingsAction::SetEncryption { algorithm } => settings.update_encryption(&algorithm)?,
    }
    store.save(&settings)?;
    info!(path = %store.path().display(), "settings saved");
    println!("Settings updated");
    Ok(())
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(format!("{prompt}: "))
        .map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ")
            .map_err(|e| anyhow!("password prompt: {e}"))?,
    );
    if *first != *second {
        bail!("passwords do not match");
    }
    Ok(first)
}
