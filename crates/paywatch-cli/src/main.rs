//! paywatch - create invoices and check whether they have been paid.
//!
//! Thin front end over `paywatch-core`. Invoice commands work offline
//! against the local registry; `check` and `auth-check` talk to the
//! upstream using the stored session and PIN.

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use paywatch_core::utils::format_timestamp;
use paywatch_core::{
    ApiError, Config, CredentialStore, InvoiceRegistry, PaymentCheck, PaymentMatcher, Pin,
    SessionCredentials,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::watch;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// PIN override; otherwise the keychain is used
const PIN_ENV: &str = "PAYWATCH_PIN";

/// Raw cookie header (`a=1; b=2`) or JSON object to seed the session with
const COOKIE_ENV: &str = "PAYWATCH_COOKIE";

/// Exit code when the invoice exists but is not paid yet
const EXIT_NOT_PAID: u8 = 2;

/// Exit code when there is no pending invoice for the amount
const EXIT_NO_INVOICE: u8 = 3;

const USAGE: &str = "\
Usage: paywatch <command>

Commands:
  create <amount> [payload-json]   Register an invoice, print the assigned amount
  check <amount> [--keep]          Check whether the invoice has been paid
  delete <amount>                  Remove a pending invoice
  list                             Show pending invoices
  set-pin                          Store the account PIN in the keychain
  clear-pin                        Remove the account PIN from the keychain
  seed-cookies <cookie-header>     Store a browser session
  auth-check                       Ask the upstream whether the session is valid
  init-config                      Write the default config file if none exists

Environment:
  PAYWATCH_PIN     PIN used instead of the keychain entry
  PAYWATCH_COOKIE  Session to seed before running the command
  RUST_LOG         Log filter (default: warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "paywatch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;
    let data_dir = config.data_dir()?;
    let _log_guard = init_tracing(&data_dir.join("logs"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    };
    info!(command = %command, "paywatch starting");

    match command.as_str() {
        "create" => {
            let amount = parse_amount(args.get(1))?;
            let payload = match args.get(2) {
                Some(raw) => serde_json::from_str(raw).context("Payload must be valid JSON")?,
                None => Value::Null,
            };
            let registry = InvoiceRegistry::open(&data_dir)?.with_step(config.amount_step)?;
            let assigned = registry.create(amount, payload)?;
            println!("{}", assigned);
            Ok(ExitCode::SUCCESS)
        }
        "delete" => {
            let amount = parse_amount(args.get(1))?;
            let registry = InvoiceRegistry::open(&data_dir)?;
            if registry.delete(amount)? {
                println!("Removed invoice {}", amount);
            } else {
                println!("No pending invoice for {}", amount);
            }
            Ok(ExitCode::SUCCESS)
        }
        "list" => {
            let registry = InvoiceRegistry::open(&data_dir)?;
            for invoice in registry.list() {
                println!(
                    "{:>12}  {}  {}",
                    invoice.amount,
                    format_timestamp(&invoice.created_at),
                    invoice.payload
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        "set-pin" => {
            let pin = rpassword::prompt_password("PIN: ").context("Failed to read PIN")?;
            let store = CredentialStore::new(&data_dir, config.keyring_account.clone());
            let replacing = store.has_pin();
            store.store_pin(&Pin::new(pin.trim()))?;
            if replacing {
                println!("PIN replaced in keychain");
            } else {
                println!("PIN stored in keychain");
            }
            Ok(ExitCode::SUCCESS)
        }
        "clear-pin" => {
            let store = CredentialStore::new(&data_dir, config.keyring_account.clone());
            if store.has_pin() {
                store.delete_pin()?;
                println!("PIN removed from keychain");
            } else {
                println!("No PIN stored");
            }
            Ok(ExitCode::SUCCESS)
        }
        "init-config" => {
            let path = Config::config_path()?;
            if path.exists() {
                println!("Config already exists at {}", path.display());
            } else {
                config.save()?;
                println!("Wrote default config to {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        "seed-cookies" => {
            let raw = args.get(1).context("Missing cookie header")?;
            let credentials = parse_cookies(raw)?;
            let store = CredentialStore::new(&data_dir, config.keyring_account.clone());
            store.save_cookies(&credentials)?;
            println!("Stored {} session cookies", credentials.len());
            Ok(ExitCode::SUCCESS)
        }
        "check" => {
            let amount = parse_amount(args.get(1))?;
            let keep = args.iter().any(|a| a == "--keep");
            let matcher = connect(&config, &data_dir)?;

            match matcher.check_paid(amount, !keep).await.map_err(session_hint)? {
                PaymentCheck::Paid(operation) => {
                    println!(
                        "Payment of {} found at {} ({})",
                        operation.amount,
                        operation.timestamp,
                        operation.id().unwrap_or("no id")
                    );
                    Ok(ExitCode::SUCCESS)
                }
                PaymentCheck::NotPaid => {
                    println!("No payment for {} yet", amount);
                    Ok(ExitCode::from(EXIT_NOT_PAID))
                }
                PaymentCheck::NoInvoice => {
                    println!("No pending invoice for {}", amount);
                    Ok(ExitCode::from(EXIT_NO_INVOICE))
                }
            }
        }
        "auth-check" => {
            let matcher = connect(&config, &data_dir)?;
            let response = matcher.client().auth_check().await.map_err(session_hint)?;
            println!("{} {}", response.status(), response.text());
            Ok(if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(ExitCode::SUCCESS)
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Build a matcher for upstream commands, cancelled on Ctrl-C.
fn connect(config: &Config, data_dir: &Path) -> Result<PaymentMatcher> {
    let seed = match std::env::var(COOKIE_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Some(parse_cookies(&raw)?),
        _ => None,
    };
    let pin = match std::env::var(PIN_ENV) {
        Ok(pin) if !pin.trim().is_empty() => Pin::new(pin.trim()),
        _ => CredentialStore::new(data_dir, config.keyring_account.clone())
            .pin()
            .context("No PIN available; run `paywatch set-pin` or set PAYWATCH_PIN")?,
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    Ok(PaymentMatcher::from_config(config, seed, pin)?.with_cancellation(cancel_rx))
}

/// Point at the fix when the upstream refused the stored session.
fn session_hint(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_auth() => err.context(
            "Session rejected; check the PIN or re-seed cookies with `paywatch seed-cookies`",
        ),
        _ => err,
    }
}

fn parse_amount(arg: Option<&String>) -> Result<Decimal> {
    let Some(raw) = arg else {
        bail!("Missing amount");
    };
    raw.replace(',', ".")
        .parse::<Decimal>()
        .with_context(|| format!("Invalid amount: {}", raw))
}

/// Accept either a raw `Cookie` header or a JSON object of name -> value.
fn parse_cookies(raw: &str) -> Result<SessionCredentials> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        let map: std::collections::BTreeMap<String, String> =
            serde_json::from_str(raw).context("Cookie JSON must map names to string values")?;
        return Ok(SessionCredentials::from_map(map));
    }
    let credentials = SessionCredentials::from_cookie_header(raw);
    if credentials.is_empty() {
        bail!("No cookies found in the supplied header");
    }
    Ok(credentials)
}
