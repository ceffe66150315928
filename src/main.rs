// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/inventory_client

 # login sekali, session cookie disimpan di .inventory_session.json
 cargo run -- login --username admin --password 'rahasia123'

 # histori stok produk #3 (terbaru di atas)
 cargo run -- ledger 3

 # pantau stok + metrics
 METRICS_PORT=9898 cargo run -- watch 3 --interval-secs 10
 curl -s localhost:9898/metrics | grep '^stock_balance'
*/
/*
=============================================================================
Project : inventory_client — async CLI for the inventory REST backend
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Logs in against the inventory backend (cookie session with silent
          refresh), manages products, records purchases/wholesales, rebuilds
          the running stock ledger and uploads bulk sales imports.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod api;
mod client;
mod commands;
mod config;
mod domain;
mod forms;
mod ledger;
mod metrics;
mod render;
mod transport;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::InventoryApi;
use crate::client::{AuthClient, Navigator};
use crate::commands::CliError;
use crate::forms::{ProductInput, StockIntent};
use crate::transport::{ReqwestTransport, SessionStore};

#[derive(Debug, Parser)]
#[command(name = "inventory_client", version, about = "Inventory management client")]
struct Cli {
    /// Backend base address (overrides INVENTORY_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and keep the session cookie
    Login {
        #[arg(long)]
        username: String,
        /// Falls back to INVENTORY_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    #[command(subcommand)]
    Products(ProductCommand),
    /// Product detail with its stock history
    Ledger { id: i64 },
    /// Record incoming stock
    Purchase { id: i64, quantity: String },
    /// Record outgoing stock
    Wholesale { id: i64, quantity: String },
    /// Upload a bulk sales file
    Import { file: PathBuf },
    /// Refresh the ledger periodically
    Watch {
        id: i64,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

#[derive(Debug, Subcommand)]
enum ProductCommand {
    List,
    Show { id: i64 },
    Add {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete { id: i64 },
}

/// CLI version of leaving the page: the stored session goes with it.
struct LoginRedirect {
    session: Option<SessionStore>,
}

impl Navigator for LoginRedirect {
    fn redirect_to_login(&self, target: &str) {
        warn!(%target, "session unusable, login required");
        if let Some(store) = &self.session {
            if let Err(e) = store.clear() {
                warn!(?e, "could not drop session file");
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ---- Config (.env dulu, supaya RUST_LOG ikut terbaca) ----
    let args = config::load();

    // ---- Logging ke stderr, stdout untuk tabel ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    // ---- Metrics ----
    metrics::init();

    match run(cli, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, mut args: config::Args) -> Result<(), CliError> {
    if let Some(base) = cli.base_url {
        args.base_url = base;
    }
    let session = args.session_file.as_deref().map(SessionStore::new);

    if let Command::Logout = cli.command {
        if let Some(store) = &session {
            store.clear()?;
        }
        println!("session cleared");
        return Ok(());
    }

    let navigator = LoginRedirect { session: session.clone() };
    let transport = ReqwestTransport::new(&args.base_url, args.request_timeout, session)?;
    let client = AuthClient::new(transport, navigator, &args.login_redirect, args.request_deadline());
    let api = InventoryApi::new(client);
    info!(base_url = %args.base_url, session_file = ?args.session_file, "client ready");

    let output = match cli.command {
        Command::Login { username, password } => {
            let password = password.or_else(|| std::env::var("INVENTORY_PASSWORD").ok()).unwrap_or_default();
            commands::login(&api, &username, &password).await?
        }
        Command::Logout => String::new(),
        Command::Products(cmd) => match cmd {
            ProductCommand::List => commands::list_products(&api).await?,
            ProductCommand::Show { id } => commands::show_product(&api, id).await?,
            ProductCommand::Add { name, price, description } => {
                commands::add_product(&api, ProductInput { name, price, description }).await?
            }
            ProductCommand::Edit { id, name, price, description } => {
                commands::edit_product(&api, id, ProductInput { name, price, description }).await?
            }
            ProductCommand::Delete { id } => commands::delete_product(&api, id).await?,
        },
        Command::Ledger { id } => commands::show_ledger(&api, id).await?,
        Command::Purchase { id, quantity } => {
            commands::submit_stock(&api, id, StockIntent::Purchase, &quantity).await?
        }
        Command::Wholesale { id, quantity } => {
            commands::submit_stock(&api, id, StockIntent::Wholesale, &quantity).await?
        }
        Command::Import { file } => commands::import_file(&api, &file).await?,
        Command::Watch { id, interval_secs } => {
            if let Some(port) = args.metrics_port {
                metrics::serve_metrics(port);
            }
            commands::watch(&api, id, Duration::from_secs(interval_secs.max(1))).await?;
            String::new()
        }
    };
    print!("{output}");
    Ok(())
}
