// ===============================
// src/commands.rs (one function per screen)
// ===============================
use std::path::Path;

use thiserror::Error;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::api::{upload_name, InventoryApi};
use crate::client::{ApiError, Navigator, Transport};
use crate::domain::Product;
use crate::forms::{build_movement, parse_quantity, validate_login, FieldErrors, ProductInput, StockIntent};
use crate::ledger::{current_stock, reconstruct, LedgerError};
use crate::metrics::{LEDGER_ROWS, STOCK_BALANCE};
use crate::render;
use crate::transport::{SessionError, SetupError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{}", render::api_error(.0).trim_end())]
    Api(#[from] ApiError),
    #[error("invalid input:\n{}", render::field_errors(.0).trim_end())]
    Input(#[from] FieldErrors),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("read {path}: {source}")]
    Read { path: String, source: std::io::Error },
}

pub async fn login<T: Transport, N: Navigator>(
    api: &InventoryApi<T, N>,
    username: &str,
    password: &str,
) -> Result<String, CliError> {
    let creds = validate_login(username, password)?;
    api.login(&creds).await?;
    Ok(format!("logged in as {}\n", creds.username))
}

pub async fn list_products<T: Transport, N: Navigator>(api: &InventoryApi<T, N>) -> Result<String, CliError> {
    let items = api.list_products().await?;
    Ok(render::products(&items))
}

pub async fn show_product<T: Transport, N: Navigator>(api: &InventoryApi<T, N>, id: i64) -> Result<String, CliError> {
    Ok(render::product(&api.get_product(id).await?))
}

pub async fn add_product<T: Transport, N: Navigator>(
    api: &InventoryApi<T, N>,
    input: ProductInput,
) -> Result<String, CliError> {
    let draft = input.into_draft()?;
    match api.create_product(&draft).await? {
        Some(created) => {
            info!(id = created.id, name = %created.name, "product created");
            Ok(format!("created product #{}\n", created.id))
        }
        None => {
            info!(name = %draft.name, "product created");
            Ok(format!("created product {}\n", draft.name))
        }
    }
}

pub async fn edit_product<T: Transport, N: Navigator>(
    api: &InventoryApi<T, N>,
    id: i64,
    input: ProductInput,
) -> Result<String, CliError> {
    let current = api.get_product(id).await?;
    let draft = input.apply_to(&current)?;
    match api.update_product(id, &draft).await? {
        Some(updated) => Ok(render::product(&updated)),
        // backend tidak mengirim ulang produk, tampilkan yang dikirim
        None => Ok(render::product(&Product {
            id,
            name: draft.name,
            price: draft.price,
            description: draft.description,
        })),
    }
}

pub async fn delete_product<T: Transport, N: Navigator>(api: &InventoryApi<T, N>, id: i64) -> Result<String, CliError> {
    api.delete_product(id).await?;
    info!(id, "product deleted");
    Ok(format!("deleted product #{id}\n"))
}

/// Product header plus its running-balance table, newest first.
pub async fn show_ledger<T: Transport, N: Navigator>(api: &InventoryApi<T, N>, id: i64) -> Result<String, CliError> {
    let product = api.get_product(id).await?;
    let history = api.movements(id).await?;
    let rows = reconstruct(&history)?;

    let label = id.to_string();
    STOCK_BALANCE.with_label_values(&[&label]).set(current_stock(&rows));
    LEDGER_ROWS.with_label_values(&[&label]).set(rows.len() as i64);

    Ok(format!("{}\n{}", render::product(&product), render::ledger(&rows)))
}

/// Single submit path for the stock form; `intent` says which button was used.
pub async fn submit_stock<T: Transport, N: Navigator>(
    api: &InventoryApi<T, N>,
    id: i64,
    intent: StockIntent,
    raw_quantity: &str,
) -> Result<String, CliError> {
    let quantity = parse_quantity(raw_quantity)?;
    let product = api.get_product(id).await?;
    let ledger = reconstruct(&api.movements(id).await?)?;
    let movement = build_movement(&product, &ledger, intent, quantity)?;

    api.record_movement(&movement).await?;
    info!(id, kind = movement.kind.label(), quantity, inventory = movement.inventory, "movement recorded");

    // tampilkan ulang histori terbaru, seperti halaman stok setelah submit
    show_ledger(api, id).await
}

pub async fn import_file<T: Transport, N: Navigator>(api: &InventoryApi<T, N>, path: &Path) -> Result<String, CliError> {
    if !path.is_file() {
        let mut errs = FieldErrors::default();
        errs.push("file", "select a file to import");
        return Err(errs.into());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CliError::Read { path: path.display().to_string(), source })?;
    info!(path = %path.display(), size = bytes.len(), "uploading import file");
    let result = api.import_file(&upload_name(path), bytes).await?;
    Ok(format!("import accepted: {result}\n"))
}

/// Re-render the ledger every `every` until ctrl-c. Only a login redirect ends the loop early.
pub async fn watch<T: Transport, N: Navigator>(api: &InventoryApi<T, N>, id: i64, every: Duration) -> Result<(), CliError> {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                match show_ledger(api, id).await {
                    Ok(text) => println!("{text}"),
                    Err(e @ CliError::Api(ApiError::RedirectedToLogin { .. })) => return Err(e),
                    Err(e) => warn!(%e, "ledger refresh failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                return Ok(());
            }
        }
    }
}
