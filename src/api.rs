// ===============================
// src/api.rs (inventory endpoints)
// ===============================
use std::path::Path;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::client::{ApiError, AuthClient, Navigator, Payload, RequestOptions, Transport, LOGIN_PATH};
use crate::domain::{Credentials, MovementKind, MovementRecord, NewMovement, Product, ProductDraft};

const PRODUCTS_PATH: &str = "/api/inventory/products/";
const INVENTORIES_PATH: &str = "/api/inventory/inventories/";
const PURCHASES_PATH: &str = "/api/inventory/purchases/";
const SALES_PATH: &str = "/api/inventory/sales/";
const SYNC_PATH: &str = "/api/inventory/sync/";

pub struct InventoryApi<T, N> {
    client: AuthClient<T, N>,
}

impl<T: Transport, N: Navigator> InventoryApi<T, N> {
    pub fn new(client: AuthClient<T, N>) -> Self {
        Self { client }
    }

    #[cfg(test)]
    pub fn client(&self) -> &AuthClient<T, N> {
        &self.client
    }

    async fn call<R: DeserializeOwned>(&self, method: Method, path: &str, payload: Payload) -> Result<R, ApiError> {
        let v = self.client.request(method, path, payload, RequestOptions::default()).await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn call_json<B: Serialize, R: DeserializeOwned>(&self, method: Method, path: &str, body: &B) -> Result<R, ApiError> {
        let payload = Payload::Json(serde_json::to_value(body)?);
        self.call(method, path, payload).await
    }

    pub async fn login(&self, creds: &Credentials) -> Result<(), ApiError> {
        let _: Value = self.call_json(Method::POST, LOGIN_PATH, creds).await?;
        info!(username = %creds.username, "logged in");
        Ok(())
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.call(Method::GET, PRODUCTS_PATH, Payload::Empty).await
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, ApiError> {
        self.call(Method::GET, &format!("{PRODUCTS_PATH}{id}"), Payload::Empty).await
    }

    /// `None` when the backend confirms with an empty body (201/204).
    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Option<Product>, ApiError> {
        self.call_json(Method::POST, PRODUCTS_PATH, draft).await
    }

    pub async fn update_product(&self, id: i64, draft: &ProductDraft) -> Result<Option<Product>, ApiError> {
        self.call_json(Method::PUT, &format!("{PRODUCTS_PATH}{id}"), draft).await
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        let _: Value = self.call(Method::DELETE, &format!("{PRODUCTS_PATH}{id}"), Payload::Empty).await?;
        Ok(())
    }

    /// Movement history for one product, oldest first as the backend sends it.
    pub async fn movements(&self, product_id: i64) -> Result<Vec<MovementRecord>, ApiError> {
        self.call(Method::GET, &format!("{INVENTORIES_PATH}{product_id}"), Payload::Empty).await
    }

    pub async fn record_movement(&self, movement: &NewMovement) -> Result<Value, ApiError> {
        let path = match movement.kind {
            MovementKind::Purchase => PURCHASES_PATH,
            MovementKind::Sale => SALES_PATH,
        };
        self.call_json(Method::POST, path, movement).await
    }

    pub async fn import_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value, ApiError> {
        let payload = Payload::Multipart { field: "file".to_string(), file_name: file_name.to_string(), bytes };
        self.call(Method::POST, SYNC_PATH, payload).await
    }
}

/// File name sent with a bulk import upload.
pub fn upload_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "upload".to_string())
}
