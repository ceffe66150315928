// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : inventory_client — async CLI for the inventory REST backend
Module  : config.rs
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
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOGIN_REDIRECT: &str = "/login/";
pub const DEFAULT_SESSION_FILE: &str = ".inventory_session.json";

#[derive(Clone, Debug)]
pub struct Args {
    pub base_url: String,
    pub login_redirect: String,
    /// `None` = session hanya di memori (INVENTORY_SESSION_FILE=none)
    pub session_file: Option<String>,
    /// Per HTTP call; the full send/refresh/replay cycle gets three of these.
    pub request_timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl Args {
    pub fn request_deadline(&self) -> Duration {
        self.request_timeout * 3
    }
}

pub fn load() -> Args {
    // Pastikan .env dibaca sebelum env lain (termasuk RUST_LOG)
    let _ = dotenv();

    let base_url = env::var("INVENTORY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let login_redirect = env::var("LOGIN_REDIRECT_URL").unwrap_or_else(|_| DEFAULT_LOGIN_REDIRECT.to_string());

    let session_file = match env::var("INVENTORY_SESSION_FILE") {
        Ok(v) if v.trim().is_empty() || v.eq_ignore_ascii_case("none") => None,
        Ok(v) => Some(v),
        Err(_) => Some(DEFAULT_SESSION_FILE.to_string()),
    };

    let request_timeout = env::var("REQUEST_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(15_000));

    let metrics_port = env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok());

    Args { base_url, login_redirect, session_file, request_timeout, metrics_port }
}
