// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{debug, error, info, warn};

// semua metric client + stok hidup di registry ini
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- HTTP client --------
pub static HTTP_RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_responses_total", "backend responses by status class"),
        &["class"],
    )
    .unwrap()
});

pub static AUTH_REFRESH: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("auth_refresh_total", "silent session refresh attempts (label: result)"),
        &["result"],
    )
    .unwrap()
});

pub static REPLAYS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("request_replays_total", "requests replayed after refresh").unwrap());

pub static LOGIN_REDIRECTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("login_redirects_total", "navigations to the login entry point").unwrap());

// -------- Inventory --------
pub static STOCK_BALANCE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("stock_balance", "last reconstructed stock per product"),
        &["product"],
    )
    .unwrap()
});

pub static LEDGER_ROWS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("ledger_rows", "movement rows in the last reconstruction"),
        &["product"],
    )
    .unwrap()
});

pub fn init() {
    let collectors: [Box<dyn Collector>; 6] = [
        Box::new(HTTP_RESPONSES.clone()),
        Box::new(AUTH_REFRESH.clone()),
        Box::new(REPLAYS.clone()),
        Box::new(LOGIN_REDIRECTS.clone()),
        Box::new(STOCK_BALANCE.clone()),
        Box::new(LEDGER_ROWS.clone()),
    ];
    for c in collectors {
        // init() kedua (tests) -> AlreadyReg, aman diabaikan
        if let Err(e) = REGISTRY.register(c) {
            debug!(?e, "metric already registered");
        }
    }
}

pub fn status_class(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        401 => "401",
        422 => "422",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// Current scrape of REGISTRY in the text exposition format.
fn scrape_body() -> Vec<u8> {
    let mut body = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut body) {
        warn!(?e, "metrics encode failed");
        body.clear();
    }
    body
}

/// Whatever path is asked for, the answer is the scrape; one request per connection.
fn answer_scrape(mut stream: TcpStream) -> io::Result<()> {
    let mut request = [0u8; 1024];
    let n = stream.read(&mut request)?;
    debug!(bytes = n, "metrics scrape");

    let body = scrape_body();
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        TextEncoder::new().format_type(),
        body.len()
    )?;
    stream.write_all(&body)?;
    stream.flush()
}

/// Runs on a dedicated OS thread; bind failure is logged, not fatal.
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        info!(%addr, "metrics listening");

        for conn in listener.incoming() {
            let served = conn.and_then(answer_scrape);
            if let Err(e) = served {
                warn!(?e, "metrics connection failed");
            }
        }
    });
}
