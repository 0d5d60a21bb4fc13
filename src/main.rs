mod api;
mod auth;
mod config;
mod dialog;
mod model;
mod session;
mod shell;
mod storage;
mod views;

#[cfg(test)]
mod testing;

use api::MovieApi;
use config::Config;
use chrono::Utc;
use log::info;
use std::io;
use storage::SessionStore;

fn invalid<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("reviewflix=debug,actix_web=info"),
    )
    .init();

    let config = Config::load().map_err(invalid)?;
    let db = sled::Config::new()
        .path(&config.storage_path)
        .open()
        .map_err(invalid)?;
    let swept = db.sweep(Utc::now().timestamp()).map_err(invalid)?;
    if swept > 0 {
        info!("dropped {} expired sessions", swept);
    }
    let api = MovieApi::new(&config.api_base_url, config.api_timeout).map_err(invalid)?;

    let (server, addrs) = shell::serve(&config, db, api)?;
    info!(
        "serving on {:?}, movie API at {}",
        addrs, config.api_base_url
    );
    server.await
}
