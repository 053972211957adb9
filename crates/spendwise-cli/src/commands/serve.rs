//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendwise_server::{ServerConfig, CORS_ORIGINS_ENV};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    static_dir: Option<&Path>,
    default_user: i64,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Spendwise web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    let config = ServerConfig {
        default_user_id: default_user,
        ..ServerConfig::from_env()
    };

    if config.allowed_origins.is_empty() {
        println!("   🔒 CORS: same-origin only");
    } else {
        println!(
            "   🌐 CORS origins: {} ({})",
            config.allowed_origins.join(", "),
            CORS_ORIGINS_ENV
        );
    }
    println!("   👤 Default user: {} (override per request with x-user-id)", default_user);
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let static_dir_str = static_dir
        .map(|p| p.to_str().context("static_dir path must be valid UTF-8"))
        .transpose()?;
    spendwise_server::serve_with_config(db, host, port, static_dir_str, config).await?;

    Ok(())
}
