pub mod ask;
pub mod ingest;
pub mod init;
pub mod serve;
pub mod sessions;

use ragachat_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
