//! `reviewdock config`: show the resolved configuration.

use reviewdock_engine::ClientConfig;

use crate::paths::DataDir;

pub fn run(data_dir: &DataDir, config: &ClientConfig) -> anyhow::Result<()> {
    let config_path = data_dir.config_path();
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };

    println!();
    println!("  Data dir: {}", data_dir.root().display());
    println!("  Config:   {source}");
    println!("  Logs:     {}", data_dir.log_dir().display());
    println!("  Endpoint: {}", config.endpoint_url()?);
    println!();
    for line in toml::to_string_pretty(config)?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}
