//! `yips config`: configuration management commands.

use yips_config::AppConfig;

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_toml());
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", config_path().display());

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  Config error: {e}");
            return Err(e.into());
        }
    };
    println!("  Config is valid");

    let root = config.workspace.resolve_root();
    if !root.is_dir() {
        println!("  Warning: workspace root {} is not a directory", root.display());
    }
    if config.backend.base_url.starts_with("https://") && config.backend.api_key.is_none() {
        println!("  Warning: remote backend without an API key (set YIPS_API_KEY)");
    }

    println!();
    println!("  Backend:    {}", config.backend.base_url);
    println!("  Model:      {}", config.backend.model);
    println!("  Workspace:  {}", root.display());
    println!("  Rounds:     {}", config.agent.max_rounds);
    println!("  Subagents:  {}", config.agent.enable_subagents);
    println!("  Approval:   {:?}", config.approval.mode);
    Ok(())
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}
