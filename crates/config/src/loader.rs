use std::path::Path;

use anyhow::bail;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;

    validate_has_accounts(&config)?;

    log::debug!(
        "loaded configuration from {} with {} account(s)",
        path.display(),
        config.accounts.len()
    );

    Ok(config)
}

pub(crate) fn validate_has_accounts(config: &Config) -> anyhow::Result<()> {
    if config.accounts.is_empty() {
        bail!(
            "No upstream accounts configured. The relay needs at least one account to forward requests.\n\
             \n\
             Example configuration:\n\
             \n\
               [accounts.copilot-main]\n\
               platform = \"copilot\"\n\
               kind = \"oauth\"\n\
             \n\
               [accounts.copilot-main.credentials]\n\
               github_token = \"gho_...\"\n"
        );
    }

    Ok(())
}
