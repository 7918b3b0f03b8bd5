use clap::Subcommand;
use replay_core::Config;

use super::{print_json, CommandResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "default_timezone", "thresholds.unlock_journals")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
}

pub fn run(ctx: &Context, action: ConfigAction) -> CommandResult {
    match action {
        ConfigAction::Get { key } => {
            let config = ctx.load_config()?;
            match config.get(&key) {
                Some(value) if key != "notifications.api_key" => println!("{value}"),
                Some(_) => println!("(hidden)"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = ctx.load_config()?;
            config.set(&key, &value)?;
            ctx.save_config(&config)?;
            println!("ok");
        }
        ConfigAction::List => {
            let mut config = ctx.load_config()?;
            if !config.notifications.api_key.is_empty() {
                config.notifications.api_key = "(hidden)".into();
            }
            print_json(&config)?;
        }
        ConfigAction::Reset => {
            ctx.save_config(&Config::default())?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
