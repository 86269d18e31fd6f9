use crate::cli::ConfigCommands;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Profile changes requested on the command line
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub database_url: Option<String>,
    pub user_id: Option<String>,
    pub backup_retention_days: Option<u32>,
    pub auto_backup_interval_hours: Option<u32>,
    pub device_liveness_days: Option<u32>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
        ConfigCommands::Set {
            profile,
            database_url,
            user_id,
            backup_retention_days,
            auto_backup_interval_hours,
            device_liveness_days,
            no_activate,
        } => run_config_set(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                database_url,
                user_id,
                backup_retention_days,
                auto_backup_interval_hours,
                device_liveness_days,
            },
            no_activate,
        ),
    }
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    println!("Profile: {profile_name}");
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn run_config_set(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    apply_profile_update(config.profile_mut_or_default(&profile_name), update)?;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    Ok(())
}

pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(update.database_url) {
        if !moyun_core::util::is_http_url(&url) {
            return Err(CliError::Config(format!(
                "database URL must include http:// or https:// (got {url})"
            )));
        }
        profile.database_url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(user_id) = normalize_text_option(update.user_id) {
        profile.user_id = Some(user_id);
    }
    if let Some(days) = update.backup_retention_days {
        profile.engine.backup_retention_days = days;
    }
    if let Some(hours) = update.auto_backup_interval_hours {
        profile.engine.auto_backup_interval_hours = hours;
    }
    if let Some(days) = update.device_liveness_days {
        profile.engine.device_liveness_days = days;
    }
    Ok(())
}
