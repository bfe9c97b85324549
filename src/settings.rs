//! Settings screen model.
//!
//! The host renders these entries and reports edits back through
//! [`apply`]; storage goes through [`SourceConfig`].

use crate::config::{DEFAULT_API_URL, DEFAULT_BASE_URL, SourceConfig};
use crate::cookies::PersistentCookieStore;
use crate::error::ConfigError;
use tracing::info;

// settings keys
pub const BASE_URL_KEY: &str = "overrideBaseUrl";
pub const API_URL_KEY: &str = "overrideApiUrl";
pub const RESTORE_DEFAULTS_KEY: &str = "defaultPref";
pub const CLEAR_COOKIES_KEY: &str = "clear_cookies";

const RESTART_MESSAGE: &str = "Reinicie o app para aplicar";
const COOKIES_CLEARED_MESSAGE: &str = "Cookies limpos!";

/// What kind of control a setting is.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    /// Free text with a dialog.
    EditText {
        value: String,
        default: String,
        dialog_message: String,
    },
    Switch {
        value: bool,
    },
    /// Tapping runs an action; nothing is stored.
    Action,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub key: &'static str,
    pub title: &'static str,
    pub summary: String,
    pub kind: SettingKind,
}

/// A user interaction with the settings screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Text { key: String, value: String },
    Toggle { key: String, value: bool },
    Trigger { key: String },
}

/// Entries of the settings screen, in display order.
pub fn setting_screen(config: &SourceConfig) -> Vec<Setting> {
    vec![
        url_setting(BASE_URL_KEY, "URL Base", config.base_url(), DEFAULT_BASE_URL),
        url_setting(API_URL_KEY, "URL da API", config.api_url(), DEFAULT_API_URL),
        Setting {
            key: RESTORE_DEFAULTS_KEY,
            title: "Redefinir configurações",
            summary: "Restaura valores padrão no próximo início".to_string(),
            kind: SettingKind::Switch {
                value: config.restore_defaults_enabled(),
            },
        },
        Setting {
            key: CLEAR_COOKIES_KEY,
            title: "Limpar cookies",
            summary: "Remove todos os dados de navegação".to_string(),
            kind: SettingKind::Action,
        },
    ]
}

fn url_setting(key: &'static str, title: &'static str, value: String, default: &str) -> Setting {
    Setting {
        key,
        title,
        summary: format!("Clique para editar\nPadrão: {default}"),
        kind: SettingKind::EditText {
            value,
            default: default.to_string(),
            dialog_message: format!("URL padrão:\n{default}"),
        },
    }
}

/// Stores a change and returns the message to show the user, if any.
pub fn apply(
    config: &SourceConfig,
    cookies: &PersistentCookieStore,
    change: SettingChange,
) -> Result<Option<&'static str>, ConfigError> {
    match change {
        SettingChange::Text { key, value } if key == BASE_URL_KEY => {
            config.set_base_url(&value)?;
            Ok(None)
        }
        SettingChange::Text { key, value } if key == API_URL_KEY => {
            config.set_api_url(&value)?;
            Ok(None)
        }
        SettingChange::Toggle { key, value } if key == RESTORE_DEFAULTS_KEY => {
            config.set_restore_defaults(value)?;
            Ok(Some(RESTART_MESSAGE))
        }
        SettingChange::Trigger { key } if key == CLEAR_COOKIES_KEY => {
            cookies.clear()?;
            info!(key = cookies.key(), "cleared cookies");
            Ok(Some(COOKIES_CLEARED_MESSAGE))
        }
        SettingChange::Text { key, .. }
        | SettingChange::Toggle { key, .. }
        | SettingChange::Trigger { key } => Err(ConfigError::InvalidValue {
            key,
            message: "unknown setting".to_string(),
        }),
    }
}
