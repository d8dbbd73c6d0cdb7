//! Environment handling for config values.
//!
//! `${VAR_NAME}` references in string values are resolved at load time.
//! Only uppercase `[A-Z_][A-Z0-9_]*` names are matched and `$${VAR}` escapes
//! to a literal `${VAR}`. After substitution, the deployment variables
//! `CORPSEWATCH_BOT_TOKEN` / `CORPSEWATCH_BOT_NAME` override the file's bot
//! credentials.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

use crate::schema::CorpseWatchConfig;

pub const BOT_TOKEN_ENV: &str = "CORPSEWATCH_BOT_TOKEN";
pub const BOT_NAME_ENV: &str = "CORPSEWATCH_BOT_NAME";

/// `$${VAR}` (escaped) or `${VAR}`.
static ENV_REF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").expect("env reference pattern"));

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references from the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value, MissingEnvVarError> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute `${VAR}` references from `env`. A variable that is unset or
/// empty is an error.
pub fn resolve_env_vars_with(
    value: &Value,
    env: &HashMap<String, String>,
) -> Result<Value, MissingEnvVarError> {
    substitute_value(value, env, "")
}

fn substitute_value(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_REF_PATTERN.replace_all(s, |caps: &Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match env.get(name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(substituted.into_owned()),
    }
}

/// Override bot credentials from the deployment environment. Applies only
/// when both variables are set and non-empty.
pub fn apply_env_overrides(
    mut config: CorpseWatchConfig,
    env: &HashMap<String, String>,
) -> CorpseWatchConfig {
    let token = env.get(BOT_TOKEN_ENV).filter(|v| !v.is_empty());
    let name = env.get(BOT_NAME_ENV).filter(|v| !v.is_empty());
    if let (Some(token), Some(name)) = (token, name) {
        info!(bot = %name, "Bot credentials taken from environment");
        config.telegram.bot_token = Some(token.clone());
        config.telegram.bot_name = Some(name.clone());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_nested_var() {
        let v = json!({"telegram": {"botToken": "${TG_TOKEN}"}});
        let result = resolve_env_vars_with(&v, &env(&[("TG_TOKEN", "123:abc")])).unwrap();
        assert_eq!(result["telegram"]["botToken"], "123:abc");
    }

    #[test]
    fn missing_var_names_the_path() {
        let v = json!({"telegram": {"botToken": "${MISSING_VAR}"}});
        let err = resolve_env_vars_with(&v, &HashMap::new()).unwrap_err();
        assert_eq!(err.var_name, "MISSING_VAR");
        assert_eq!(err.config_path, "telegram.botToken");
    }

    #[test]
    fn escaped_reference_is_kept_literally() {
        let v = json!({"messages": {"loser": "$${NAME} loses, ${WHO}"}});
        let result = resolve_env_vars_with(&v, &env(&[("WHO", "bob")])).unwrap();
        assert_eq!(result["messages"]["loser"], "${NAME} loses, bob");
    }

    #[test]
    fn non_string_values_pass_through() {
        let v = json!({"chats": {"allowed": [-100, -200]}, "sync": {"intervalSecs": 60}});
        assert_eq!(resolve_env_vars_with(&v, &HashMap::new()).unwrap(), v);
    }

    #[test]
    fn overrides_require_both_variables() {
        let only_token = apply_env_overrides(
            CorpseWatchConfig::default(),
            &env(&[(BOT_TOKEN_ENV, "999:zzz")]),
        );
        assert!(only_token.telegram.bot_token.is_none());

        let both = apply_env_overrides(
            CorpseWatchConfig::default(),
            &env(&[(BOT_TOKEN_ENV, "999:zzz"), (BOT_NAME_ENV, "env_bot")]),
        );
        assert_eq!(both.telegram.bot_token.as_deref(), Some("999:zzz"));
        assert_eq!(both.telegram.bot_name.as_deref(), Some("env_bot"));
    }
}
