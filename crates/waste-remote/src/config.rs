// Configuración del adaptador HTTP a partir del entorno (o de un `.env`).
use std::time::Duration;
use thiserror::Error;

/// Timeout por defecto de cada petición, en segundos.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("{0} no está definida")]
  Missing(&'static str),
  #[error("valor inválido para {var}: {value}")]
  Invalid { var: &'static str, value: String },
}

/// Parámetros del servidor remoto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
  /// URL base sin barra final, p. ej. `https://api.example.com`.
  pub base_url: String,
  /// Token bearer; `None` para peticiones anónimas.
  pub token: Option<String>,
  /// Identidad del dispositivo enviada junto al token.
  pub device_id: Option<String>,
  pub timeout: Duration,
}

impl RemoteConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self { base_url: base_url.into().trim_end_matches('/').to_string(),
           token: None,
           device_id: None,
           timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS) }
  }

  /// Lee `WASTE_API_URL` (o `API_BASE_URL`), `WASTE_API_TOKEN`,
  /// `WASTE_DEVICE_ID` y `WASTE_API_TIMEOUT_SECS`.
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  /// Igual que `from_env` pero con una fuente de variables inyectable.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let base_url = lookup("WASTE_API_URL").or_else(|| lookup("API_BASE_URL"))
                                          .filter(|v| !v.trim().is_empty())
                                          .ok_or(ConfigError::Missing("WASTE_API_URL / API_BASE_URL"))?;
    let l = base_url.to_lowercase();
    if !(l.starts_with("http://") || l.starts_with("https://")) {
      return Err(ConfigError::Invalid { var: "WASTE_API_URL", value: base_url });
    }
    let mut cfg = Self::new(base_url.trim());
    cfg.token = lookup("WASTE_API_TOKEN").filter(|t| !t.trim().is_empty());
    cfg.device_id = lookup("WASTE_DEVICE_ID").map(|d| d.trim().to_string())
                                             .filter(|d| !d.is_empty());
    if let Some(raw) = lookup("WASTE_API_TIMEOUT_SECS") {
      let secs: u64 = raw.trim()
                         .parse()
                         .ok()
                         .filter(|s| *s > 0)
                         .ok_or(ConfigError::Invalid { var: "WASTE_API_TIMEOUT_SECS", value: raw.clone() })?;
      cfg.timeout = Duration::from_secs(secs);
    }
    Ok(cfg)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k| map.get(k).cloned()
  }

  #[test]
  fn reads_url_token_and_timeout() {
    let cfg = RemoteConfig::from_lookup(lookup(&[("WASTE_API_URL", "https://api.local/"),
                                                 ("WASTE_API_TOKEN", "abc"),
                                                 ("WASTE_DEVICE_ID", " tablet-7 "),
                                                 ("WASTE_API_TIMEOUT_SECS", "3")])).unwrap();
    assert_eq!(cfg.base_url, "https://api.local");
    assert_eq!(cfg.token.as_deref(), Some("abc"));
    assert_eq!(cfg.device_id.as_deref(), Some("tablet-7"));
    assert_eq!(cfg.timeout, Duration::from_secs(3));
  }

  #[test]
  fn falls_back_to_api_base_url() {
    let cfg = RemoteConfig::from_lookup(lookup(&[("API_BASE_URL", "http://10.0.0.2:8080")])).unwrap();
    assert_eq!(cfg.base_url, "http://10.0.0.2:8080");
    assert!(cfg.token.is_none());
    assert!(cfg.device_id.is_none());
    assert_eq!(cfg.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
  }

  #[test]
  fn rejects_missing_or_bad_values() {
    assert!(matches!(RemoteConfig::from_lookup(lookup(&[])), Err(ConfigError::Missing(_))));
    assert!(matches!(RemoteConfig::from_lookup(lookup(&[("WASTE_API_URL", "ftp://x")])),
                     Err(ConfigError::Invalid { .. })));
    assert!(matches!(RemoteConfig::from_lookup(lookup(&[("WASTE_API_URL", "http://x"),
                                                        ("WASTE_API_TIMEOUT_SECS", "0")])),
                     Err(ConfigError::Invalid { var: "WASTE_API_TIMEOUT_SECS", .. })));
  }
}
