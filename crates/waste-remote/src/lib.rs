//! Adaptador HTTP para `waste_flow::BatchRemote`.
//!
//! Expone `HttpBatchRemote` (cliente `reqwest` autenticado con token
//! bearer e identidad de dispositivo), la configuración `RemoteConfig` leída
//! del entorno y las fuentes de credenciales. El servicio de `waste-flow` no depende de este crate;
//! la aplicación lo inyecta en la raíz.

mod auth;
mod config;
mod http_remote;

pub use auth::{Anonymous, CredentialSource, Credentials, SessionCredentials, DEVICE_ID_HEADER};
pub use config::{ConfigError, RemoteConfig, DEFAULT_TIMEOUT_SECS};
pub use http_remote::HttpBatchRemote;

