//! Crate `waste-flow`: gestor del ciclo de vida de lotes de procesamiento
//!
//! Este crate define los tipos de dominio (`Batch`, `Machine`, `Telemetry`),
//! el contrato remoto `BatchRemote`, el contenedor de estado `BatchStore`,
//! el motor de transiciones `BatchEngine` y el servicio `BatchService` que
//! coordina cada transición con el servidor. También expone un servidor
//! falso en memoria (`InMemoryBatchRemote`) útil para pruebas.
//!
//! Diseño resumido:
//! - Estado explícito: `BatchStore` se crea en la raíz de la aplicación y
//!   se comparte con `Arc`; toda mutación pasa por un único canal.
//! - Primero el servidor: las operaciones remotas sólo mutan el estado
//!   local tras una respuesta exitosa.
//! - Serialización por lote: dos llamadas concurrentes sobre el mismo lote
//!   no se pisan.
//! - Timeout y cancelación en cada llamada remota.
//!
//! Ejemplo rápido:
//! ```rust
//! use std::sync::Arc;
//! use waste_flow::stubs::InMemoryBatchRemote;
//! use waste_flow::{BatchService, BatchServiceConfig, BatchStore};
//! let remote = Arc::new(InMemoryBatchRemote::new());
//! let store = Arc::new(BatchStore::new());
//! let service = BatchService::new(remote, store, BatchServiceConfig::default());
//! assert!(service.store().current_batch().is_none());
//! ```
pub mod domain;
pub mod engine;
pub mod errors;
pub mod remote;
pub mod service;
pub mod store;
pub mod stubs;

pub use domain::*;
pub use engine::*;
pub use errors::*;
pub use remote::*;
pub use service::*;
pub use store::*;
