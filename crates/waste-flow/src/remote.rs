// Archivo: remote.rs
// Propósito: definir el trait `BatchRemote`, el contrato que debe cumplir
// el adaptador HTTP autenticado (o un stub en memoria), y los cuerpos de
// petición que viajan por él.
use crate::domain::{BatchStatus, Machine, MachinePatch, ProcessPatch, ProcessRecord, ProcessType, RemoteBatch, Stage};
use crate::errors::{RemoteResult, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /machines/register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMachineRequest {
    pub machine_id: String,
    pub name: String,
}

/// Respuesta de `POST /machines/register`: `{machine: {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachineResponse {
    pub machine: Machine,
}

/// `POST /batches`. `machine_id` es el código de hardware de la máquina.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    pub machine_id: String,
    pub estimated_weight: f64,
}

/// `PATCH /batches/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusUpdate {
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// `POST /batches/{id}/process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProcessRequest {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compost_status: Option<String>,
}

impl NewProcessRequest {
    /// Registro inicial sembrado con la primera etapa del camino: `Sorting`
    /// para alimento, `Vermicasting` para compost. `Mixed` no tiene un
    /// sub-registro propio.
    pub fn seeded(process_type: ProcessType, started_at: DateTime<Utc>) -> Result<Self, ValidationError> {
        match process_type {
            ProcessType::Feed => Ok(Self { started_at,
                                           feed_status: Some(Stage::Sorting.label().to_string()),
                                           compost_status: None }),
            ProcessType::Compost => Ok(Self { started_at,
                                              feed_status: None,
                                              compost_status: Some(Stage::Vermicasting.label().to_string()) }),
            ProcessType::Mixed => Err(ValidationError::UnsupportedProcessType(process_type)),
        }
    }
}

/// Contrato del adaptador remoto.
///
/// Cada método corresponde a un endpoint del servidor. Las implementaciones
/// adjuntan la credencial bearer y devuelven `RemoteError::Status` cuando
/// la respuesta no es exitosa, conservando código, texto y cuerpo.
#[async_trait]
pub trait BatchRemote: Send + Sync {
    /// `POST /machines/register`
    async fn register_machine(&self, req: &RegisterMachineRequest) -> RemoteResult<Machine>;

    /// `POST /batches`
    async fn create_batch(&self, req: &CreateBatchRequest) -> RemoteResult<RemoteBatch>;

    /// `PATCH /batches/{id}`
    async fn update_batch(&self, batch_id: &str, update: &BatchStatusUpdate) -> RemoteResult<RemoteBatch>;

    /// `POST /batches/{id}/process`
    async fn create_process(&self, batch_id: &str, req: &NewProcessRequest) -> RemoteResult<ProcessRecord>;

    /// `PATCH /batches/{id}/process`
    async fn update_process(&self, batch_id: &str, patch: &ProcessPatch) -> RemoteResult<ProcessRecord>;

    /// `GET /batches/{id}/process`
    async fn get_process(&self, batch_id: &str) -> RemoteResult<ProcessRecord>;

    /// `GET /batches[?machineId=]`
    async fn list_batches(&self, machine_id: Option<&str>) -> RemoteResult<Vec<RemoteBatch>>;

    /// `DELETE /machines/{machineId}`
    async fn delete_machine(&self, machine_id: &str) -> RemoteResult<serde_json::Value>;

    /// `PATCH /machines/{machineId}`
    async fn update_machine(&self, machine_id: &str, patch: &MachinePatch) -> RemoteResult<Machine>;
}
