// Implementación de `BatchRemote` sobre HTTP con `reqwest`.
use crate::auth::{Anonymous, CredentialSource, SessionCredentials, DEVICE_ID_HEADER};
use crate::config::RemoteConfig;
use async_trait::async_trait;
use log::debug;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use waste_flow::{BatchRemote, BatchStatusUpdate, CreateBatchRequest, Machine, MachinePatch, NewProcessRequest,
                 ProcessPatch, ProcessRecord, RegisterMachineRequest, RegisterMachineResponse, RemoteBatch,
                 RemoteError, RemoteResult};

/// Adaptador HTTP autenticado.
///
/// Adjunta `Authorization: Bearer` (y `X-Device-Id` si la sesión lo tiene)
/// cuando la fuente de credenciales las entrega, y convierte cualquier
/// respuesta no 2xx en `RemoteError::Status` con código, texto y cuerpo.
pub struct HttpBatchRemote {
  http: reqwest::Client,
  base_url: String,
  credentials: Arc<dyn CredentialSource>,
}

impl HttpBatchRemote {
  pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialSource>) -> Self {
    Self { http: reqwest::Client::new(),
           base_url: base_url.into().trim_end_matches('/').to_string(),
           credentials }
  }

  /// Construye el cliente con el timeout, el token y el dispositivo de
  /// `config`.
  pub fn from_config(config: &RemoteConfig) -> RemoteResult<Self> {
    let http = reqwest::Client::builder().timeout(config.timeout)
                                         .build()
                                         .map_err(|e| RemoteError::Network(format!("client: {}", e)))?;
    let credentials: Arc<dyn CredentialSource> = match (&config.token, &config.device_id) {
      (Some(t), Some(d)) => Arc::new(SessionCredentials::new(t.clone()).with_device(d.clone())),
      (Some(t), None) => Arc::new(SessionCredentials::new(t.clone())),
      (None, _) => Arc::new(Anonymous),
    };
    Ok(Self { http,
              base_url: config.base_url.clone(),
              credentials })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn request<B, T>(&self, method: Method, path: &str, query: &[(&str, &str)], body: Option<&B>) -> RemoteResult<T>
    where B: Serialize + ?Sized,
          T: DeserializeOwned
  {
    let url = format!("{}{}", self.base_url, path);
    debug!("{} {}", method, url);
    let mut req = self.http.request(method, &url);
    if !query.is_empty() {
      req = req.query(query);
    }
    if let Some(creds) = self.credentials.credentials().await? {
      req = req.bearer_auth(creds.token);
      if let Some(device) = creds.device_id {
        req = req.header(DEVICE_ID_HEADER, device);
      }
    }
    if let Some(b) = body {
      req = req.json(b);
    }

    let resp = req.send().await.map_err(|e| RemoteError::Network(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(RemoteError::Status { status: status.as_u16(),
                                       status_text: status.canonical_reason().unwrap_or_default().to_string(),
                                       body });
    }
    let bytes = resp.bytes().await.map_err(|e| RemoteError::Network(e.to_string()))?;
    // respuestas vacías (p. ej. DELETE 204) se leen como `null`
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(bytes).map_err(|e| RemoteError::Decode(format!("{} {}: {}", status.as_u16(), path, e)))
  }
}

#[async_trait]
impl BatchRemote for HttpBatchRemote {
  async fn register_machine(&self, req: &RegisterMachineRequest) -> RemoteResult<Machine> {
    let resp: RegisterMachineResponse = self.request(Method::POST, "/machines/register", &[], Some(req)).await?;
    Ok(resp.machine)
  }

  async fn create_batch(&self, req: &CreateBatchRequest) -> RemoteResult<RemoteBatch> {
    self.request(Method::POST, "/batches", &[], Some(req)).await
  }

  async fn update_batch(&self, batch_id: &str, update: &BatchStatusUpdate) -> RemoteResult<RemoteBatch> {
    self.request(Method::PATCH, &format!("/batches/{}", batch_id), &[], Some(update)).await
  }

  async fn create_process(&self, batch_id: &str, req: &NewProcessRequest) -> RemoteResult<ProcessRecord> {
    self.request(Method::POST, &format!("/batches/{}/process", batch_id), &[], Some(req)).await
  }

  async fn update_process(&self, batch_id: &str, patch: &ProcessPatch) -> RemoteResult<ProcessRecord> {
    self.request(Method::PATCH, &format!("/batches/{}/process", batch_id), &[], Some(patch)).await
  }

  async fn get_process(&self, batch_id: &str) -> RemoteResult<ProcessRecord> {
    self.request::<(), _>(Method::GET, &format!("/batches/{}/process", batch_id), &[], None).await
  }

  async fn list_batches(&self, machine_id: Option<&str>) -> RemoteResult<Vec<RemoteBatch>> {
    let query: Vec<(&str, &str)> = machine_id.map(|m| vec![("machineId", m)]).unwrap_or_default();
    self.request::<(), _>(Method::GET, "/batches", &query, None).await
  }

  async fn delete_machine(&self, machine_id: &str) -> RemoteResult<serde_json::Value> {
    self.request::<(), _>(Method::DELETE, &format!("/machines/{}", machine_id), &[], None).await
  }

  async fn update_machine(&self, machine_id: &str, patch: &MachinePatch) -> RemoteResult<Machine> {
    self.request(Method::PATCH, &format!("/machines/{}", machine_id), &[], Some(patch)).await
  }
}
