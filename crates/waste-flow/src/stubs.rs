// Archivo: stubs.rs
// Propósito: implementación en memoria de `BatchRemote` para pruebas y
// wiring rápido.
//
// Simula el servidor: asigna ids, rechaza lotes sobre máquinas
// desconocidas o con un lote activo, y permite inyectar fallos y retardos.
// No es durable.
use crate::domain::{BatchStatus, Machine, MachinePatch, ProcessPatch, ProcessRecord, ProcessType, RemoteBatch};
use crate::errors::{RemoteError, RemoteResult};
use crate::remote::{BatchRemote, BatchStatusUpdate, CreateBatchRequest, NewProcessRequest, RegisterMachineRequest};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Servidor falso en memoria.
#[derive(Debug, Default)]
pub struct InMemoryBatchRemote {
    /// Máquinas indexadas por código de hardware.
    machines: Mutex<IndexMap<String, Machine>>,
    batches: Mutex<IndexMap<String, RemoteBatch>>,
    /// Registros de proceso por id de lote.
    processes: Mutex<HashMap<String, ProcessRecord>>,
    /// Error que devolverá la próxima llamada (una sola vez).
    fail_next: Mutex<Option<RemoteError>>,
    /// Retardo aplicado antes de atender cada llamada.
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

fn status(code: u16, text: &str, body: &str) -> RemoteError {
    RemoteError::Status { status: code,
                          status_text: text.to_string(),
                          body: body.to_string() }
}

fn not_found(what: &str) -> RemoteError {
    status(404, "Not Found", &format!(r#"{{"error":"{}"}}"#, what))
}

impl InMemoryBatchRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> MutexGuard<'a, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registra directamente una máquina en el servidor falso.
    pub fn seed_machine(&self, machine_id: &str, name: &str) -> Machine {
        let machine = Machine { id: Uuid::new_v4().to_string(),
                                machine_id: machine_id.to_string(),
                                name: name.to_string(),
                                is_online: true,
                                last_seen: None,
                                stream_url: None };
        self.lock(&self.machines).insert(machine_id.to_string(), machine.clone());
        machine
    }

    /// Inserta un lote tal cual en el servidor falso.
    pub fn seed_batch(&self, batch: RemoteBatch) {
        self.lock(&self.batches).insert(batch.id.clone(), batch);
    }

    /// La próxima llamada fallará con `err`.
    pub fn fail_next(&self, err: RemoteError) {
        *self.lock(&self.fail_next) = Some(err);
    }

    /// Retarda todas las llamadas siguientes.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.lock(&self.delay) = delay;
    }

    /// Número de llamadas atendidas (incluidas las fallidas).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Estado del lote en el servidor falso.
    pub fn server_batch(&self, batch_id: &str) -> Option<RemoteBatch> {
        self.lock(&self.batches).get(batch_id).cloned()
    }

    async fn enter(&self) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lock(&self.delay);
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match self.lock(&self.fail_next).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BatchRemote for InMemoryBatchRemote {
    async fn register_machine(&self, req: &RegisterMachineRequest) -> RemoteResult<Machine> {
        self.enter().await?;
        if self.lock(&self.machines).contains_key(&req.machine_id) {
            return Err(status(409, "Conflict", "machine already registered"));
        }
        Ok(self.seed_machine(&req.machine_id, &req.name))
    }

    async fn create_batch(&self, req: &CreateBatchRequest) -> RemoteResult<RemoteBatch> {
        self.enter().await?;
        if !self.lock(&self.machines).contains_key(&req.machine_id) {
            return Err(not_found("machine_not_found"));
        }
        let mut batches = self.lock(&self.batches);
        let active = batches.values().any(|b| {
                                          b.machine_id.as_deref() == Some(req.machine_id.as_str())
                                          && !b.status.map(BatchStatus::is_terminal).unwrap_or(false)
                                      });
        if active {
            return Err(status(409, "Conflict", "Machine already has an active batch"));
        }
        let batch = RemoteBatch { id: Uuid::new_v4().to_string(),
                                  machine_id: Some(req.machine_id.clone()),
                                  status: Some(BatchStatus::Running),
                                  process_type: Some(ProcessType::Mixed),
                                  current_step: Some(1),
                                  estimated_weight: Some(req.estimated_weight),
                                  ..Default::default() };
        batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    async fn update_batch(&self, batch_id: &str, update: &BatchStatusUpdate) -> RemoteResult<RemoteBatch> {
        self.enter().await?;
        let mut batches = self.lock(&self.batches);
        let batch = batches.get_mut(batch_id).ok_or_else(|| not_found("batch_not_found"))?;
        batch.status = Some(update.status);
        if batch.started_at.is_none() {
            batch.started_at = update.started_at;
        }
        Ok(batch.clone())
    }

    async fn create_process(&self, batch_id: &str, req: &NewProcessRequest) -> RemoteResult<ProcessRecord> {
        self.enter().await?;
        if !self.lock(&self.batches).contains_key(batch_id) {
            return Err(not_found("batch_not_found"));
        }
        let record = ProcessRecord { id: Some(Uuid::new_v4().to_string()),
                                     batch_id: Some(batch_id.to_string()),
                                     started_at: Some(req.started_at),
                                     feed_status: req.feed_status.clone(),
                                     compost_status: req.compost_status.clone(),
                                     completed_at: None };
        self.lock(&self.processes).insert(batch_id.to_string(), record.clone());
        Ok(record)
    }

    async fn update_process(&self, batch_id: &str, patch: &ProcessPatch) -> RemoteResult<ProcessRecord> {
        self.enter().await?;
        let mut processes = self.lock(&self.processes);
        let record = processes.get_mut(batch_id).ok_or_else(|| not_found("process_not_found"))?;
        if patch.feed_status.is_some() {
            record.feed_status = patch.feed_status.clone();
        }
        if patch.compost_status.is_some() {
            record.compost_status = patch.compost_status.clone();
        }
        Ok(record.clone())
    }

    async fn get_process(&self, batch_id: &str) -> RemoteResult<ProcessRecord> {
        self.enter().await?;
        self.lock(&self.processes)
            .get(batch_id)
            .cloned()
            .ok_or_else(|| not_found("process_not_found"))
    }

    async fn list_batches(&self, machine_id: Option<&str>) -> RemoteResult<Vec<RemoteBatch>> {
        self.enter().await?;
        Ok(self.lock(&self.batches)
               .values()
               .filter(|b| machine_id.is_none() || b.machine_id.as_deref() == machine_id)
               .cloned()
               .collect())
    }

    async fn delete_machine(&self, machine_id: &str) -> RemoteResult<serde_json::Value> {
        self.enter().await?;
        self.lock(&self.machines)
            .shift_remove(machine_id)
            .ok_or_else(|| not_found("machine_not_found"))?;
        Ok(serde_json::json!({ "deleted": true, "machineId": machine_id }))
    }

    async fn update_machine(&self, machine_id: &str, patch: &MachinePatch) -> RemoteResult<Machine> {
        self.enter().await?;
        let mut machines = self.lock(&self.machines);
        let machine = machines.get_mut(machine_id).ok_or_else(|| not_found("machine_not_found"))?;
        if let Some(name) = &patch.name {
            machine.name = name.clone();
        }
        if let Some(online) = patch.is_online {
            machine.is_online = online;
        }
        Ok(machine.clone())
    }
}
