// Archivo: service.rs
// Propósito: implementar `BatchService`, el gestor del ciclo de vida de
// lotes. Orquesta el adaptador remoto, el motor de transiciones y el
// contenedor de estado. Es lo que invoca la capa de presentación.
use crate::domain::{parse_estimated_weight, Batch, BatchStatus, Machine, MachinePatch, ProcessPatch, ProcessRecord,
                    ProcessType, RemoteBatch, Telemetry, TelemetryPatch};
use crate::engine::{BatchEngine, BatchEngineConfig};
use crate::errors::{BatchError, RemoteResult, Result, ValidationError};
use crate::remote::{BatchRemote, BatchStatusUpdate, CreateBatchRequest, NewProcessRequest, RegisterMachineRequest};
use crate::store::BatchStore;
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// Tiempo máximo por llamada remota si no se configura otro.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuración del servicio.
#[derive(Debug, Clone)]
pub struct BatchServiceConfig {
    /// Límite por llamada remota. Al vencer se trata como un rechazo.
    pub request_timeout: Duration,
    pub engine: BatchEngineConfig,
}

impl Default for BatchServiceConfig {
    fn default() -> Self {
        Self { request_timeout: DEFAULT_REQUEST_TIMEOUT,
               engine: BatchEngineConfig::default() }
    }
}

/// Gestor del ciclo de vida de lotes.
///
/// Reglas:
/// - Las operaciones remotas llaman primero al servidor y sólo mutan el
///   estado local tras una respuesta exitosa. Un fallo (rechazo, red,
///   timeout o cancelación) deja el estado local intacto.
/// - Las operaciones que afectan a un mismo lote se serializan: una
///   segunda llamada concurrente espera a que la primera confirme.
/// - Las transiciones locales (`advance_batch_step`, `revert_batch_step`,
///   `complete_batch`, `emergency_stop`, ...) no fallan nunca.
pub struct BatchService<R> where R: BatchRemote
{
    remote: Arc<R>,
    store: Arc<BatchStore>,
    engine: BatchEngine,
    config: BatchServiceConfig,
    /// Un mutex por lote (o por máquina en la creación).
    gates: DashMap<String, Arc<Mutex<()>>>,
    cancel: CancellationToken,
}

impl<R> BatchService<R> where R: BatchRemote + 'static
{
    /// Crea el servicio inyectando el adaptador remoto y el contenedor de
    /// estado compartido.
    pub fn new(remote: Arc<R>, store: Arc<BatchStore>, config: BatchServiceConfig) -> Self {
        let engine = BatchEngine::new(config.engine.clone());
        Self { remote,
               store,
               engine,
               config,
               gates: DashMap::new(),
               cancel: CancellationToken::new() }
    }

    pub fn store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Token observado por todas las llamadas remotas. Cancelarlo aborta
    /// las llamadas en vuelo con `BatchError::Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn gate(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self.gates
                       .entry(key.to_string())
                       .or_insert_with(|| Arc::new(Mutex::new(())))
                       .clone();
        lock.lock_owned().await
    }

    /// Descarta el mutex de un lote que ya es terminal. Quien lo tuviera
    /// tomado conserva su `Arc`; las llamadas siguientes verán el lote
    /// terminal y no llegarán a la red.
    fn release_gate(&self, batch: &Batch) {
        if batch.is_terminal() && self.gates.remove(&batch.id).is_some() {
            debug!("gate for batch {} released", batch.id);
        }
    }

    /// Ejecuta una llamada remota con timeout y cancelación.
    async fn call<T, F>(&self, op: &str, fut: F) -> Result<T>
        where F: Future<Output = RemoteResult<T>>
    {
        debug!("remote {} started", op);
        tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!("remote {} cancelled", op);
                Err(BatchError::Cancelled)
            }
            res = tokio::time::timeout(self.config.request_timeout, fut) => {
                match res {
                    Ok(Ok(v)) => Ok(v),
                    Ok(Err(e)) => {
                        warn!("remote {} rejected: {}", op, e);
                        Err(BatchError::Remote(e))
                    }
                    Err(_) => {
                        warn!("remote {} timed out after {:?}", op, self.config.request_timeout);
                        Err(BatchError::Timeout(self.config.request_timeout))
                    }
                }
            }
        }
    }

    fn require_current(&self) -> Result<Batch> {
        self.store.current_batch().ok_or(BatchError::NoCurrentBatch)
    }

    // --- Lotes ---------------------------------------------------------

    /// Crea un lote en el servidor para `machine` y lo convierte en el lote
    /// actual (`running`, paso 1, tipo `mixed`).
    ///
    /// La validación (máquina presente, peso numérico en `(0, 5]`) ocurre
    /// antes de cualquier llamada de red.
    pub async fn create_batch(&self, machine: Option<&Machine>, estimated_weight: &str) -> Result<Batch> {
        let machine = machine.ok_or(ValidationError::MissingMachine)?;
        let weight = parse_estimated_weight(estimated_weight)?;
        let _guard = self.gate(&format!("machine:{}", machine.id)).await;

        let req = CreateBatchRequest { machine_id: machine.machine_id.clone(),
                                       estimated_weight: weight };
        let created = self.call("create_batch", self.remote.create_batch(&req)).await?;

        let batch = Batch::started(created.id, machine.id.clone(), weight, Utc::now());
        let batch = self.store.update(|state| self.engine.insert_current(state, batch));
        info!("batch {} created on machine {} ({} kg)", batch.id, machine.machine_id, weight);
        Ok(batch)
    }

    /// Arranque local del procesamiento (sin red).
    pub fn start_processing(&self) -> Option<Batch> {
        self.store.update(|state| self.engine.start_processing(state, Utc::now()))
    }

    /// Parada local reanudable (sin red). No completa el lote.
    pub fn stop_processing(&self) -> Option<Batch> {
        self.store.update(|state| self.engine.stop_processing(state))
    }

    /// Pide al servidor poner el lote actual en `running` (con `startedAt`
    /// si el lote aún no lo tiene) y reconcilia la copia local.
    pub async fn start_batch_api(&self) -> Result<Batch> {
        self.sync_status(BatchStatus::Running).await
    }

    /// Pide al servidor poner el lote actual en `idle` y reconcilia la copia
    /// local.
    pub async fn stop_batch_api(&self) -> Result<Batch> {
        self.sync_status(BatchStatus::Idle).await
    }

    async fn sync_status(&self, status: BatchStatus) -> Result<Batch> {
        let id = self.require_current()?.id;
        let _guard = self.gate(&id).await;
        // releer tras esperar: el lote pudo dejar de ser el actual o pasar a
        // un estado terminal mientras esta llamada hacía cola
        let current = self.store
                          .current_batch()
                          .filter(|b| b.id == id && !b.is_terminal())
                          .ok_or(BatchError::NoCurrentBatch)?;

        let started_at = match status {
            BatchStatus::Running if current.start_time.is_none() => Some(Utc::now()),
            _ => None,
        };
        let update = BatchStatusUpdate { status, started_at };
        let response = self.call("update_batch", self.remote.update_batch(&id, &update)).await?;

        let merged = RemoteBatch { status: response.status.or(Some(status)),
                                   started_at: response.started_at.or(started_at),
                                   ..response };
        let batch = self.store
                        .update(|state| self.engine.apply_remote(state, &id, &merged))
                        .ok_or(BatchError::NoCurrentBatch)?;
        self.release_gate(&batch);
        info!("batch {} synced to {}", id, batch.status);
        Ok(batch)
    }

    /// Crea el sub-registro de proceso del lote actual sembrado con la
    /// primera etapa del camino (`Sorting` / `Vermicasting`).
    pub async fn create_batch_process(&self, process_type: ProcessType) -> Result<ProcessRecord> {
        let id = self.require_current()?.id;
        let req = NewProcessRequest::seeded(process_type, Utc::now())?;
        let _guard = self.gate(&id).await;
        let record = self.call("create_process", self.remote.create_process(&id, &req)).await?;
        info!("process {} created for batch {}", process_type, id);
        Ok(record)
    }

    /// Actualiza `feedStatus` / `compostStatus` del proceso del lote actual.
    pub async fn update_process(&self, patch: ProcessPatch) -> Result<ProcessRecord> {
        let id = self.require_current()?.id;
        let _guard = self.gate(&id).await;
        self.call("update_process", self.remote.update_process(&id, &patch)).await
    }

    /// Lee el proceso del lote actual.
    pub async fn fetch_process(&self) -> Result<ProcessRecord> {
        let id = self.require_current()?.id;
        self.call("get_process", self.remote.get_process(&id)).await
    }

    /// Reemplaza la colección local con los lotes del servidor, opcionalmente
    /// filtrados por código de máquina.
    pub async fn fetch_batches(&self, machine_id: Option<&str>) -> Result<Vec<Batch>> {
        let remote = self.call("list_batches", self.remote.list_batches(machine_id)).await?;
        let batches = self.store.update(|state| self.engine.replace_batches(state, &remote));
        batches.iter().for_each(|b| self.release_gate(b));
        debug!("loaded {} batches", batches.len());
        Ok(batches)
    }

    /// Avanza un paso el lote indicado (o el actual). `None` si no existe.
    pub fn advance_batch_step(&self, batch_id: Option<&str>) -> Option<Batch> {
        let batch = self.store.update(|state| self.engine.advance(state, batch_id, Utc::now()))?;
        self.release_gate(&batch);
        Some(batch)
    }

    /// Retrocede un paso el lote indicado (o el actual). `None` si no existe.
    pub fn revert_batch_step(&self, batch_id: Option<&str>) -> Option<Batch> {
        self.store.update(|state| self.engine.revert(state, batch_id))
    }

    /// Fuerza la finalización del lote indicado (o el actual).
    pub fn complete_batch(&self, batch_id: Option<&str>) -> Option<Batch> {
        let batch = self.store.update(|state| self.engine.complete(state, batch_id, Utc::now()))?;
        self.release_gate(&batch);
        Some(batch)
    }

    /// Parada de emergencia sobre el lote actual.
    pub fn emergency_stop(&self) -> Option<Batch> {
        let batch = self.store.update(|state| self.engine.emergency_stop(state))?;
        self.release_gate(&batch);
        Some(batch)
    }

    /// Fusiona una lectura de telemetría.
    pub fn apply_telemetry(&self, patch: TelemetryPatch) -> Telemetry {
        self.store.apply_telemetry(patch)
    }

    // --- Máquinas ------------------------------------------------------

    /// Registra una máquina por su código de hardware. Si no había máquina
    /// seleccionada, la nueva queda seleccionada.
    pub async fn register_machine(&self, machine_id: &str, name: &str) -> Result<Machine> {
        let machine_id = machine_id.trim();
        let name = name.trim();
        if machine_id.is_empty() {
            return Err(ValidationError::EmptyField("machineId").into());
        }
        if name.is_empty() {
            return Err(ValidationError::EmptyField("name").into());
        }
        let req = RegisterMachineRequest { machine_id: machine_id.to_string(),
                                           name: name.to_string() };
        let machine = self.call("register_machine", self.remote.register_machine(&req)).await?;
        self.store.update(|state| {
                      match state.machines.iter_mut().find(|m| m.id == machine.id) {
                          Some(existing) => *existing = machine.clone(),
                          None => state.machines.push(machine.clone()),
                      }
                      if state.selected_machine.is_none() {
                          state.selected_machine = Some(machine.id.clone());
                      }
                  });
        info!("machine {} registered as {}", machine.machine_id, machine.id);
        Ok(machine)
    }

    /// Actualiza nombre / estado en línea de una máquina.
    pub async fn update_machine(&self, machine_id: &str, patch: MachinePatch) -> Result<Machine> {
        let _guard = self.gate(&format!("machine-code:{}", machine_id)).await;
        let machine = self.call("update_machine", self.remote.update_machine(machine_id, &patch)).await?;
        self.store.update(|state| {
                      if let Some(existing) = state.machines.iter_mut().find(|m| m.machine_id == machine_id) {
                          *existing = machine.clone();
                      }
                  });
        Ok(machine)
    }

    /// Elimina una máquina en el servidor y localmente.
    pub async fn delete_machine(&self, machine_id: &str) -> Result<()> {
        let _guard = self.gate(&format!("machine-code:{}", machine_id)).await;
        self.call("delete_machine", self.remote.delete_machine(machine_id)).await?;
        self.store.update(|state| {
                      let removed: Vec<String> = state.machines
                                                      .iter()
                                                      .filter(|m| m.machine_id == machine_id)
                                                      .map(|m| m.id.clone())
                                                      .collect();
                      state.machines.retain(|m| m.machine_id != machine_id);
                      if state.selected_machine.as_ref().is_some_and(|sel| removed.contains(sel)) {
                          state.selected_machine = None;
                      }
                  });
        self.gates.remove(&format!("machine-code:{}", machine_id));
        info!("machine {} deleted", machine_id);
        Ok(())
    }

    /// Selecciona una máquina conocida por su `id`.
    pub fn select_machine(&self, id: &str) -> Result<Machine> {
        self.store
            .update(|state| {
                let machine = state.machines.iter().find(|m| m.id == id).cloned()?;
                state.selected_machine = Some(machine.id.clone());
                Some(machine)
            })
            .ok_or_else(|| ValidationError::UnknownMachine(id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::InMemoryBatchRemote;

    #[tokio::test]
    async fn gates_are_dropped_once_batches_finish() {
        let remote = Arc::new(InMemoryBatchRemote::new());
        let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());
        let machine = remote.seed_machine("HW-900", "patio");

        let batch = service.create_batch(Some(&machine), "1").await.unwrap();
        service.stop_batch_api().await.unwrap();
        assert!(service.gates.contains_key(&batch.id));
        service.complete_batch(None).unwrap();
        assert!(!service.gates.contains_key(&batch.id));

        let other = remote.seed_machine("HW-901", "patio");
        let batch = service.create_batch(Some(&other), "1").await.unwrap();
        service.start_batch_api().await.unwrap();
        service.emergency_stop().unwrap();
        assert!(!service.gates.contains_key(&batch.id));

        service.update_machine("HW-901", MachinePatch::default()).await.unwrap();
        service.delete_machine("HW-901").await.unwrap();
        assert!(!service.gates.contains_key("machine-code:HW-901"));
    }
}
