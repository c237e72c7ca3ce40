// Archivo: store.rs
// Propósito: contenedor de estado explícito de la sesión (máquinas, lotes,
// lote actual y telemetría). Se comparte mediante `Arc<BatchStore>`; todas
// las mutaciones pasan por `update`, que toma el lock una sola vez.
use crate::domain::{Batch, Machine, Telemetry, TelemetryPatch};
use chrono::Utc;
use indexmap::IndexMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Estado completo de la sesión.
///
/// Invariante: `current_batch`, si existe, referencia una clave de
/// `batches`.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub machines: Vec<Machine>,
    /// `Machine::id` de la máquina seleccionada.
    pub selected_machine: Option<String>,
    /// Lotes de la sesión en orden de inserción.
    pub batches: IndexMap<String, Batch>,
    pub current_batch: Option<String>,
    pub telemetry: Telemetry,
}

impl StoreState {
    pub fn current(&self) -> Option<&Batch> {
        self.current_batch.as_ref().and_then(|id| self.batches.get(id))
    }

    /// Resuelve el lote objetivo: el indicado o, si no se indica, el actual.
    pub(crate) fn target_id(&self, batch_id: Option<&str>) -> Option<String> {
        match batch_id {
            Some(id) => self.batches.contains_key(id).then(|| id.to_string()),
            None => self.current().map(|b| b.id.clone()),
        }
    }

    /// Limpia el puntero si apunta a `batch_id`.
    pub(crate) fn release_current(&mut self, batch_id: &str) {
        if self.current_batch.as_deref() == Some(batch_id) {
            self.current_batch = None;
        }
    }

    pub fn selected(&self) -> Option<&Machine> {
        self.selected_machine
            .as_ref()
            .and_then(|id| self.machines.iter().find(|m| &m.id == id))
    }
}

/// Contenedor de estado con un único canal de mutación.
///
/// Las lecturas devuelven copias: la capa de presentación nunca obtiene
/// referencias mutables.
#[derive(Debug, Default)]
pub struct BatchStore {
    state: RwLock<StoreState>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea el contenedor a partir de un estado existente (p. ej. tests o
    /// rehidratación).
    pub fn with_state(state: StoreState) -> Self {
        Self { state: RwLock::new(state) }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Aplica una mutación de forma atómica respecto a otras mutaciones.
    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Copia completa del estado.
    pub fn snapshot(&self) -> StoreState {
        self.read().clone()
    }

    pub fn current_batch(&self) -> Option<Batch> {
        self.read().current().cloned()
    }

    pub fn batch(&self, batch_id: &str) -> Option<Batch> {
        self.read().batches.get(batch_id).cloned()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.read().batches.values().cloned().collect()
    }

    pub fn machines(&self) -> Vec<Machine> {
        self.read().machines.clone()
    }

    pub fn selected_machine(&self) -> Option<Machine> {
        self.read().selected().cloned()
    }

    pub fn telemetry(&self) -> Telemetry {
        self.read().telemetry.clone()
    }

    /// Fusiona una lectura de telemetría. Puede intercalarse con llamadas
    /// remotas en vuelo: no toca lotes.
    pub fn apply_telemetry(&self, patch: TelemetryPatch) -> Telemetry {
        self.update(|state| {
                state.telemetry.merge(patch, Utc::now());
                state.telemetry.clone()
            })
    }
}
