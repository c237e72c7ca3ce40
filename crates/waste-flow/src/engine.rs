// Archivo: engine.rs
// Propósito: implementar `BatchEngine`, la lógica de transiciones de un
// lote (avanzar, retroceder, completar, parada de emergencia, arranque y
// parada local) sobre `StoreState`.
//
// Nota: el motor no hace E/S. Todas las funciones son totales: un lote
// inexistente produce `None` y un lote terminal se devuelve sin cambios.
use crate::domain::{Batch, BatchStatus, MotorState, ProcessType, RemoteBatch};
use crate::store::StoreState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};

/// Qué hacer con `current_step` al forzar la finalización de un lote
/// `mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixedCompletion {
    /// Conserva el paso en el que estaba el lote.
    #[default]
    KeepStep,
    /// Lleva el paso a `max_steps(mixed)` (9), igual que el camino de
    /// avance.
    SnapToMax,
}

/// Configuración del motor.
#[derive(Debug, Clone, Default)]
pub struct BatchEngineConfig {
    pub mixed_completion: MixedCompletion,
}

/// Motor de transiciones de lotes.
#[derive(Debug, Clone, Default)]
pub struct BatchEngine {
    config: BatchEngineConfig,
}

impl BatchEngine {
    pub fn new(config: BatchEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchEngineConfig {
        &self.config
    }

    /// Inserta un lote recién creado y lo marca como actual.
    pub fn insert_current(&self, state: &mut StoreState, batch: Batch) -> Batch {
        state.current_batch = Some(batch.id.clone());
        state.batches.insert(batch.id.clone(), batch.clone());
        batch
    }

    /// Avanza un paso. En el último paso finaliza el lote
    /// (`completed`, `end_time = now`) y libera el puntero actual.
    pub fn advance(&self, state: &mut StoreState, batch_id: Option<&str>, now: DateTime<Utc>) -> Option<Batch> {
        let id = state.target_id(batch_id)?;
        let batch = state.batches.get_mut(&id)?;
        if batch.is_terminal() {
            return Some(batch.clone());
        }
        let max = batch.max_steps();
        if batch.current_step >= max {
            batch.current_step = max;
            batch.status = BatchStatus::Completed;
            batch.end_time = Some(now);
            info!("batch {} completed at step {}", id, max);
            let done = batch.clone();
            state.release_current(&id);
            return Some(done);
        }
        batch.current_step += 1;
        batch.status = BatchStatus::Running;
        Some(batch.clone())
    }

    /// Retrocede un paso sin bajar de 1 y deja el lote en `idle`.
    pub fn revert(&self, state: &mut StoreState, batch_id: Option<&str>) -> Option<Batch> {
        let id = state.target_id(batch_id)?;
        let batch = state.batches.get_mut(&id)?;
        if batch.is_terminal() {
            return Some(batch.clone());
        }
        batch.current_step = batch.current_step.saturating_sub(1).max(1);
        batch.status = BatchStatus::Idle;
        Some(batch.clone())
    }

    /// Finaliza el lote sin importar el paso actual. Alimento salta a 5,
    /// compost a 4; `mixed` según `MixedCompletion`.
    pub fn complete(&self, state: &mut StoreState, batch_id: Option<&str>, now: DateTime<Utc>) -> Option<Batch> {
        let id = state.target_id(batch_id)?;
        let batch = state.batches.get_mut(&id)?;
        if batch.is_terminal() {
            return Some(batch.clone());
        }
        match batch.process_type {
            ProcessType::Feed | ProcessType::Compost => batch.current_step = batch.max_steps(),
            ProcessType::Mixed => {
                if self.config.mixed_completion == MixedCompletion::SnapToMax {
                    batch.current_step = batch.max_steps();
                }
            }
        }
        batch.status = BatchStatus::Completed;
        batch.end_time = Some(now);
        info!("batch {} force-completed at step {}", id, batch.current_step);
        let done = batch.clone();
        state.release_current(&id);
        Some(done)
    }

    /// Parada de emergencia: el lote actual pasa a `error`, el motor a
    /// `idle` y el puntero actual se limpia siempre. Un lote ya terminal
    /// conserva su estado.
    pub fn emergency_stop(&self, state: &mut StoreState) -> Option<Batch> {
        state.telemetry.motor = MotorState::Idle;
        let id = state.current_batch.take()?;
        let batch = state.batches.get_mut(&id)?;
        if !batch.is_terminal() {
            batch.status = BatchStatus::Error;
        }
        warn!("emergency stop on batch {} (status {})", id, batch.status);
        Some(batch.clone())
    }

    /// Arranque local: motor en marcha; el lote actual pasa a `running`,
    /// su paso 0 se inicializa a 1 y `start_time` se fija si faltaba.
    pub fn start_processing(&self, state: &mut StoreState, now: DateTime<Utc>) -> Option<Batch> {
        state.telemetry.motor = MotorState::Running;
        let id = state.current_batch.clone()?;
        let batch = state.batches.get_mut(&id)?;
        if batch.is_terminal() {
            return Some(batch.clone());
        }
        if batch.current_step == 0 {
            batch.current_step = 1;
        }
        if batch.start_time.is_none() {
            batch.start_time = Some(now);
        }
        batch.status = BatchStatus::Running;
        Some(batch.clone())
    }

    /// Parada local reanudable: `idle` en lote y motor, el paso se
    /// conserva y el lote no se completa.
    pub fn stop_processing(&self, state: &mut StoreState) -> Option<Batch> {
        state.telemetry.motor = MotorState::Idle;
        let id = state.current_batch.clone()?;
        let batch = state.batches.get_mut(&id)?;
        if batch.is_terminal() {
            return Some(batch.clone());
        }
        batch.status = BatchStatus::Idle;
        Some(batch.clone())
    }

    /// Aplica la respuesta del servidor sobre el lote `batch_id`. Si el
    /// servidor lo deja en un estado terminal se libera el puntero. Un lote
    /// que ya era terminal localmente (p. ej. parada de emergencia mientras
    /// la llamada estaba en vuelo) se devuelve sin cambios.
    pub fn apply_remote(&self, state: &mut StoreState, batch_id: &str, remote: &RemoteBatch) -> Option<Batch> {
        let batch = state.batches.get_mut(batch_id)?;
        if batch.is_terminal() {
            warn!("ignoring server update for {} batch {}", batch.status, batch_id);
            return Some(batch.clone());
        }
        batch.reconcile(remote);
        let out = batch.clone();
        if out.is_terminal() {
            state.release_current(batch_id);
        }
        Some(out)
    }

    /// Reemplaza la colección con los lotes del servidor. Los lotes ya
    /// conocidos se reconcilian sobre la copia local (un lote terminal sólo
    /// recibe los pesos); los nuevos resuelven su máquina por código de
    /// hardware. El puntero actual sobrevive sólo
    /// si el lote sigue presente y no es terminal.
    pub fn replace_batches(&self, state: &mut StoreState, remote: &[RemoteBatch]) -> Vec<Batch> {
        let mut batches: IndexMap<String, Batch> = IndexMap::with_capacity(remote.len());
        for r in remote {
            let batch = match state.batches.get(&r.id) {
                Some(local) => {
                    let mut b = local.clone();
                    b.reconcile(r);
                    b
                }
                None => {
                    let mut b = Batch::from_remote(r);
                    let owner = state.machines
                                     .iter()
                                     .find(|m| r.machine_id.as_deref() == Some(m.machine_id.as_str()));
                    if let Some(m) = owner {
                        b.machine_id = m.id.clone();
                    }
                    b
                }
            };
            batches.insert(r.id.clone(), batch);
        }
        let keep = state.current_batch
                        .as_ref()
                        .and_then(|id| batches.get(id))
                        .map(|b| !b.is_terminal())
                        .unwrap_or(false);
        if !keep {
            state.current_batch = None;
        }
        state.batches = batches;
        state.batches.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(process_type: ProcessType, step: u32) -> StoreState {
        let mut state = StoreState::default();
        let mut b = Batch::started("b1".into(), "m1".into(), 2.0, Utc::now());
        b.process_type = process_type;
        b.current_step = step;
        BatchEngine::default().insert_current(&mut state, b);
        state
    }

    #[test]
    fn advance_through_every_type_completes_at_max() {
        for pt in [ProcessType::Feed, ProcessType::Compost, ProcessType::Mixed] {
            let engine = BatchEngine::default();
            let mut state = state_with(pt, 1);
            let mut last = None;
            for _ in 0..pt.max_steps() {
                last = engine.advance(&mut state, Some("b1"), Utc::now());
            }
            let b = last.unwrap();
            assert_eq!(b.status, BatchStatus::Completed, "{pt}");
            assert_eq!(b.current_step, pt.max_steps());
            assert!(b.end_time.is_some());
            assert!(state.current_batch.is_none());
        }
    }

    #[test]
    fn advance_sets_running_from_idle() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 2);
        state.batches["b1"].status = BatchStatus::Idle;
        let b = engine.advance(&mut state, None, Utc::now()).unwrap();
        assert_eq!(b.current_step, 3);
        assert_eq!(b.status, BatchStatus::Running);
    }

    #[test]
    fn revert_floors_at_one() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Compost, 1);
        let b = engine.revert(&mut state, None).unwrap();
        assert_eq!(b.current_step, 1);
        assert_eq!(b.status, BatchStatus::Idle);
    }

    #[test]
    fn missing_batch_is_noop() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 2);
        let before = state.batches.clone();
        assert!(engine.advance(&mut state, Some("nope"), Utc::now()).is_none());
        assert!(engine.revert(&mut state, Some("nope")).is_none());
        assert!(engine.complete(&mut state, Some("nope"), Utc::now()).is_none());
        assert_eq!(state.batches, before);
    }

    #[test]
    fn complete_snaps_feed_to_five() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 3);
        let b = engine.complete(&mut state, None, Utc::now()).unwrap();
        assert_eq!(b.current_step, 5);
        assert_eq!(b.status, BatchStatus::Completed);
        assert!(state.current_batch.is_none());
        assert!(state.batches.contains_key("b1"));
    }

    #[test]
    fn complete_snaps_compost_to_four() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Compost, 2);
        let b = engine.complete(&mut state, None, Utc::now()).unwrap();
        assert_eq!(b.current_step, 4);
        assert_eq!(b.status, BatchStatus::Completed);
        assert!(b.end_time.is_some());
    }

    #[test]
    fn mixed_completion_policy() {
        let keep = BatchEngine::default();
        let mut state = state_with(ProcessType::Mixed, 4);
        assert_eq!(keep.complete(&mut state, None, Utc::now()).unwrap().current_step, 4);

        let snap = BatchEngine::new(BatchEngineConfig { mixed_completion: MixedCompletion::SnapToMax });
        let mut state = state_with(ProcessType::Mixed, 4);
        assert_eq!(snap.complete(&mut state, None, Utc::now()).unwrap().current_step, 9);
    }

    #[test]
    fn terminal_batches_ignore_transitions() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 3);
        let done = engine.complete(&mut state, Some("b1"), Utc::now()).unwrap();
        assert_eq!(engine.advance(&mut state, Some("b1"), Utc::now()).unwrap(), done);
        assert_eq!(engine.revert(&mut state, Some("b1")).unwrap(), done);
    }

    #[test]
    fn emergency_stop_errors_current_and_clears_pointer() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 2);
        state.telemetry.motor = MotorState::Running;
        let b = engine.emergency_stop(&mut state).unwrap();
        assert_eq!(b.status, BatchStatus::Error);
        assert!(state.current_batch.is_none());
        assert_eq!(state.telemetry.motor, MotorState::Idle);
        // sin lote actual sigue siendo total
        assert!(engine.emergency_stop(&mut state).is_none());
    }

    #[test]
    fn server_update_does_not_revive_terminal_batch() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 2);
        let stopped = engine.emergency_stop(&mut state).unwrap();
        let remote = RemoteBatch { id: "b1".into(),
                                   status: Some(BatchStatus::Idle),
                                   current_step: Some(1),
                                   ..Default::default() };
        assert_eq!(engine.apply_remote(&mut state, "b1", &remote).unwrap(), stopped);

        let running = RemoteBatch { status: Some(BatchStatus::Running),
                                    actual_weight: Some(1.8),
                                    ..remote };
        let after = engine.replace_batches(&mut state, &[running]);
        assert_eq!(after[0].status, BatchStatus::Error);
        assert_eq!(after[0].current_step, 2);
        assert_eq!(after[0].actual_weight, Some(1.8));
        assert!(state.current_batch.is_none());
    }

    #[test]
    fn replace_batches_drops_stale_pointer() {
        let engine = BatchEngine::default();
        let mut state = state_with(ProcessType::Feed, 2);
        let remote = vec![RemoteBatch { id: "other".into(), ..Default::default() }];
        engine.replace_batches(&mut state, &remote);
        assert!(state.current_batch.is_none());
        assert_eq!(state.batches.len(), 1);
    }
}
