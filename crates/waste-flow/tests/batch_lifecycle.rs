use std::sync::Arc;
use waste_flow::stubs::InMemoryBatchRemote;
use waste_flow::{BatchError, BatchService, BatchServiceConfig, BatchStatus, BatchStore, MotorState, ProcessType,
                 RemoteBatch, ValidationError};

fn setup() -> (Arc<InMemoryBatchRemote>, BatchService<InMemoryBatchRemote>) {
  let remote = Arc::new(InMemoryBatchRemote::new());
  let store = Arc::new(BatchStore::new());
  let service = BatchService::new(remote.clone(), store, BatchServiceConfig::default());
  (remote, service)
}

#[tokio::test]
async fn mixed_batch_completes_after_nine_advances() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-001", "patio");

  let batch = service.create_batch(Some(&machine), "2.5").await.expect("create");
  assert_eq!(batch.process_type, ProcessType::Mixed);
  assert_eq!(batch.status, BatchStatus::Running);
  assert_eq!(batch.current_step, 1);
  assert_eq!(batch.machine_id, machine.id);
  assert_eq!(service.store().current_batch().unwrap().id, batch.id);

  let mut last = None;
  for _ in 0..9 {
    last = service.advance_batch_step(None).or(last);
  }
  let done = last.expect("advanced");
  assert_eq!(done.status, BatchStatus::Completed);
  assert_eq!(done.current_step, 9);
  assert!(done.end_time.is_some());
  // el lote sale del puntero actual pero queda en el historial
  assert!(service.store().current_batch().is_none());
  assert_eq!(service.store().batch(&batch.id).unwrap().status, BatchStatus::Completed);
}

#[tokio::test]
async fn stop_after_start_is_resumable() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-002", "galpon");
  service.create_batch(Some(&machine), "1").await.expect("create");

  service.start_processing().expect("start");
  assert_eq!(service.store().telemetry().motor, MotorState::Running);
  let stopped = service.stop_processing().expect("stop");
  assert_eq!(stopped.status, BatchStatus::Idle);
  assert_eq!(stopped.current_step, 1);
  assert!(stopped.end_time.is_none());
  assert_eq!(service.store().telemetry().motor, MotorState::Idle);
  // sigue siendo el lote actual
  assert_eq!(service.store().current_batch().unwrap().id, stopped.id);
}

#[tokio::test]
async fn revert_at_first_step_stays_at_one() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-003", "norte");
  service.create_batch(Some(&machine), "3").await.expect("create");

  let b = service.revert_batch_step(None).unwrap();
  assert_eq!(b.current_step, 1);
  assert_eq!(b.status, BatchStatus::Idle);
}

#[tokio::test]
async fn complete_and_emergency_paths() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-004", "sur");
  let batch = service.create_batch(Some(&machine), "4.2").await.expect("create");

  let done = service.complete_batch(Some(&batch.id)).unwrap();
  assert_eq!(done.status, BatchStatus::Completed);
  // mixed conserva el paso por defecto
  assert_eq!(done.current_step, 1);
  assert!(service.store().current_batch().is_none());

  // completado es terminal
  assert_eq!(service.advance_batch_step(Some(&batch.id)).unwrap(), done);
  assert_eq!(service.revert_batch_step(Some(&batch.id)).unwrap(), done);

  // sin lote actual la parada de emergencia no hace nada sobre lotes
  assert!(service.emergency_stop().is_none());
  assert_eq!(service.store().batch(&batch.id).unwrap().status, BatchStatus::Completed);
}

#[tokio::test]
async fn emergency_stop_moves_current_to_error() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-005", "este");
  let batch = service.create_batch(Some(&machine), "2").await.expect("create");
  service.start_processing();
  service.advance_batch_step(None);

  let stopped = service.emergency_stop().unwrap();
  assert_eq!(stopped.id, batch.id);
  assert_eq!(stopped.status, BatchStatus::Error);
  assert_eq!(stopped.current_step, 2);
  assert!(service.store().current_batch().is_none());
  assert_eq!(service.store().telemetry().motor, MotorState::Idle);
  // error tampoco admite transiciones
  assert_eq!(service.advance_batch_step(Some(&batch.id)).unwrap().status, BatchStatus::Error);
}

#[tokio::test]
async fn invalid_weights_fail_before_network() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-006", "oeste");

  for raw in ["0", "-2", "abc", "5.5", "", "inf"] {
    let err = service.create_batch(Some(&machine), raw).await.unwrap_err();
    assert!(matches!(err, BatchError::Validation(_)), "{raw}: {err}");
  }
  let err = service.create_batch(None, "2").await.unwrap_err();
  assert!(matches!(err, BatchError::Validation(ValidationError::MissingMachine)));
  assert_eq!(remote.calls(), 0);
  assert!(service.store().batches().is_empty());
}

#[tokio::test]
async fn missing_batch_operations_are_noops() {
  let (_remote, service) = setup();
  assert!(service.advance_batch_step(None).is_none());
  assert!(service.revert_batch_step(Some("ghost")).is_none());
  assert!(service.complete_batch(Some("ghost")).is_none());
  assert!(service.stop_processing().is_none());
}

#[tokio::test]
async fn complete_snaps_compost_batch_to_last_step() {
  let (remote, service) = setup();
  let machine = remote.seed_machine("HW-006", "compostera");
  remote.seed_batch(RemoteBatch { id: "compost-1".into(),
                                  machine_id: Some("HW-006".into()),
                                  status: Some(BatchStatus::Running),
                                  process_type: Some(ProcessType::Compost),
                                  current_step: Some(2),
                                  ..Default::default() });
  service.fetch_batches(Some(&machine.machine_id)).await.expect("fetch");

  let done = service.complete_batch(Some("compost-1")).unwrap();
  assert_eq!(done.process_type, ProcessType::Compost);
  assert_eq!(done.current_step, 4);
  assert_eq!(done.status, BatchStatus::Completed);
  assert!(done.end_time.is_some());
}
