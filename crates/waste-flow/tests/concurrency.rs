use std::sync::Arc;
use std::time::Duration;
use waste_flow::stubs::InMemoryBatchRemote;
use waste_flow::{BatchError, BatchService, BatchServiceConfig, BatchStatus, BatchStore, MotorState, TelemetryPatch};

#[tokio::test(start_paused = true)]
async fn double_tap_start_stop_is_serialized() {
  let remote = Arc::new(InMemoryBatchRemote::new());
  let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());
  let machine = remote.seed_machine("HW-500", "patio");
  let batch = service.create_batch(Some(&machine), "2").await.expect("create");
  remote.set_delay(Some(Duration::from_millis(200)));

  let (start, stop) = tokio::join!(service.start_batch_api(), service.stop_batch_api());
  let start = start.expect("start");
  let stop = stop.expect("stop");
  // el segundo toque ve el resultado del primero
  assert_eq!(start.status, BatchStatus::Running);
  assert_eq!(stop.status, BatchStatus::Idle);

  let local = service.store().batch(&batch.id).unwrap();
  let server = remote.server_batch(&batch.id).unwrap();
  assert_eq!(Some(local.status), server.status);
  assert_eq!(local.status, BatchStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn double_tap_create_yields_single_batch() {
  let remote = Arc::new(InMemoryBatchRemote::new());
  let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());
  let machine = remote.seed_machine("HW-501", "patio");
  remote.set_delay(Some(Duration::from_millis(50)));

  let (a, b) = tokio::join!(service.create_batch(Some(&machine), "1"), service.create_batch(Some(&machine), "1"));
  assert!(a.is_ok() != b.is_ok(), "exactly one create must win");
  assert_eq!(service.store().batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn telemetry_interleaves_with_inflight_sync() {
  let remote = Arc::new(InMemoryBatchRemote::new());
  let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());
  let machine = remote.seed_machine("HW-502", "patio");
  service.create_batch(Some(&machine), "2").await.expect("create");
  remote.set_delay(Some(Duration::from_secs(1)));

  let store = service.store().clone();
  let (res, seen) = tokio::join!(service.stop_batch_api(), async move {
    tokio::time::sleep(Duration::from_millis(10)).await;
    let t = store.apply_telemetry(TelemetryPatch { grinder_rpm: Some(900.0),
                                                   motor: Some(MotorState::Running),
                                                   ..Default::default() });
    // el lote todavía no cambió: la llamada sigue en vuelo
    (t, store.current_batch().unwrap().status)
  });
  res.expect("stop");
  assert_eq!(seen.0.grinder_rpm, 900.0);
  assert_eq!(seen.1, BatchStatus::Running);
  assert_eq!(service.store().telemetry().grinder_rpm, 900.0);
  assert_eq!(service.store().current_batch().unwrap().status, BatchStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn emergency_stop_during_inflight_sync_stays_error() {
  let remote = Arc::new(InMemoryBatchRemote::new());
  let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());
  let machine = remote.seed_machine("HW-503", "patio");
  let batch = service.create_batch(Some(&machine), "2").await.expect("create");
  remote.set_delay(Some(Duration::from_millis(500)));
  let calls_before = remote.calls();

  let (stop, stopped, queued) = tokio::join!(service.stop_batch_api(),
                                             async {
                                               tokio::time::sleep(Duration::from_millis(10)).await;
                                               service.emergency_stop()
                                             },
                                             async {
                                               // segundo toque: hace cola detrás de la parada en vuelo
                                               tokio::time::sleep(Duration::from_millis(5)).await;
                                               service.start_batch_api().await
                                             });

  assert_eq!(stopped.expect("emergency").status, BatchStatus::Error);
  // la respuesta tardía no saca al lote de `error`
  assert_eq!(stop.expect("stop").status, BatchStatus::Error);
  assert!(matches!(queued, Err(BatchError::NoCurrentBatch)));
  assert_eq!(remote.calls(), calls_before + 1);

  let local = service.store().batch(&batch.id).unwrap();
  assert_eq!(local.status, BatchStatus::Error);
  assert!(service.store().current_batch().is_none());
}
