use std::sync::Arc;
use waste_flow::errors::BatchError;
use waste_flow::stubs::InMemoryBatchRemote;
use waste_flow::{BatchService, BatchServiceConfig, BatchStore, ProcessType};

#[tokio::main]
async fn main() -> Result<(), BatchError> {
    // Servidor falso y estado compartido
    let remote = Arc::new(InMemoryBatchRemote::new());
    let service = BatchService::new(remote.clone(), Arc::new(BatchStore::new()), BatchServiceConfig::default());

    let machine = service.register_machine("HW-100", "planta norte").await?;
    println!("machine {} -> {}", machine.machine_id, machine.id);

    // Crear lote y sincronizar arranque con el servidor
    let batch = service.create_batch(Some(&machine), "2.5").await?;
    println!("created batch {} ({:?})", batch.id, batch.status);
    let batch = service.start_batch_api().await?;
    println!("started at {:?}", batch.start_time);

    let record = service.create_batch_process(ProcessType::Feed).await?;
    println!("process record: {:?}", record);

    // Recorrer las etapas hasta completar
    while let Some(b) = service.advance_batch_step(None) {
        let stage = b.stage().map(|s| s.label()).unwrap_or("-");
        println!("step {}/{} {} {:?}", b.current_step, b.max_steps(), stage, b.status);
        if b.is_terminal() {
            break;
        }
    }

    // Un segundo lote en otra máquina, detenido por emergencia
    let other = service.register_machine("HW-101", "planta sur").await?;
    service.create_batch(Some(&other), "1").await?;
    service.advance_batch_step(None);
    if let Some(b) = service.emergency_stop() {
        println!("emergency stop: {} -> {:?}", b.id, b.status);
    }

    let all = service.fetch_batches(Some(&machine.machine_id)).await?;
    println!("server batches: {}", all.len());
    println!("remote calls: {}", remote.calls());
    Ok(())
}
