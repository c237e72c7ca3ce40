use anyhow::Context;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use waste_flow::{Batch, BatchService, BatchServiceConfig, BatchStore, ProcessType};
use waste_remote::{HttpBatchRemote, RemoteConfig};

/// Menú interactivo de operador para la planta de procesamiento.
///
/// Lee `WASTE_API_URL`, `WASTE_API_TOKEN` y `WASTE_API_TIMEOUT_SECS` (o un
/// `.env`) y opera sobre el servidor remoto:
/// 1) Registrar máquina          7) Avanzar paso
/// 2) Ver máquinas / lotes       8) Retroceder paso
/// 3) Seleccionar máquina        9) Completar lote
/// 4) Crear lote                10) Parada de emergencia
/// 5) Iniciar lote (API)        11) Crear registro de proceso
/// 6) Detener lote (API)        12) Sincronizar lotes
///                              13) Salir
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env())
                             .init();

    let config = RemoteConfig::from_env().context("configuración del servidor remoto")?;
    let remote = Arc::new(HttpBatchRemote::from_config(&config)?);
    let store = Arc::new(BatchStore::new());
    let service = BatchService::new(remote,
                                    store,
                                    BatchServiceConfig { request_timeout: config.timeout,
                                                         ..Default::default() });
    info!("conectado a {}", config.base_url);

    loop {
        println!("\n== Menú de lotes ==");
        println!("1) Registrar máquina");
        println!("2) Ver máquinas y lotes");
        println!("3) Seleccionar máquina");
        println!("4) Crear lote en la máquina seleccionada");
        println!("5) Iniciar lote actual (API)");
        println!("6) Detener lote actual (API)");
        println!("7) Avanzar paso");
        println!("8) Retroceder paso");
        println!("9) Completar lote");
        println!("10) Parada de emergencia");
        println!("11) Crear registro de proceso");
        println!("12) Sincronizar lotes con el servidor");
        println!("13) Salir");
        let choice = prompt("Elige una opción: ")?;

        match choice.trim() {
            "1" => {
                let code = prompt("Código de hardware: ")?;
                let name = prompt("Nombre: ")?;
                match service.register_machine(&code, &name).await {
                    Ok(m) => println!("Máquina registrada: {} ({})", m.name, m.id),
                    Err(e) => eprintln!("Error registrando máquina: {}", e),
                }
            }
            "2" => {
                let selected = service.store().selected_machine().map(|m| m.id);
                println!("\nID                                   | CÓDIGO     | NOMBRE");
                for m in service.store().machines() {
                    let mark = if selected.as_deref() == Some(m.id.as_str()) { "*" } else { " " };
                    println!("{}{} | {:<10} | {}", mark, m.id, m.machine_id, m.name);
                }
                println!("\nLotes:");
                let current = service.store().current_batch().map(|b| b.id);
                for b in service.store().batches() {
                    let mark = if current.as_deref() == Some(b.id.as_str()) { "*" } else { " " };
                    println!("{}{}", mark, describe(&b));
                }
            }
            "3" => {
                let id = prompt("Id de máquina: ")?;
                match service.select_machine(id.trim()) {
                    Ok(m) => println!("Seleccionada: {}", m.name),
                    Err(e) => eprintln!("{}", e),
                }
            }
            "4" => {
                let weight = prompt("Peso estimado en kg (0-5]: ")?;
                let machine = service.store().selected_machine();
                match service.create_batch(machine.as_ref(), &weight).await {
                    Ok(b) => println!("Lote creado: {}", describe(&b)),
                    Err(e) => eprintln!("Error creando lote: {}", e),
                }
            }
            "5" => report(service.start_batch_api().await),
            "6" => report(service.stop_batch_api().await),
            "7" => print_local(service.advance_batch_step(None)),
            "8" => print_local(service.revert_batch_step(None)),
            "9" => print_local(service.complete_batch(None)),
            "10" => print_local(service.emergency_stop()),
            "11" => {
                let raw = prompt("Tipo de proceso (feed / compost): ")?;
                let process_type: ProcessType = match raw.trim().parse() {
                    Ok(pt) => pt,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                match service.create_batch_process(process_type).await {
                    Ok(p) => println!("Proceso creado: {:?}", p),
                    Err(e) => eprintln!("Error creando proceso: {}", e),
                }
            }
            "12" => {
                let machine = service.store().selected_machine().map(|m| m.machine_id);
                match service.fetch_batches(machine.as_deref()).await {
                    Ok(list) => println!("{} lotes sincronizados", list.len()),
                    Err(e) => eprintln!("Error sincronizando: {}", e),
                }
            }
            "13" => break,
            _ => println!("Opción no válida"),
        }
    }

    Ok(())
}

fn describe(b: &Batch) -> String {
    let stage = b.stage().map(|s| s.label()).unwrap_or("-");
    format!("{} | {} | {} | paso {}/{} ({}) | {:.0}%",
            b.id,
            b.process_type,
            b.status,
            b.current_step,
            b.max_steps(),
            stage,
            b.progress() * 100.0)
}

fn report(res: waste_flow::Result<Batch>) {
    match res {
        Ok(b) => println!("{}", describe(&b)),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn print_local(batch: Option<Batch>) {
    match batch {
        Some(b) => println!("{}", describe(&b)),
        None => println!("No hay lote actual"),
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
