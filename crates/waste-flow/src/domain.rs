// Archivo: domain.rs
// Propósito: tipos del dominio de lotes (`Batch`), máquinas (`Machine`),
// registros de proceso y telemetría. Son datos puros; las transiciones de
// estado viven en `engine.rs`.
use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Peso estimado máximo aceptado al crear un lote (kg).
pub const MAX_ESTIMATED_WEIGHT_KG: f64 = 5.0;

/// Tipo de proceso de un lote: alimento, compost o ambos en secuencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Feed,
    Compost,
    #[default]
    Mixed,
}

/// Etapas mecánicas por las que pasa un lote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Recognition,
    Sorting,
    Grinding,
    Vermicasting,
    Dehydration,
    Completion,
}

const FEED_STAGES: [Stage; 5] = [Stage::Recognition,
                                 Stage::Sorting,
                                 Stage::Grinding,
                                 Stage::Dehydration,
                                 Stage::Completion];

const COMPOST_STAGES: [Stage; 4] = [Stage::Recognition, Stage::Vermicasting, Stage::Dehydration, Stage::Completion];

// mixed = 5 sub-pasos de alimento seguidos de 4 de compost
const MIXED_STAGES: [Stage; 9] = [Stage::Recognition,
                                  Stage::Sorting,
                                  Stage::Grinding,
                                  Stage::Dehydration,
                                  Stage::Completion,
                                  Stage::Recognition,
                                  Stage::Vermicasting,
                                  Stage::Dehydration,
                                  Stage::Completion];

impl ProcessType {
    /// Número de pasos que componen el proceso.
    pub fn max_steps(self) -> u32 {
        self.stages().len() as u32
    }

    /// Etapas ordenadas del proceso.
    pub fn stages(self) -> &'static [Stage] {
        match self {
            ProcessType::Feed => &FEED_STAGES,
            ProcessType::Compost => &COMPOST_STAGES,
            ProcessType::Mixed => &MIXED_STAGES,
        }
    }

    /// Etapa correspondiente a un paso (1-based). `None` para 0 o fuera de
    /// rango.
    pub fn stage_at(self, step: u32) -> Option<Stage> {
        if step == 0 {
            return None;
        }
        self.stages().get(step as usize - 1).copied()
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessType::Feed => "feed",
            ProcessType::Compost => "compost",
            ProcessType::Mixed => "mixed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ProcessType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feed" => Ok(ProcessType::Feed),
            "compost" => Ok(ProcessType::Compost),
            "mixed" => Ok(ProcessType::Mixed),
            other => Err(ValidationError::UnknownProcessType(other.to_string())),
        }
    }
}

impl Stage {
    /// Etiqueta legible usada también por el servidor para `feedStatus` /
    /// `compostStatus`.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Recognition => "Recognition",
            Stage::Sorting => "Sorting",
            Stage::Grinding => "Grinding",
            Stage::Vermicasting => "Vermicasting",
            Stage::Dehydration => "Dehydration",
            Stage::Completion => "Completion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Estado de un lote.
///
/// `Completed` y `Error` son terminales: ninguna operación del gestor saca
/// un lote de ellos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Queued,
    #[default]
    Running,
    Idle,
    Completed,
    Error,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Error)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Running => "running",
            BatchStatus::Idle => "idle",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Unidad física registrada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Identificador estable asignado por el servidor.
    pub id: String,
    /// Código de hardware externo (el que se imprime en la máquina).
    pub machine_id: String,
    pub name: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stream_url: Option<String>,
}

/// Cambios parciales sobre una máquina (`PATCH /machines/{machineId}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachinePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
}

/// Una corrida de procesamiento sobre una máquina.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    /// Referencia a `Machine::id`; no es un puntero de propiedad.
    pub machine_id: String,
    pub process_type: ProcessType,
    pub status: BatchStatus,
    pub current_step: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_weight: Option<f64>,
    pub actual_weight: Option<f64>,
}

impl Batch {
    /// Lote recién aceptado por el servidor: en marcha, paso 1, tipo mixto.
    pub fn started(id: String, machine_id: String, estimated_weight: f64, now: DateTime<Utc>) -> Self {
        Self { id,
               machine_id,
               process_type: ProcessType::Mixed,
               status: BatchStatus::Running,
               current_step: 1,
               start_time: Some(now),
               end_time: None,
               estimated_weight: Some(estimated_weight),
               actual_weight: None }
    }

    /// Construye un lote local a partir del registro del servidor. Los
    /// campos ausentes toman los valores por defecto (`mixed`, `queued`).
    pub fn from_remote(remote: &RemoteBatch) -> Self {
        let process_type = remote.process_type.unwrap_or_default();
        Self { id: remote.id.clone(),
               machine_id: remote.machine_id.clone().unwrap_or_default(),
               process_type,
               status: remote.status.unwrap_or(BatchStatus::Queued),
               current_step: remote.current_step.unwrap_or(0).min(process_type.max_steps()),
               start_time: remote.started_at,
               end_time: remote.completed_at,
               estimated_weight: remote.estimated_weight,
               actual_weight: remote.actual_weight }
    }

    pub fn max_steps(&self) -> u32 {
        self.process_type.max_steps()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Etapa en la que se encuentra el lote.
    pub fn stage(&self) -> Option<Stage> {
        self.process_type.stage_at(self.current_step)
    }

    /// Progreso en `[0, 1]`.
    pub fn progress(&self) -> f64 {
        f64::from(self.current_step.min(self.max_steps())) / f64::from(self.max_steps())
    }

    /// Aplica la respuesta del servidor sobre la copia local. Sólo se
    /// sobrescriben los campos presentes; `machine_id` local se conserva.
    ///
    /// `current_step` pertenece al cliente (avanzar y retroceder no pasan
    /// por el servidor), así que el paso del servidor se ignora. Un lote
    /// terminal sólo acepta los pesos: estado, paso y fechas quedan fijos.
    pub fn reconcile(&mut self, remote: &RemoteBatch) {
        if remote.estimated_weight.is_some() {
            self.estimated_weight = remote.estimated_weight;
        }
        if remote.actual_weight.is_some() {
            self.actual_weight = remote.actual_weight;
        }
        if self.is_terminal() {
            return;
        }
        if let Some(pt) = remote.process_type {
            self.process_type = pt;
        }
        if let Some(status) = remote.status {
            self.status = status;
        }
        self.current_step = self.current_step.min(self.max_steps());
        if remote.started_at.is_some() {
            self.start_time = remote.started_at;
        }
        if remote.completed_at.is_some() {
            self.end_time = remote.completed_at;
        }
    }
}

/// Forma del lote tal como lo devuelve el servidor. Todo salvo `id` es
/// opcional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_type: Option<ProcessType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_weight: Option<f64>,
}

/// Sub-registro "process" de un lote en el servidor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feed_status: Option<String>,
    #[serde(default)]
    pub compost_status: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Actualización parcial del registro de proceso.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compost_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotorState {
    Running,
    #[default]
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiverterPosition {
    Feed,
    Compost,
    #[default]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    Open,
    #[default]
    Closed,
}

/// Última lectura conocida de sensores y actuadores. No guarda historial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub motor: MotorState,
    pub grinder_rpm: f64,
    pub dryer_temperature_c: f64,
    pub humidity_pct: f64,
    pub diverter: DiverterPosition,
    pub door: DoorState,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Lectura parcial; los campos `None` conservan el valor anterior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPatch {
    #[serde(default)]
    pub motor: Option<MotorState>,
    #[serde(default)]
    pub grinder_rpm: Option<f64>,
    #[serde(default)]
    pub dryer_temperature_c: Option<f64>,
    #[serde(default)]
    pub humidity_pct: Option<f64>,
    #[serde(default)]
    pub diverter: Option<DiverterPosition>,
    #[serde(default)]
    pub door: Option<DoorState>,
}

impl Telemetry {
    /// Fusiona una lectura parcial sobre el snapshot actual.
    pub fn merge(&mut self, patch: TelemetryPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.motor {
            self.motor = v;
        }
        if let Some(v) = patch.grinder_rpm {
            self.grinder_rpm = v;
        }
        if let Some(v) = patch.dryer_temperature_c {
            self.dryer_temperature_c = v;
        }
        if let Some(v) = patch.humidity_pct {
            self.humidity_pct = v;
        }
        if let Some(v) = patch.diverter {
            self.diverter = v;
        }
        if let Some(v) = patch.door {
            self.door = v;
        }
        self.updated_at = Some(now);
    }
}

/// Valida el peso estimado introducido por el usuario.
///
/// Acepta texto porque la entrada llega tal cual del formulario: vacío es
/// `MissingWeight`, no numérico (o no finito) es `WeightNotNumeric` y
/// fuera de `(0, 5]` es `WeightOutOfRange`.
pub fn parse_estimated_weight(raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingWeight);
    }
    let value: f64 = trimmed.parse()
                            .map_err(|_| ValidationError::WeightNotNumeric(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(ValidationError::WeightNotNumeric(trimmed.to_string()));
    }
    if value <= 0.0 || value > MAX_ESTIMATED_WEIGHT_KG {
        return Err(ValidationError::WeightOutOfRange(value));
    }
    Ok(value)
}
