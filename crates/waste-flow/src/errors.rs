// Archivo: errors.rs
// Propósito: definir los errores del gestor de lotes y el alias Result<T>
// usado por las APIs del crate.
use crate::domain::ProcessType;
use std::time::Duration;
use thiserror::Error;

/// Errores de validación local. Se detectan antes de cualquier llamada de
/// red y nunca se reintentan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No hay máquina seleccionada.
    #[error("no hay máquina seleccionada")]
    MissingMachine,
    /// La máquina indicada no está registrada en la sesión.
    #[error("máquina desconocida: {0}")]
    UnknownMachine(String),
    /// Peso estimado vacío.
    #[error("falta el peso estimado")]
    MissingWeight,
    /// Peso estimado que no es un número finito.
    #[error("peso estimado no numérico: {0}")]
    WeightNotNumeric(String),
    /// Peso fuera de `(0, 5]` kg.
    #[error("peso estimado fuera de rango (0, 5] kg: {0}")]
    WeightOutOfRange(f64),
    /// Tipo de proceso no admitido por la operación.
    #[error("tipo de proceso no admitido: {0}")]
    UnsupportedProcessType(ProcessType),
    /// Texto que no corresponde a ningún tipo de proceso.
    #[error("tipo de proceso desconocido: {0}")]
    UnknownProcessType(String),
    /// Campo obligatorio vacío.
    #[error("campo obligatorio vacío: {0}")]
    EmptyField(&'static str),
}

/// Clasificación estable de un fallo remoto, para que las capas superiores
/// no tengan que buscar subcadenas en el cuerpo de la respuesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    MachineNotFound,
    ActiveBatchExists,
    /// El servidor invalidó la sesión: el dispositivo no coincide con el
    /// registrado para el token. La capa de autenticación debe cerrarla.
    SessionRevoked,
    Unauthorized,
    NotFound,
    Server,
    Transport,
    Decode,
}

/// Fallo reportado por el adaptador remoto.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Respuesta con estado no exitoso.
    #[error("HTTP {status} {status_text}: {body}")]
    Status { status: u16, status_text: String, body: String },
    /// La petición no llegó a completarse.
    #[error("red: {0}")]
    Network(String),
    /// Respuesta exitosa con cuerpo inesperado.
    #[error("decodificación: {0}")]
    Decode(String),
    /// No se pudo obtener la credencial.
    #[error("autenticación: {0}")]
    Auth(String),
}

impl RemoteError {
    /// Clasifica el error a partir del estado HTTP y de los mensajes
    /// conocidos del servidor.
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Status { status, status_text, body } => {
                let text = format!("{} {}", status_text, body).to_lowercase();
                if text.contains("machine_not_found") || text.contains("machine not found") {
                    RemoteErrorKind::MachineNotFound
                } else if text.contains("already has an active batch") || text.contains("active_batch") {
                    RemoteErrorKind::ActiveBatchExists
                } else if (*status == 401 || *status == 403) && text.contains("device") {
                    RemoteErrorKind::SessionRevoked
                } else if *status == 401 || *status == 403 {
                    RemoteErrorKind::Unauthorized
                } else if *status == 404 {
                    RemoteErrorKind::NotFound
                } else {
                    RemoteErrorKind::Server
                }
            }
            RemoteError::Network(_) => RemoteErrorKind::Transport,
            RemoteError::Decode(_) => RemoteErrorKind::Decode,
            RemoteError::Auth(_) => RemoteErrorKind::Unauthorized,
        }
    }
}

/// Errores comunes del gestor de lotes.
///
/// - `Validation`: entrada inválida, antes de tocar la red.
/// - `NoCurrentBatch`: la operación necesita un lote actual.
/// - `Remote`: rechazo o fallo de transporte del servidor.
/// - `Timeout` / `Cancelled`: la llamada remota no terminó.
/// - `Storage`: estado interno inconsistente.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Error de validación: {0}")]
    Validation(#[from] ValidationError),
    #[error("No hay lote actual")]
    NoCurrentBatch,
    #[error("Error remoto: {0}")]
    Remote(#[from] RemoteError),
    #[error("Tiempo de espera agotado tras {0:?}")]
    Timeout(Duration),
    #[error("Llamada remota cancelada")]
    Cancelled,
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl BatchError {
    /// Tipo de error remoto, si el fallo vino del servidor o de la red.
    /// Los timeouts se tratan como fallo de transporte.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            BatchError::Remote(e) => Some(e.kind()),
            BatchError::Timeout(_) | BatchError::Cancelled => Some(RemoteErrorKind::Transport),
            _ => None,
        }
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Resultado de las llamadas del adaptador remoto.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
