// Credenciales que el adaptador adjunta a cada petición: token bearer de la
// sesión y, si la hay, la identidad del dispositivo. El inicio de sesión
// ocurre fuera de este crate.
use async_trait::async_trait;
use waste_flow::RemoteError;

/// Cabecera con la identidad del dispositivo. El servidor invalida la
/// sesión cuando no coincide con la registrada para el token.
pub const DEVICE_ID_HEADER: &str = "X-Device-Id";

/// Credencial de una sesión.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub token: String,
  pub device_id: Option<String>,
}

/// Fuente consultada antes de cada petición; `Ok(None)` envía la petición
/// sin cabeceras de autenticación.
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
  async fn credentials(&self) -> Result<Option<Credentials>, RemoteError>;
}

/// Peticiones anónimas.
pub struct Anonymous;

#[async_trait]
impl CredentialSource for Anonymous {
  async fn credentials(&self) -> Result<Option<Credentials>, RemoteError> {
    Ok(None)
  }
}

/// Sesión ya abierta: token fijo y, opcionalmente, el id del dispositivo.
pub struct SessionCredentials(Credentials);

impl SessionCredentials {
  pub fn new(token: impl Into<String>) -> Self {
    Self(Credentials { token: token.into(),
                       device_id: None })
  }

  pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
    self.0.device_id = Some(device_id.into());
    self
  }
}

#[async_trait]
impl CredentialSource for SessionCredentials {
  async fn credentials(&self) -> Result<Option<Credentials>, RemoteError> {
    if self.0.token.trim().is_empty() {
      return Err(RemoteError::Auth("token de sesión vacío".into()));
    }
    Ok(Some(self.0.clone()))
  }
}
