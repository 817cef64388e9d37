use crate::engine::{EngineError, EngineHandle};
use facegate_core::{Metadata, Outcome};
use std::path::PathBuf;
use tokio::sync::broadcast;
use zbus::fdo;
use zbus::interface;
use zbus::object_server::{InterfaceRef, SignalEmitter};

pub const BUS_NAME: &str = "org.facegate.Facegate1";
pub const OBJECT_PATH: &str = "/org/facegate/Facegate1";

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Facegate1
/// Object path: /org/facegate/Facegate1
///
/// Every method returns outcome JSON; the same outcome is also broadcast
/// through the `Outcome` signal.
pub struct FacegateService {
    engine: EngineHandle,
}

impl FacegateService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.facegate.Facegate1")]
impl FacegateService {
    /// Enroll the face in the image file at `image_path`.
    ///
    /// `metadata_json` is a JSON object of applicant identifiers, or empty.
    async fn enroll(&self, image_path: &str, metadata_json: &str) -> fdo::Result<String> {
        tracing::info!(image_path, "enroll requested");
        let image = image_arg(image_path)?;
        let metadata = metadata_arg(metadata_json)?;
        let outcome = self.engine.enroll(image, metadata).await.map_err(engine_error)?;
        Ok(outcome.to_json())
    }

    /// Match the face in the image file at `image_path` against enrolled identities.
    async fn authenticate(&self, image_path: &str) -> fdo::Result<String> {
        tracing::info!(image_path, "authenticate requested");
        let image = image_arg(image_path)?;
        let outcome = self.engine.authenticate(image).await.map_err(engine_error)?;
        Ok(outcome.to_json())
    }

    /// Remove every enrolled identity.
    async fn clear(&self) -> fdo::Result<String> {
        tracing::info!("clear requested");
        let outcome = self.engine.clear().await.map_err(engine_error)?;
        Ok(outcome.to_json())
    }

    /// Enrolled identities without their embeddings.
    async fn list_identities(&self) -> fdo::Result<String> {
        let summaries = self.engine.list().await.map_err(engine_error)?;
        serde_json::to_string(&summaries).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let status = self.engine.status().await.map_err(engine_error)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "engine": status,
        })
        .to_string())
    }

    /// Reload the face models from disk.
    async fn reinitialize(&self) -> fdo::Result<bool> {
        tracing::info!("reinitialize requested");
        match self.engine.reinitialize().await {
            Ok(version) => {
                tracing::info!(model_version = %version, "models reloaded");
                Ok(true)
            }
            Err(EngineError::Reinitialize(_)) => Ok(false),
            Err(err) => Err(engine_error(err)),
        }
    }

    /// Emitted once per enroll / authenticate / clear attempt.
    #[zbus(signal)]
    async fn outcome(emitter: &SignalEmitter<'_>, outcome_json: &str) -> zbus::Result<()>;
}

/// Re-publish every engine outcome as an `Outcome` signal.
pub async fn forward_outcomes(iface: InterfaceRef<FacegateService>, mut rx: broadcast::Receiver<Outcome>) {
    loop {
        match rx.recv().await {
            Ok(outcome) => {
                if let Err(err) = FacegateService::outcome(iface.signal_emitter(), &outcome.to_json()).await {
                    tracing::warn!(error = %err, action = %outcome.action, "failed to emit Outcome signal");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "outcome signal forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// The daemon does not share the caller's working directory.
fn image_arg(image_path: &str) -> fdo::Result<PathBuf> {
    let path = PathBuf::from(image_path);
    if image_path.is_empty() || !path.is_absolute() {
        return Err(fdo::Error::InvalidArgs(format!(
            "image path must be absolute, got {image_path:?}"
        )));
    }
    Ok(path)
}

fn metadata_arg(metadata_json: &str) -> fdo::Result<Metadata> {
    if metadata_json.trim().is_empty() {
        return Ok(Metadata::new());
    }
    serde_json::from_str(metadata_json)
        .map_err(|e| fdo::Error::InvalidArgs(format!("metadata must be a JSON object of strings/numbers: {e}")))
}

fn engine_error(err: EngineError) -> fdo::Error {
    match err {
        EngineError::Busy => fdo::Error::LimitsExceeded(err.to_string()),
        EngineError::Timeout(_) => fdo::Error::TimedOut(err.to_string()),
        other => fdo::Error::Failed(other.to_string()),
    }
}
