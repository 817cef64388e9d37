use crate::config::Config;
use facegate_capture::FileSource;
use facegate_core::{
    DescriptorPipeline, EventChannel, Extractor, IdentityStore, IdentitySummary, JsonFileBackend, Metadata,
    OnnxPipeline, Orchestrator, Outcome, PipelineError, Status,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("another enroll or authenticate attempt is in progress")]
    Busy,
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to start engine: {0}")]
    Startup(#[from] std::io::Error),
    #[error("model reload failed: {0}")]
    Reinitialize(#[from] PipelineError),
}

/// Builds a fresh descriptor pipeline; used at startup and on reinitialize.
pub type PipelineLoader = Box<dyn Fn() -> Result<Box<dyn DescriptorPipeline>, PipelineError> + Send>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        image: PathBuf,
        metadata: Metadata,
        reply: oneshot::Sender<Outcome>,
    },
    Authenticate {
        image: PathBuf,
        reply: oneshot::Sender<Outcome>,
    },
    Clear {
        reply: oneshot::Sender<Outcome>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
    List {
        reply: oneshot::Sender<Vec<IdentitySummary>>,
    },
    Reinitialize {
        reply: oneshot::Sender<Result<String, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    /// Set while an enroll/authenticate is queued or running.
    busy: Arc<AtomicBool>,
    op_timeout: Duration,
}

impl EngineHandle {
    /// Enroll the face in the image at `image`.
    pub async fn enroll(&self, image: PathBuf, metadata: Metadata) -> Result<Outcome, EngineError> {
        self.biometric(|reply| EngineRequest::Enroll { image, metadata, reply })
            .await
    }

    /// Authenticate the face in the image at `image`.
    pub async fn authenticate(&self, image: PathBuf) -> Result<Outcome, EngineError> {
        self.biometric(|reply| EngineRequest::Authenticate { image, reply }).await
    }

    pub async fn clear(&self) -> Result<Outcome, EngineError> {
        self.request(|reply| EngineRequest::Clear { reply }).await
    }

    pub async fn status(&self) -> Result<Status, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }

    pub async fn list(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await
    }

    /// Reload the models; returns the new model version.
    pub async fn reinitialize(&self) -> Result<String, EngineError> {
        self.request(|reply| EngineRequest::Reinitialize { reply }).await?
    }

    /// One biometric attempt at a time; the engine thread clears the flag
    /// once the attempt has finished, even if the caller gave up waiting.
    async fn biometric(
        &self,
        build: impl FnOnce(oneshot::Sender<Outcome>) -> EngineRequest,
    ) -> Result<Outcome, EngineError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.within_timeout(async move {
            self.tx
                .send(build(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            guard.hand_over();
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        })
        .await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.within_timeout(async move {
            self.tx
                .send(build(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        })
        .await
    }

    /// `op_timeout` covers queueing as well as the engine's work.
    async fn within_timeout<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        tokio::time::timeout(self.op_timeout, call)
            .await
            .map_err(|_| EngineError::Timeout(self.op_timeout))?
    }
}

/// Holds the busy flag until the request reaches the engine thread.
///
/// Dropped before hand-over it releases the flag; afterwards the engine
/// thread owns it.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::Busy)?;
        Ok(Self { flag, armed: true })
    }

    fn hand_over(mut self) {
        self.armed = false;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
        }
    }
}

/// Pipeline loader reading the standard model files from `config.model_dir`.
pub fn onnx_loader(config: &Config) -> PipelineLoader {
    let model_dir = config.model_dir.clone();
    Box::new(move || {
        let pipeline = OnnxPipeline::load_from_dir(&model_dir)?;
        Ok(Box::new(pipeline) as Box<dyn DescriptorPipeline>)
    })
}

/// Assemble the orchestrator from configuration.
///
/// Missing models leave the extractor "not ready" and an unreadable store
/// falls back to memory; both are logged and the daemon still starts.
pub fn build_orchestrator(config: &Config, loader: &PipelineLoader, events: EventChannel) -> Orchestrator {
    let extractor = match loader() {
        Ok(pipeline) => {
            tracing::info!(
                model_dir = %config.model_dir.display(),
                model_version = pipeline.model_version(),
                "face models loaded"
            );
            Extractor::new(pipeline, config.retry_policy())
        }
        Err(err) => {
            tracing::warn!(
                model_dir = %config.model_dir.display(),
                error = %err,
                "face models unavailable; enroll/authenticate will fail until Reinitialize"
            );
            Extractor::not_ready(config.retry_policy())
        }
    };

    let store = match IdentityStore::open(Box::new(JsonFileBackend::new(&config.store_path))) {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!(
                path = %config.store_path.display(),
                error = %err,
                "identity store unreadable; keeping identities in memory only"
            );
            IdentityStore::in_memory()
        }
    };

    Orchestrator::new(store, extractor, events).with_rules(config.session_rules())
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the orchestrator and drives each request to completion
/// on its own current-thread runtime, so requests never interleave.
pub fn spawn_engine(
    orchestrator: Orchestrator,
    loader: PipelineLoader,
    op_timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let busy = Arc::new(AtomicBool::new(false));
    let busy_flag = busy.clone();

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            let mut orchestrator = orchestrator;
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { image, metadata, reply } => {
                        let mut source = FileSource::new(image);
                        let outcome = runtime.block_on(orchestrator.enroll(&mut source, metadata));
                        busy_flag.store(false, Ordering::Release);
                        let _ = reply.send(outcome);
                    }
                    EngineRequest::Authenticate { image, reply } => {
                        let mut source = FileSource::new(image);
                        let outcome = runtime.block_on(orchestrator.authenticate(&mut source));
                        busy_flag.store(false, Ordering::Release);
                        let _ = reply.send(outcome);
                    }
                    EngineRequest::Clear { reply } => {
                        let _ = reply.send(orchestrator.clear());
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(orchestrator.status());
                    }
                    EngineRequest::List { reply } => {
                        let _ = reply.send(orchestrator.summaries());
                    }
                    EngineRequest::Reinitialize { reply } => {
                        let result = loader().map_err(EngineError::from).map(|pipeline| {
                            let version = pipeline.model_version().to_string();
                            orchestrator.reinitialize(pipeline);
                            version
                        });
                        if let Err(err) = &result {
                            tracing::warn!(error = %err, "reinitialize failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, busy, op_timeout })
}
