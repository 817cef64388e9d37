use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate_capture::{FileSource, ImageSource};
use facegate_core::pipeline::default_model_dir;
use facegate_core::types::keys;
use facegate_core::{Extractor, IdentitySummary, Metadata, MetadataValue, OnnxPipeline, RetryPolicy};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

// `#[zbus::proxy]` generates `FacegateProxy` plus an `Outcome` signal type;
// the engine's outcome is referred to as `facegate_core::Outcome` below.
#[zbus::proxy(
    interface = "org.facegate.Facegate1",
    default_service = "org.facegate.Facegate1",
    default_path = "/org/facegate/Facegate1"
)]
trait Facegate {
    async fn enroll(&self, image_path: &str, metadata_json: &str) -> zbus::Result<String>;
    async fn authenticate(&self, image_path: &str) -> zbus::Result<String>;
    async fn clear(&self) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn reinitialize(&self) -> zbus::Result<bool>;

    #[zbus(signal)]
    fn outcome(&self, outcome_json: String) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face enrollment and authentication CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// Print raw JSON from the daemon
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in an image
    Enroll {
        /// Image file containing one face
        #[arg(short, long)]
        image: PathBuf,
        /// Applicant identifier (generated when omitted)
        #[arg(long)]
        applicant_id: Option<String>,
        /// Loan application identifier (generated when omitted)
        #[arg(long)]
        loan_id: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Application step the enrollment happens in
        #[arg(long)]
        step: Option<String>,
    },
    /// Authenticate the face in an image against enrolled identities
    Authenticate {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Remove every enrolled identity
    Clear {
        /// Confirm the irreversible removal
        #[arg(long)]
        yes: bool,
    },
    /// List enrolled identities
    List,
    /// Show daemon status
    Status,
    /// Reload face models in the daemon
    Reinit,
    /// Print outcomes as the daemon emits them
    Watch,
    /// Extract a descriptor locally (bypasses the daemon)
    Test {
        #[arg(short, long)]
        image: PathBuf,
        /// Directory holding det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        models: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Test { image, models } = &cli.command {
        let models = models.clone().unwrap_or_else(default_model_dir);
        return run_test(image, &models).await;
    }

    let connection = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = FacegateProxy::new(&connection)
        .await
        .context("facegated is not reachable")?;

    match cli.command {
        Commands::Enroll {
            image,
            applicant_id,
            loan_id,
            email,
            step,
        } => {
            let image = absolute_image(&image)?;
            let metadata = build_metadata(applicant_id, loan_id, email, step);
            let reply = proxy
                .enroll(&image, &serde_json::to_string(&metadata)?)
                .await?;
            report_outcome(&reply, cli.json)
        }
        Commands::Authenticate { image } => {
            let image = absolute_image(&image)?;
            let reply = proxy.authenticate(&image).await?;
            report_outcome(&reply, cli.json)
        }
        Commands::Clear { yes } => {
            if !yes {
                eprintln!("Refusing to remove every enrolled identity without --yes");
                return Ok(ExitCode::FAILURE);
            }
            let reply = proxy.clear().await?;
            report_outcome(&reply, cli.json)
        }
        Commands::List => {
            let reply = proxy.list_identities().await?;
            if cli.json {
                println!("{reply}");
            } else {
                let identities: Vec<IdentitySummary> =
                    serde_json::from_str(&reply).context("daemon returned malformed identity list")?;
                if identities.is_empty() {
                    println!("No identities enrolled");
                }
                for identity in &identities {
                    println!("{}", describe_identity(identity));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let value: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reinit => {
            if proxy.reinitialize().await? {
                println!("Models reloaded");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("Model reload failed; see the daemon log");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Watch => {
            let mut outcomes = proxy.receive_outcome().await?;
            println!("Watching outcomes (Ctrl-C to stop)...");
            while let Some(signal) = outcomes.next().await {
                let args = signal.args()?;
                report_outcome(args.outcome_json(), cli.json)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Test { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Load the models, decode the image and extract one descriptor.
async fn run_test(image: &Path, models: &Path) -> Result<ExitCode> {
    tracing::debug!(models = %models.display(), image = %image.display(), "local extraction test");
    println!("Models:  {}", models.display());
    let started = Instant::now();
    let pipeline = OnnxPipeline::load_from_dir(models).context("failed to load face models")?;
    println!("Loaded in {:?}", started.elapsed());

    let mut source = FileSource::new(image);
    let frame = source.capture()?;
    println!(
        "Image:   {} ({}x{}, brightness {:.1}{})",
        source.describe(),
        frame.width(),
        frame.height(),
        frame.avg_brightness(),
        if frame.is_dark { ", dark" } else { "" }
    );

    let mut extractor = Extractor::new(Box::new(pipeline), RetryPolicy::default());
    let started = Instant::now();
    match extractor.extract(&frame.image).await {
        Ok(embedding) => {
            let norm: f32 = embedding.values.iter().map(|v| v * v).sum::<f32>().sqrt();
            println!(
                "Face:    {}-d descriptor, model {}, norm {norm:.4}, {:?}",
                embedding.dimension(),
                embedding.model_version.as_deref().unwrap_or("unknown"),
                started.elapsed()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("Face:    {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// The daemon resolves paths from its own working directory.
fn absolute_image(image: &Path) -> Result<String> {
    let path = std::fs::canonicalize(image).with_context(|| format!("cannot read {}", image.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

fn build_metadata(
    applicant_id: Option<String>,
    loan_id: Option<String>,
    email: Option<String>,
    step: Option<String>,
) -> Metadata {
    [
        (keys::APPLICANT_ID, applicant_id),
        (keys::LOAN_APPLICATION_ID, loan_id),
        (keys::EMAIL, email),
        (keys::APPLICATION_STEP, step),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|v| (key.to_string(), MetadataValue::from(v))))
    .collect()
}

fn report_outcome(reply: &str, raw: bool) -> Result<ExitCode> {
    let outcome: facegate_core::Outcome =
        serde_json::from_str(reply).context("daemon returned malformed outcome")?;
    if raw {
        println!("{reply}");
    } else {
        println!("{}", describe_outcome(&outcome));
    }
    Ok(if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn describe_outcome(outcome: &facegate_core::Outcome) -> String {
    let mut lines = Vec::new();
    match (outcome.success, outcome.reason) {
        (true, _) => lines.push(format!("{}: success", outcome.action)),
        (false, Some(reason)) => lines.push(format!("{}: failed ({reason})", outcome.action)),
        (false, None) => lines.push(format!("{}: failed", outcome.action)),
    }
    if let Some(id) = &outcome.identity_id {
        lines.push(format!("  identity: {id}"));
    }
    if let Some(score) = outcome.score {
        lines.push(format!("  score:    {score:.3}"));
    }
    if let Some(metadata) = &outcome.metadata {
        for (key, value) in metadata {
            lines.push(format!("  {key}: {value}"));
        }
    }
    if let Some(redirect) = outcome.redirect {
        lines.push(format!("  try:      facegate {redirect}"));
    }
    if let Some(detail) = &outcome.detail {
        lines.push(format!("  detail:   {detail}"));
    }
    if let Some(warning) = &outcome.warning {
        lines.push(format!("  warning:  {warning}"));
    }
    lines.join("\n")
}

fn describe_identity(identity: &IdentitySummary) -> String {
    let applicant = identity
        .metadata
        .get(keys::APPLICANT_ID)
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".into());
    format!("{}  applicant={}  enrolled={}", identity.id, applicant, identity.created_at.to_rfc3339())
}
