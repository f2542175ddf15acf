use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Host to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory holding the per-session upload folders
    #[arg(long, env = "UPLOAD_ROOT")]
    pub upload_root: Option<String>,

    /// Unstructured API endpoint used to partition PDF and Word files
    #[arg(long, env = "UNSTRUCTURED_API_URL")]
    pub unstructured_api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub rag: RagConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Upper bound for producing a response head; streamed bodies are not cut.
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    pub max_documents: usize,
    pub history_window: usize,
    pub retriever_k: usize,
    pub chunk_max_characters: usize,
    pub upload_root: PathBuf,
    /// `fastembed` (local ONNX model) or `hashing` (lexical, no download).
    pub embedder: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PartitionConfig {
    #[serde(default)]
    pub unstructured_api_url: Option<String>,
    #[serde(default)]
    pub unstructured_api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Layering: defaults, then `./config.*` or the file named by
    /// `--config`/`CONFIG_FILE`, then `DOCUCHAT_*` variables, then CLI flags.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 120)?
            .set_default("server.max_upload_bytes", 50 * 1024 * 1024)?
            .set_default("rag.max_documents", 10)?
            .set_default("rag.history_window", 6)?
            .set_default("rag.retriever_k", 5)?
            .set_default("rag.chunk_max_characters", 500)?
            .set_default("rag.upload_root", ".")?
            .set_default("rag.embedder", "fastembed")?
            .set_default("session.timeout_secs", 30 * 60)?
            .set_default("session.sweep_interval_secs", 60)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. DOCUCHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("DOCUCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(root) = cli.upload_root {
            builder = builder.set_override("rag.upload_root", root)?;
        }
        if let Some(url) = cli.unstructured_api_url {
            builder = builder.set_override("partition.unstructured_api_url", url)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        // The window must at least hold the question being answered.
        if self.rag.history_window == 0 {
            return Err(config::ConfigError::Message(
                "rag.history_window must be at least 1".to_string(),
            ));
        }
        if self.rag.chunk_max_characters == 0 {
            return Err(config::ConfigError::Message(
                "rag.chunk_max_characters must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
