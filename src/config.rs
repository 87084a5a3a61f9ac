use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

use crate::models::session::DEFAULT_PART_SIZE;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub backend: RemoteBackend,
    pub object_store: ObjectStoreConfig,
    pub key_prefix: String,
    pub part_size: i64,
    /// Include provider/database error text in error responses.
    /// Leave off in production.
    pub expose_error_detail: bool,
}

/// Which object store implementation backs the upload sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RemoteBackend {
    /// Any S3-compatible endpoint, through the AWS SDK.
    S3,
    /// In-process store for local development. Nothing is persisted.
    Memory,
}

impl FromStr for RemoteBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown backend `{}` (expected `s3` or `memory`)", other),
        }
    }
}

/// Connection settings for the remote object store.
#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). `None` means AWS S3 proper.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl ObjectStoreConfig {
    /// Endpoint with a scheme, if one was configured.
    ///
    /// Bare `host:port` values (e.g. `minio:9000`) are treated as plain HTTP.
    pub fn normalized_endpoint(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            let lower = endpoint.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint.trim_end_matches('/').to_string()
            } else {
                format!("http://{}", endpoint.trim_end_matches('/'))
            }
        })
    }

    /// Canonical public base URL of the configured bucket.
    ///
    /// Object URLs built from it are the finalize location when the store
    /// does not report one.
    pub fn public_base_url(&self) -> String {
        match self.normalized_endpoint() {
            Some(endpoint) => format!("{}/{}", endpoint, self.bucket),
            None => format!("https://{}.s3.amazonaws.com", self.bucket),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Multipart upload session coordinator")]
pub struct Args {
    /// Host to bind to (overrides UPLOADS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOADS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides UPLOADS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store backend (overrides UPLOADS_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<RemoteBackend>,

    /// Target bucket (overrides UPLOADS_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region (overrides UPLOADS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint (overrides UPLOADS_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing, needed by MinIO and friends
    #[arg(long)]
    pub force_path_style: bool,

    /// Prefix for generated object keys (overrides UPLOADS_KEY_PREFIX)
    #[arg(long)]
    pub key_prefix: Option<String>,

    /// Advisory part size in bytes handed to clients (overrides UPLOADS_PART_SIZE)
    #[arg(long)]
    pub part_size: Option<i64>,

    /// Return underlying error text to clients (overrides UPLOADS_EXPOSE_ERROR_DETAIL)
    #[arg(long)]
    pub expose_error_detail: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge already-parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("UPLOADS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("UPLOADS_PORT")?.unwrap_or(3000);
        let env_db = env::var("UPLOADS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/uploads.db".into());
        let env_backend = parse_env("UPLOADS_BACKEND")?.unwrap_or(RemoteBackend::S3);
        let env_bucket = env::var("UPLOADS_BUCKET").unwrap_or_else(|_| "uploads".into());
        let env_region = env::var("UPLOADS_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_endpoint = env::var("UPLOADS_ENDPOINT").ok().filter(|v| !v.is_empty());
        let env_path_style = parse_env::<bool>("UPLOADS_FORCE_PATH_STYLE")?.unwrap_or(false);
        let env_prefix = env::var("UPLOADS_KEY_PREFIX").unwrap_or_else(|_| "recordings".into());
        let env_part_size = parse_env("UPLOADS_PART_SIZE")?.unwrap_or(DEFAULT_PART_SIZE);
        let env_detail = parse_env::<bool>("UPLOADS_EXPOSE_ERROR_DETAIL")?.unwrap_or(false);

        let access_key_id = env::var("UPLOADS_ACCESS_KEY_ID").ok();
        let secret_access_key = env::var("UPLOADS_SECRET_ACCESS_KEY").ok();
        if access_key_id.is_some() != secret_access_key.is_some() {
            bail!("UPLOADS_ACCESS_KEY_ID and UPLOADS_SECRET_ACCESS_KEY must be set together");
        }

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            backend: args.backend.unwrap_or(env_backend),
            object_store: ObjectStoreConfig {
                bucket: args.bucket.unwrap_or(env_bucket),
                region: args.region.unwrap_or(env_region),
                endpoint: args.endpoint.or(env_endpoint),
                force_path_style: args.force_path_style || env_path_style,
                access_key_id,
                secret_access_key,
            },
            key_prefix: args
                .key_prefix
                .unwrap_or(env_prefix)
                .trim_matches('/')
                .to_string(),
            part_size: args.part_size.unwrap_or(env_part_size),
            expose_error_detail: args.expose_error_detail || env_detail,
        };

        if cfg.part_size <= 0 {
            bail!("part size must be positive, got {}", cfg.part_size);
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", name, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config(endpoint: Option<&str>) -> ObjectStoreConfig {
        ObjectStoreConfig {
            bucket: "media".into(),
            region: "us-east-1".into(),
            endpoint: endpoint.map(str::to_string),
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    #[test]
    fn public_base_url_defaults_to_virtual_hosted_s3() {
        let cfg = store_config(None);
        assert_eq!(cfg.public_base_url(), "https://media.s3.amazonaws.com");
    }

    #[test]
    fn public_base_url_uses_custom_endpoint() {
        let cfg = store_config(Some("minio:9000/"));
        assert_eq!(cfg.normalized_endpoint().as_deref(), Some("http://minio:9000"));
        assert_eq!(cfg.public_base_url(), "http://minio:9000/media");

        let cfg = store_config(Some("https://s3.example.com"));
        assert_eq!(cfg.public_base_url(), "https://s3.example.com/media");
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("S3".parse::<RemoteBackend>().unwrap(), RemoteBackend::S3);
        assert_eq!("memory".parse::<RemoteBackend>().unwrap(), RemoteBackend::Memory);
        assert!("gcs".parse::<RemoteBackend>().is_err());
    }

    #[test]
    fn debug_output_hides_credentials() {
        let mut cfg = store_config(None);
        cfg.access_key_id = Some("AKIAEXAMPLE".into());
        cfg.secret_access_key = Some("hunter2".into());
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("hunter2"));
    }
}
