use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

use crate::services::codec::DEFAULT_JPEG_QUALITY;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub original_bucket: String,
    pub original_bucket_url: String,
    pub resized_bucket: String,
    pub resized_bucket_url: String,
    /// Archive vault; archiving is off when unset.
    pub vault_name: Option<String>,
    pub retrieval_delay_secs: u64,
    pub jpeg_quality: u8,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Two-tier image store API")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where payloads are stored (overrides IMAGE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides IMAGE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket holding uploaded originals (overrides IMAGE_STORE_ORIGINAL_BUCKET)
    #[arg(long)]
    pub original_bucket: Option<String>,

    /// Public URL prefix of the original bucket (overrides IMAGE_STORE_ORIGINAL_BUCKET_URL)
    #[arg(long)]
    pub original_bucket_url: Option<String>,

    /// Bucket holding resized renditions (overrides IMAGE_STORE_RESIZED_BUCKET)
    #[arg(long)]
    pub resized_bucket: Option<String>,

    /// Public URL prefix of the resized bucket (overrides IMAGE_STORE_RESIZED_BUCKET_URL)
    #[arg(long)]
    pub resized_bucket_url: Option<String>,

    /// Archive vault for uploaded originals (overrides IMAGE_STORE_VAULT_NAME)
    #[arg(long)]
    pub vault_name: Option<String>,

    /// Seconds before a local retrieval job completes (overrides IMAGE_STORE_RETRIEVAL_DELAY_SECS)
    #[arg(long)]
    pub retrieval_delay_secs: Option<u64>,

    /// JPEG quality for resized renditions (overrides IMAGE_STORE_JPEG_QUALITY)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let env_host = env::var("IMAGE_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("IMAGE_STORE_PORT", 3000u16)?;
        let env_storage = env::var("IMAGE_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data".into());
        let env_db = env::var("IMAGE_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/image_store.db".into());
        let env_original =
            env::var("IMAGE_STORE_ORIGINAL_BUCKET").unwrap_or_else(|_| "originals".into());
        let env_resized = env::var("IMAGE_STORE_RESIZED_BUCKET").unwrap_or_else(|_| "resized".into());
        let env_delay = parse_env("IMAGE_STORE_RETRIEVAL_DELAY_SECS", 0u64)?;
        let env_quality = parse_env("IMAGE_STORE_JPEG_QUALITY", DEFAULT_JPEG_QUALITY)?;

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let original_bucket = args.original_bucket.unwrap_or(env_original);
        let resized_bucket = args.resized_bucket.unwrap_or(env_resized);

        let original_bucket_url = args
            .original_bucket_url
            .or_else(|| env::var("IMAGE_STORE_ORIGINAL_BUCKET_URL").ok())
            .unwrap_or_else(|| local_bucket_url(&host, port, &original_bucket));
        let resized_bucket_url = args
            .resized_bucket_url
            .or_else(|| env::var("IMAGE_STORE_RESIZED_BUCKET_URL").ok())
            .unwrap_or_else(|| local_bucket_url(&host, port, &resized_bucket));
        let vault_name = args
            .vault_name
            .or_else(|| env::var("IMAGE_STORE_VAULT_NAME").ok())
            .filter(|v| !v.trim().is_empty());

        let jpeg_quality = args.jpeg_quality.unwrap_or(env_quality);
        if !(1..=100).contains(&jpeg_quality) {
            anyhow::bail!("jpeg quality must be within 1..=100, got {}", jpeg_quality);
        }

        Ok(Self {
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            original_bucket_url: with_trailing_slash(original_bucket_url),
            resized_bucket_url: with_trailing_slash(resized_bucket_url),
            retrieval_delay_secs: args.retrieval_delay_secs.unwrap_or(env_delay),
            host,
            port,
            original_bucket,
            resized_bucket,
            vault_name,
            jpeg_quality,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// URL under which this process serves `bucket` itself.
fn local_bucket_url(host: &str, port: u16, bucket: &str) -> String {
    let host = match host {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}/objects/{}/", host, port, bucket)
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_defaults() {
        let cfg = AppConfig::merge(Args {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
            original_bucket: Some("masters".into()),
            resized_bucket_url: Some("https://cdn.test/resized".into()),
            vault_name: Some("photos".into()),
            ..Args::default()
        })
        .unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.original_bucket, "masters");
        assert_eq!(
            cfg.original_bucket_url,
            "http://127.0.0.1:8080/objects/masters/"
        );
        assert_eq!(cfg.resized_bucket_url, "https://cdn.test/resized/");
        assert_eq!(cfg.vault_name.as_deref(), Some("photos"));
    }

    #[test]
    fn blank_vault_disables_archiving() {
        let cfg = AppConfig::merge(Args {
            vault_name: Some("  ".into()),
            ..Args::default()
        })
        .unwrap();
        assert!(cfg.vault_name.is_none());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        let result = AppConfig::merge(Args {
            jpeg_quality: Some(0),
            ..Args::default()
        });
        assert!(result.is_err());
    }
}
