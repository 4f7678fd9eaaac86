//! Configuration for the agentpay server.
//!
//! Every setting is a CLI flag with an environment fallback; `.env` is loaded
//! before parsing. [`Config::load`] validates the raw flags once at startup and
//! the result is handed to the router.

use agentpay_axum::facilitator_client::{DEFAULT_FACILITATOR_URL, FacilitatorAuth};
use alloy_primitives::Address;
use clap::Parser;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::rapidapi::DEFAULT_RAPIDAPI_URL;

/// CLI arguments for the agentpay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentpay")]
#[command(about = "Pay-per-request API gate settling x402 payments on Monad")]
pub struct CliArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    /// Public base URL, used to build resource URLs.
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:3000")]
    public_url: Url,

    /// Facilitator secret key.
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,
    /// Wallet that receives payments and submits settlements.
    #[arg(long, env = "SERVER_WALLET")]
    server_wallet: Option<String>,
    #[arg(long, env = "VAULT_ACCESS_TOKEN", hide_env_values = true)]
    vault_access_token: Option<String>,
    #[arg(long, env = "WALLET_ACCESS_TOKEN", hide_env_values = true)]
    wallet_access_token: Option<String>,
    #[arg(long, env = "AWS_KMS_KEY_ID")]
    aws_kms_key_id: Option<String>,
    #[arg(long, env = "AWS_KMS_REGION", default_value = FacilitatorAuth::DEFAULT_AWS_REGION)]
    aws_kms_region: String,
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    aws_access_key_id: Option<String>,
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_access_key: Option<String>,

    #[arg(long, env = "FACILITATOR_URL", default_value = DEFAULT_FACILITATOR_URL)]
    facilitator_url: String,
    /// Timeout of settlement requests, in seconds.
    #[arg(long, env = "FACILITATOR_TIMEOUT_SECS")]
    facilitator_timeout_secs: Option<u64>,

    /// Social-data provider key. Without it `/api/twitter` is disabled.
    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    rapidapi_key: Option<String>,
    #[arg(long, env = "RAPIDAPI_URL", default_value = DEFAULT_RAPIDAPI_URL)]
    rapidapi_url: Url,

    /// Directory listed by `/api/endpoints`.
    #[arg(long, env = "API_ROUTES_DIR", default_value = "api")]
    api_routes_dir: PathBuf,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    host: IpAddr,
    port: u16,
    public_url: Url,
    secret_key: String,
    server_wallet: Address,
    facilitator_auth: FacilitatorAuth,
    facilitator_url: String,
    facilitator_timeout: Option<Duration>,
    rapidapi_key: Option<String>,
    rapidapi_url: Url,
    api_routes_dir: PathBuf,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SECRET_KEY environment variable is not set")]
    MissingSecretKey,
    #[error("SERVER_WALLET environment variable is not set")]
    MissingServerWallet,
    #[error("SERVER_WALLET is not a valid EVM address: {0}")]
    InvalidServerWallet(String),
    #[error(
        "Facilitator requires one of: VAULT_ACCESS_TOKEN, WALLET_ACCESS_TOKEN, or AWS_KMS_KEY_ID environment variable"
    )]
    MissingFacilitatorAuth,
    #[error(transparent)]
    Cli(#[from] clap::Error),
}

/// Treats empty values like unset ones, as a blank line in `.env` would produce.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from CLI arguments and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::try_parse()?)
    }

    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let secret_key = non_empty(args.secret_key).ok_or(ConfigError::MissingSecretKey)?;
        let server_wallet = non_empty(args.server_wallet).ok_or(ConfigError::MissingServerWallet)?;
        let server_wallet = server_wallet
            .trim()
            .parse::<Address>()
            .map_err(|_| ConfigError::InvalidServerWallet(server_wallet.clone()))?;

        // Priority: vault > wallet > AWS KMS.
        let facilitator_auth = if let Some(token) = non_empty(args.vault_access_token) {
            FacilitatorAuth::VaultAccessToken(token)
        } else if let Some(token) = non_empty(args.wallet_access_token) {
            FacilitatorAuth::WalletAccessToken(token)
        } else if let Some(key_id) = non_empty(args.aws_kms_key_id) {
            FacilitatorAuth::AwsKms {
                key_id,
                region: args.aws_kms_region,
                access_key_id: non_empty(args.aws_access_key_id),
                secret_access_key: non_empty(args.aws_secret_access_key),
            }
        } else {
            return Err(ConfigError::MissingFacilitatorAuth);
        };

        Ok(Config {
            host: args.host,
            port: args.port,
            public_url: args.public_url,
            secret_key,
            server_wallet,
            facilitator_auth,
            facilitator_url: args.facilitator_url,
            facilitator_timeout: args.facilitator_timeout_secs.map(Duration::from_secs),
            rapidapi_key: non_empty(args.rapidapi_key),
            rapidapi_url: args.rapidapi_url,
            api_routes_dir: args.api_routes_dir,
        })
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn public_url(&self) -> &Url {
        &self.public_url
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn server_wallet(&self) -> Address {
        self.server_wallet
    }

    pub fn facilitator_auth(&self) -> &FacilitatorAuth {
        &self.facilitator_auth
    }

    pub fn facilitator_url(&self) -> &str {
        &self.facilitator_url
    }

    pub fn facilitator_timeout(&self) -> Option<Duration> {
        self.facilitator_timeout
    }

    pub fn rapidapi_key(&self) -> Option<&str> {
        self.rapidapi_key.as_deref()
    }

    pub fn rapidapi_url(&self) -> &Url {
        &self.rapidapi_url
    }

    pub fn api_routes_dir(&self) -> &Path {
        &self.api_routes_dir
    }
}
