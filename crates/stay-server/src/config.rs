use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Image host credentials. Each value accepts either spelling.
const CLOUDINARY_VARS: [(&str, &str); 3] = [
    ("CLOUD_NAME", "CLOUDINARY_CLOUD_NAME"),
    ("CLOUD_API_KEY", "CLOUDINARY_KEY"),
    ("CLOUD_API_SECRET", "CLOUDINARY_SECRET"),
];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub mapbox_token: Option<String>,
    pub geocode_timeout: Duration,
    pub cloudinary: Option<CloudinaryCredentials>,
    pub upload_dir: PathBuf,
    pub upload_timeout: Duration,
}

pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = var("STAY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            anyhow::bail!(
                "STAY_JWT_SECRET is unset or still a placeholder. \
                 It must match the secret of the service issuing tokens."
            );
        }

        let host = var("STAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("STAY_PORT").unwrap_or_else(|| "3000".into()).parse()?;

        Ok(Self {
            addr: format!("{}:{}", host, port).parse()?,
            db_path: var("STAY_DB_PATH").unwrap_or_else(|| "stay.db".into()).into(),
            jwt_secret,
            mapbox_token: var("MAPBOX_TOKEN"),
            geocode_timeout: seconds("STAY_GEOCODE_TIMEOUT_SECS", 5),
            cloudinary: cloudinary_from_env(),
            upload_dir: var("STAY_UPLOAD_DIR")
                .unwrap_or_else(|| "./uploads".into())
                .into(),
            upload_timeout: seconds("STAY_UPLOAD_TIMEOUT_SECS", 30),
        })
    }
}

/// Non-empty value of an environment variable.
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn seconds(name: &str, default: u64) -> Duration {
    let secs = var(name).and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_secs(secs)
}

fn cloudinary_from_env() -> Option<CloudinaryCredentials> {
    let mut values = Vec::with_capacity(CLOUDINARY_VARS.len());
    let mut missing = Vec::new();

    for (name, alias) in CLOUDINARY_VARS {
        match var(name).or_else(|| var(alias)) {
            Some(value) => values.push(value),
            None => missing.push(format!("{} (or {})", name, alias)),
        }
    }

    if !missing.is_empty() {
        warn!(
            "Image hosting not configured, missing {}. Images will be stored on local disk.",
            missing.join(", ")
        );
        return None;
    }

    let mut values = values.into_iter();
    Some(CloudinaryCredentials {
        cloud_name: values.next()?,
        api_key: values.next()?,
        api_secret: values.next()?,
    })
}
