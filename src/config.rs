use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::JwtSettings;
use crate::upload::CloudinaryConfig;

pub struct Config {
    pub port: u16,
    pub workspace: PathBuf,
    pub jwt: JwtSettings,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("TLINKY_PORT", "5034")?,
            workspace: try_load::<String>("TLINKY_WORKSPACE", "./data")?.into(),
            jwt: JwtSettings {
                key: jwt_key(),
                issuer: try_load("TLINKY_JWT_ISSUER", "TlinkyAuth")?,
                audience: try_load("TLINKY_JWT_AUDIENCE", "TlinkyMobile")?,
            },
            cors_origins: var("TLINKY_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            cloudinary: cloudinary(),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value: {raw}"))
}

fn jwt_key() -> String {
    var("TLINKY_JWT_KEY").unwrap_or_else(|| {
        warn!("TLINKY_JWT_KEY not set, tokens will not survive a restart");
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    })
}

fn cloudinary() -> Option<CloudinaryConfig> {
    match (
        var("CLOUDINARY_CLOUD_NAME"),
        var("CLOUDINARY_API_KEY"),
        var("CLOUDINARY_API_SECRET"),
    ) {
        (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
            cloud_name,
            api_key,
            api_secret,
        }),
        _ => {
            warn!("Cloudinary credentials not set, uploads are disabled");
            None
        }
    }
}
