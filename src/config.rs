use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::classifier::FallbackPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub upload_dir: PathBuf,
    pub annotated_dir: PathBuf,
    pub model_path: PathBuf,
    pub fallback: FallbackPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://chartsight.db".into());
        let jwt = JwtConfig {
            // No baked-in default secret; an unset APP_SECRET is a startup error.
            secret: std::env::var("APP_SECRET").context("APP_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "chartsight".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "chartsight-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 7),
        };
        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| "uploads".into());
        let annotated_dir = std::env::var("ANNOTATED_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| "annotated".into());
        let model_path = std::env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| "models/model.onnx".into());
        let fallback = std::env::var("PREDICT_FALLBACK")
            .ok()
            .and_then(|v| v.parse::<FallbackPolicy>().ok())
            .unwrap_or_default();
        Ok(Self {
            database_url,
            jwt,
            upload_dir,
            annotated_dir,
            model_path,
            fallback,
        })
    }
}
