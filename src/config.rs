//! Configuração via CLI e Variáveis de Ambiente
//!
//! Toda opção de `run` também pode vir de uma variável de ambiente, por
//! exemplo:
//!   SYMBOL=ethusdt LABEL_HORIZON_MS=3000 ./target/release/binance-signals run

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::error::ConfigError;
use crate::labeler::{DEFAULT_HORIZON_MS, DEFAULT_VOLATILITY_FALLBACK};

pub const DEFAULT_WINDOW_CAPACITY: usize = 30;
pub const DEFAULT_RETENTION_MS: i64 = 5_000;

#[derive(Debug, Parser)]
#[command(name = "binance-signals", version, about = "Sinais e rótulos auto-supervisionados a partir do stream de trades da Binance")]
pub struct Cli {
    /// Logs em JSON (produção) em vez de texto.
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Conecta ao stream, prevê sinais e grava amostras rotuladas.
    Run(RunArgs),
    /// Converte um log de amostras em CSV de treino.
    Export(ExportArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long, env = "SYMBOL", default_value = "btcusdt")]
    pub symbol: String,

    #[arg(long, env = "WS_URL", default_value = "wss://stream.binance.com:9443/ws")]
    pub ws_url: String,

    #[arg(long, env = "REST_URL", default_value = "https://api.binance.com")]
    pub rest_url: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Caminho do modelo do classificador (JSON).
    #[arg(long = "model", env = "CLASSIFIER_MODEL_PATH", default_value = "models/signal_model.json")]
    pub model_path: PathBuf,

    #[arg(long, env = "SAMPLE_LOG", default_value = "labeled_data_with_preds.jsonl")]
    pub sample_log: PathBuf,

    /// Capacidade do channel entre transporte e processamento.
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 4096)]
    pub queue_capacity: usize,

    /// Para depois de N trades (0 = sem limite).
    #[arg(long, env = "MAX_TRADES", default_value_t = 0)]
    pub max_trades: u64,

    /// Pré-carrega a janela de trades via REST após cada conexão.
    #[arg(long, env = "WARMUP", default_value_t = true, action = clap::ArgAction::Set)]
    pub warmup: bool,

    #[arg(long, default_value_t = 500)]
    pub initial_backoff_ms: u64,

    #[arg(long, default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Tentativas consecutivas de reconexão (0 = sem limite).
    #[arg(long, default_value_t = 0)]
    pub max_reconnect_attempts: u32,

    /// Intervalo do log de status em segundos (0 desativa).
    #[arg(long, env = "STATUS_INTERVAL_SECS", default_value_t = 1)]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct PipelineArgs {
    #[arg(long, env = "WINDOW_CAPACITY", default_value_t = DEFAULT_WINDOW_CAPACITY)]
    pub window_capacity: usize,

    #[arg(long, env = "PRICE_LOG_RETENTION_MS", default_value_t = DEFAULT_RETENTION_MS)]
    pub price_log_retention_ms: i64,

    #[arg(long, env = "LABEL_HORIZON_MS", default_value_t = DEFAULT_HORIZON_MS)]
    pub label_horizon_ms: i64,

    #[arg(long, env = "VOLATILITY_FALLBACK", default_value_t = DEFAULT_VOLATILITY_FALLBACK)]
    pub volatility_fallback: f64,
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Log de amostras (JSON lines).
    #[arg(long, default_value = "labeled_data_with_preds.jsonl")]
    pub input: PathBuf,

    /// Arquivo CSV de saída.
    #[arg(long)]
    pub output: PathBuf,
}

/// Parâmetros do pipeline, validados.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub window_capacity: usize,
    pub price_log_retention_ms: i64,
    pub label_horizon_ms: i64,
    pub volatility_fallback: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            price_log_retention_ms: DEFAULT_RETENTION_MS,
            label_horizon_ms: DEFAULT_HORIZON_MS,
            volatility_fallback: DEFAULT_VOLATILITY_FALLBACK,
        }
    }
}

impl PipelineConfig {
    /// Rejeita combinações que deixariam o pipeline sem rótulos ou sem features.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.window_capacity < 2 {
            return Err(ConfigError::WindowTooSmall(self.window_capacity));
        }
        if self.price_log_retention_ms <= 0 {
            return Err(ConfigError::ZeroRetention);
        }
        if self.label_horizon_ms < 0 {
            return Err(ConfigError::NegativeHorizon(self.label_horizon_ms));
        }
        if self.label_horizon_ms > self.price_log_retention_ms {
            return Err(ConfigError::HorizonExceedsRetention {
                horizon_ms: self.label_horizon_ms,
                retention_ms: self.price_log_retention_ms,
            });
        }
        if !self.volatility_fallback.is_finite() || self.volatility_fallback <= 0.0 {
            return Err(ConfigError::InvalidVolatilityFallback(self.volatility_fallback));
        }
        Ok(self)
    }
}

impl PipelineArgs {
    pub fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig {
            window_capacity: self.window_capacity,
            price_log_retention_ms: self.price_log_retention_ms,
            label_horizon_ms: self.label_horizon_ms,
            volatility_fallback: self.volatility_fallback,
        }
        .validate()
    }
}

/// Parâmetros do transporte.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub symbol: String,
    pub ws_url: String,
    pub rest_url: String,
    pub warmup_trades: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_reconnect_attempts: u32,
}

impl FeedConfig {
    /// URL do stream de trades, ex.: `wss://.../ws/btcusdt@trade`.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/{}@trade",
            self.ws_url.trim_end_matches('/'),
            self.symbol.to_lowercase()
        )
    }
}

impl RunArgs {
    pub fn feed_config(&self) -> Result<FeedConfig, ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(FeedConfig {
            symbol: self.symbol.clone(),
            ws_url: self.ws_url.clone(),
            rest_url: self.rest_url.clone(),
            warmup_trades: if self.warmup {
                self.pipeline.window_capacity
            } else {
                0
            },
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        })
    }
}
