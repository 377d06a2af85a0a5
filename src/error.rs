//! Tipos de erro da biblioteca

use std::path::PathBuf;

use thiserror::Error;

/// Evento de trade inválido. Nunca é fatal: o loop descarta e continua.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON inválido: {0}")]
    Json(#[from] serde_json::Error),

    #[error("campo `{field}` não numérico: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("campo `{field}` não finito: {value}")]
    NonFinite { field: &'static str, value: f64 },
}

/// Configuração rejeitada na inicialização.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("window_capacity deve ser >= 2 (recebido {0})")]
    WindowTooSmall(usize),

    #[error("price_log_retention_ms deve ser > 0")]
    ZeroRetention,

    #[error(
        "label_horizon_ms ({horizon_ms}) maior que price_log_retention_ms ({retention_ms}): nenhum rótulo seria gerado"
    )]
    HorizonExceedsRetention { horizon_ms: i64, retention_ms: i64 },

    #[error("label_horizon_ms não pode ser negativo (recebido {0})")]
    NegativeHorizon(i64),

    #[error("volatility_fallback deve ser finito e > 0 (recebido {0})")]
    InvalidVolatilityFallback(f64),

    #[error("queue_capacity deve ser > 0")]
    ZeroQueueCapacity,
}

/// Falha ao carregar o classificador. Fatal na inicialização.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("erro ao ler modelo {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("modelo {path} com JSON inválido: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema de features do modelo difere do pipeline: esperado {expected:?}, modelo {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("dimensão inválida em `{field}`: esperado {expected}, recebido {found}")]
    Shape {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("parâmetro não finito em `{0}`")]
    NonFinite(&'static str),
}

/// Falha de escrita/leitura do log de amostras.
#[derive(Debug, Error)]
pub enum SampleLogError {
    #[error("erro de I/O no log de amostras: {0}")]
    Io(#[from] std::io::Error),

    #[error("erro de serialização: {0}")]
    Json(#[from] serde_json::Error),

    #[error("erro ao escrever CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("writer de amostras finalizado")]
    WriterClosed,
}
