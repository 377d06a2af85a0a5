//! Inicialização de logs (tracing)
//!
//! Dois modos:
//! - texto legível (padrão), para uso local;
//! - JSON (`--log-json`), para agregadores de log.
//!
//! Ambos respeitam `RUST_LOG` (ex.: `RUST_LOG=binance_signals=debug`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Instala o subscriber global. Chamado uma vez no início do processo.
///
/// Os logs vão para stderr; stdout fica livre para saída de dados.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}
