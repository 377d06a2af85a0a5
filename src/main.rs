//! Sinais Auto-supervisionados - Binance WebSocket Trades
//!
//! Este programa conecta ao WebSocket da Binance, mantém janelas curtas de
//! trades, prevê um sinal (SELL/HOLD/BUY) a cada trade e, alguns segundos
//! depois, rotula a predição com o movimento real do preço. As amostras
//! rotuladas vão para um log JSONL usado no retreino offline.
//!
//! ARQUITETURA:
//! - Transporte em task própria → channel limitado → processamento (consumidor único)
//! - I/O do log de amostras em thread separada (fora do hot path)
//! - Status periódico lido de contadores atômicos
//!
//! Uso:
//!   ./target/release/binance-signals run --model models/signal_model.json
//!   SYMBOL=ethusdt MAX_TRADES=100000 ./target/release/binance-signals run
//!   ./target/release/binance-signals export --input labeled_data_with_preds.jsonl --output train.csv

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use binance_signals::classifier::LinearSignalModel;
use binance_signals::config::{Cli, Command, ExportArgs, RunArgs};
use binance_signals::feed::{run_feed, FeedEvent};
use binance_signals::logging;
use binance_signals::pipeline::{Counters, Pipeline};
use binance_signals::sample_log::{export_training_csv, read_samples, SampleWriter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Export(args) => export(args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    // ========================================================================
    // Configuração e modelo (falhas aqui são fatais)
    // ========================================================================

    let pipeline_config = args.pipeline.to_config().context("configuração inválida")?;
    let feed_config = args.feed_config().context("configuração inválida")?;
    let model = LinearSignalModel::load(&args.model_path)
        .context("classificador indisponível, impossível iniciar")?;

    info!(
        symbol = %feed_config.symbol,
        window_capacity = pipeline_config.window_capacity,
        retention_ms = pipeline_config.price_log_retention_ms,
        horizon_ms = pipeline_config.label_horizon_ms,
        sample_log = %args.sample_log.display(),
        "iniciando"
    );

    // ========================================================================
    // Setup de I/O em Thread Separada
    // ========================================================================

    let writer = SampleWriter::spawn(&args.sample_log)
        .with_context(|| format!("erro ao abrir {}", args.sample_log.display()))?;
    let counters = Arc::new(Counters::default());
    let mut pipeline = Pipeline::new(pipeline_config, model, writer.sink(), counters.clone());

    // ========================================================================
    // Sinal de parada (Ctrl-C ou MAX_TRADES)
    // ========================================================================

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    {
        let stop_tx = stop_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C recebido, finalizando");
                let _ = stop_tx.send(true);
            }
        });
    }

    // ========================================================================
    // Status periódico (apenas leitura dos contadores)
    // ========================================================================

    if args.status_interval_secs > 0 {
        let counters = counters.clone();
        let period = Duration::from_secs(args.status_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let s = counters.snapshot();
                info!(
                    trades = s.trades,
                    duplicates = s.duplicates,
                    malformed = s.malformed,
                    discarded = s.discarded,
                    predictions = s.predictions,
                    samples = s.samples,
                    expired = s.expired,
                    reconnects = s.reconnects,
                    "status"
                );
            }
        });
    }

    // ========================================================================
    // Transporte
    // ========================================================================

    let (tx, mut rx) = mpsc::channel(args.queue_capacity);
    let feed = tokio::spawn(run_feed(feed_config, tx, counters.clone(), stop_rx.clone()));

    // ========================================================================
    // Loop de Processamento (consumidor único, ordem de chegada)
    // ========================================================================

    let mut stop = stop_rx;
    let mut processed = 0u64;
    let mut result: Result<()> = Ok(());

    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = stop.changed() => None,
        };
        let Some(event) = event else { break };

        match event {
            FeedEvent::Connected { warmup } => {
                pipeline.reset();
                pipeline.seed(warmup);
            }
            FeedEvent::Trade { trade, recv_ts } => {
                if let Err(e) = pipeline.on_trade(trade, recv_ts) {
                    result = Err(e).context("falha ao gravar amostra");
                    break;
                }
                processed += 1;
                if args.max_trades > 0 && processed >= args.max_trades {
                    info!(processed, "limite de trades atingido");
                    break;
                }
            }
        }
    }

    // ========================================================================
    // Finalização
    // ========================================================================

    let _ = stop_tx.send(true);
    drop(rx);
    match feed.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "transporte encerrado com erro");
            if result.is_ok() {
                result = Err(e);
            }
        }
        Err(e) => warn!(error = %e, "task de transporte abortada"),
    }

    // Fecha o último sender para a thread de escrita drenar.
    drop(pipeline);
    let written = writer.finish().context("erro ao finalizar log de amostras")?;

    let s = counters.snapshot();
    info!(
        trades = s.trades,
        predictions = s.predictions,
        samples = s.samples,
        written,
        expired = s.expired,
        malformed = s.malformed,
        "coleta finalizada"
    );
    result
}

fn export(args: ExportArgs) -> Result<()> {
    let log = read_samples(&args.input)
        .with_context(|| format!("erro ao ler {}", args.input.display()))?;
    let file = File::create(&args.output)
        .with_context(|| format!("erro ao criar {}", args.output.display()))?;
    export_training_csv(&log.samples, file).context("erro ao exportar CSV")?;
    info!(
        samples = log.samples.len(),
        skipped = log.skipped,
        output = %args.output.display(),
        "exportação concluída"
    );
    Ok(())
}
