//! Conexão WebSocket com a Binance (transporte)
//!
//! Recebe trades, carimba o horário de chegada IMEDIATAMENTE e empurra os
//! eventos num channel limitado para o estágio de processamento. Em caso de
//! queda, reconecta com backoff exponencial + jitter.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::extract::{extract_trade, RestTrade};
use crate::pipeline::Counters;
use crate::types::Trade;

/// Evento entregue ao estágio de processamento, em ordem de chegada.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Nova conexão estabelecida; as janelas devem ser reiniciadas.
    /// `warmup` traz trades históricos (mais antigo primeiro).
    Connected { warmup: Vec<Trade> },
    /// Trade recebido em `recv_ts` (ms, relógio local).
    Trade { trade: Trade, recv_ts: i64 },
}

/// Horário atual em ms desde epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Motivo de saída do loop de leitura.
enum ReadExit {
    Shutdown,
    Disconnected(String),
}

/// Mantém o stream de trades ativo até `shutdown` ou até esgotar as
/// tentativas de reconexão.
pub async fn run_feed(
    config: FeedConfig,
    tx: mpsc::Sender<FeedEvent>,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let url = config.stream_url();
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("erro ao criar cliente HTTP")?;
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        if attempt > 0 {
            if config.max_reconnect_attempts > 0 && attempt > config.max_reconnect_attempts {
                bail!(
                    "excedido o limite de {} tentativas de reconexão para {}",
                    config.max_reconnect_attempts,
                    url
                );
            }
            let backoff = calculate_backoff(config.initial_backoff, config.max_backoff, attempt - 1);
            info!(attempt, backoff_ms = backoff.as_millis() as u64, url = %url, "reconectando");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }

        info!(url = %url, "conectando");
        let ws_stream = match connect_async(&url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(url = %url, error = %e, "erro ao conectar");
                attempt = attempt.saturating_add(1);
                continue;
            }
        };
        info!(url = %url, "conectado, coletando trades");
        if attempt > 0 {
            counters.reconnects.fetch_add(1, Ordering::Relaxed);
        }

        let warmup = if config.warmup_trades > 0 {
            match fetch_recent_trades(&http, &config.rest_url, &config.symbol, config.warmup_trades).await {
                Ok(trades) => trades,
                Err(e) => {
                    warn!(error = %e, "warm-up via REST falhou, seguindo com janela vazia");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        if tx.send(FeedEvent::Connected { warmup }).await.is_err() {
            return Ok(());
        }

        let (mut write, mut read) = ws_stream.split();

        // ====================================================================
        // HOT PATH: receber → carimbar → extrair → enviar para channel
        // ====================================================================
        let exit = loop {
            let msg = tokio::select! {
                msg = read.next() => msg,
                _ = shutdown.changed() => break ReadExit::Shutdown,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    // PASSO 1: horário de recebimento antes de qualquer parsing
                    let recv_ts = now_millis();

                    // PASSO 2: extrai o trade; mensagens inválidas são descartadas
                    match extract_trade(&text) {
                        Ok(Some(trade)) => {
                            // PASSO 3: entrega ao processamento (espera se o channel estiver cheio)
                            if tx.send(FeedEvent::Trade { trade, recv_ts }).await.is_err() {
                                break ReadExit::Shutdown;
                            }
                        }
                        Ok(None) => debug!("mensagem de controle ignorada"),
                        Err(e) => {
                            counters.malformed.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %e, "evento inválido descartado");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break ReadExit::Disconnected(format!("close recebido: {frame:?}"));
                }
                // Ping: o tungstenite já enfileira o Pong na próxima leitura.
                Some(Ok(_)) => {}
                Some(Err(e)) => break ReadExit::Disconnected(format!("erro de leitura: {e}")),
                None => break ReadExit::Disconnected("stream encerrado".to_string()),
            }
        };

        match exit {
            ReadExit::Shutdown => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            ReadExit::Disconnected(reason) => {
                warn!(url = %url, reason = %reason, "desconectado");
                attempt = 1;
            }
        }
    }
}

/// Busca os trades mais recentes via `GET /api/v3/trades`.
///
/// # Retorno
/// Trades do mais antigo para o mais recente.
pub async fn fetch_recent_trades(
    client: &reqwest::Client,
    rest_url: &str,
    symbol: &str,
    limit: usize,
) -> Result<Vec<Trade>> {
    let url = format!("{}/api/v3/trades", rest_url.trim_end_matches('/'));
    let limit = limit.clamp(1, 1000).to_string();
    let rows: Vec<RestTrade> = client
        .get(&url)
        .query(&[("symbol", symbol.to_uppercase()), ("limit", limit)])
        .send()
        .await
        .context("erro ao requisitar trades recentes")?
        .error_for_status()
        .context("resposta de erro em /api/v3/trades")?
        .json()
        .await
        .context("resposta de /api/v3/trades inválida")?;

    let mut trades = rows
        .into_iter()
        .map(RestTrade::into_trade)
        .collect::<Result<Vec<_>, _>>()
        .context("trade histórico inválido")?;
    trades.sort_by_key(|t| (t.timestamp_ms, t.id));
    info!(count = trades.len(), "janela pré-carregada via REST");
    Ok(trades)
}

/// Backoff exponencial `initial * 2^attempt`, limitado a `max`, mais jitter
/// aleatório de até 50%.
pub fn calculate_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let base = initial.saturating_mul(2u32.saturating_pow(attempt)).min(max);
    let jitter = base.as_secs_f64() * rand::random::<f64>() * 0.5;
    base + Duration::from_secs_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let initial = Duration::from_millis(500);
        let max = Duration::from_secs(30);
        for attempt in 0..12 {
            let base = initial.saturating_mul(2u32.saturating_pow(attempt)).min(max);
            let backoff = calculate_backoff(initial, max, attempt);
            assert!(backoff >= base);
            assert!(backoff <= base + base / 2);
        }
        assert!(calculate_backoff(initial, max, 40) <= max + max / 2);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[tokio::test]
    async fn ping_gets_exactly_one_pong() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Ping(b"hb".to_vec())).await.unwrap();
            let trade = r#"{"e":"trade","t":7,"p":"1.5","q":"2","T":1,"m":false}"#;
            ws.send(Message::Text(trade.to_string())).await.unwrap();

            let mut pongs = 0;
            while let Ok(Some(Ok(msg))) =
                tokio::time::timeout(Duration::from_millis(300), ws.next()).await
            {
                if let Message::Pong(data) = msg {
                    assert_eq!(data, b"hb".to_vec());
                    pongs += 1;
                }
            }
            pongs
        });

        let config = FeedConfig {
            symbol: "btcusdt".to_string(),
            ws_url: format!("ws://{addr}/ws"),
            rest_url: String::new(),
            warmup_trades: 0,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(5),
            max_reconnect_attempts: 0,
        };
        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let feed = tokio::spawn(run_feed(config, tx, Arc::new(Counters::default()), stop_rx));

        assert!(matches!(rx.recv().await, Some(FeedEvent::Connected { .. })));
        match rx.recv().await {
            Some(FeedEvent::Trade { trade, .. }) => assert_eq!(trade.id, Some(7)),
            other => panic!("esperava trade, veio {:?}", other),
        }

        stop_tx.send(true).unwrap();
        feed.await.unwrap().unwrap();
        assert_eq!(server.await.unwrap(), 1);
    }
}
