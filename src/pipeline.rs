//! Pipeline de Processamento (caminho único de ingestão)
//!
//! Para cada trade, em ordem de chegada:
//! WindowStore.update → features → classificador → (com atraso) rótulo → log.
//!
//! Cada predição fica pendente junto com o número sequencial da entrada do
//! log de preços criada no mesmo `update`. Quando o rotulador escolhe essa
//! entrada como referência, a predição vira uma [`Sample`] com as features
//! e o sinal daquele momento. Cada predição gera no máximo uma amostra.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::classifier::SignalClassifier;
use crate::config::PipelineConfig;
use crate::error::SampleLogError;
use crate::features::{self, FeatureVector};
use crate::labeler::{AdaptiveLabeler, LabelOutcome};
use crate::sample_log::SampleSink;
use crate::types::{Sample, Signal, Trade};
use crate::window::WindowStore;

/// Contadores compartilhados com a task de status (lock-free).
#[derive(Debug, Default)]
pub struct Counters {
    pub trades: AtomicU64,
    pub duplicates: AtomicU64,
    pub malformed: AtomicU64,
    pub discarded: AtomicU64,
    pub predictions: AtomicU64,
    pub samples: AtomicU64,
    pub expired: AtomicU64,
    pub reconnects: AtomicU64,
}

/// Cópia pontual dos contadores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub trades: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub discarded: u64,
    pub predictions: u64,
    pub samples: u64,
    pub expired: u64,
    pub reconnects: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            trades: self.trades.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Predição aguardando rótulo.
#[derive(Debug, Clone, Copy)]
struct PendingPrediction {
    seq: u64,
    recv_ts: i64,
    features: FeatureVector,
    signal: Signal,
}

/// Resultado de um tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Sinal previsto neste tick (se o vetor de features foi válido).
    pub signal: Option<Signal>,
    /// Amostra emitida neste tick.
    pub sample: Option<Sample>,
}

pub struct Pipeline<C, S> {
    store: WindowStore,
    labeler: AdaptiveLabeler,
    classifier: C,
    sink: S,
    pending: VecDeque<PendingPrediction>,
    /// Maior trade ID vindo do warm-up desta conexão.
    last_seeded_id: Option<u64>,
    counters: Arc<Counters>,
}

impl<C: SignalClassifier, S: SampleSink> Pipeline<C, S> {
    pub fn new(config: PipelineConfig, classifier: C, sink: S, counters: Arc<Counters>) -> Self {
        Self {
            store: WindowStore::new(config.window_capacity, config.price_log_retention_ms),
            labeler: AdaptiveLabeler::new(config.label_horizon_ms, config.volatility_fallback),
            classifier,
            sink,
            pending: VecDeque::new(),
            last_seeded_id: None,
            counters,
        }
    }

    /// Processa um trade recebido em `now_ms`.
    ///
    /// Trades já carregados pelo warm-up (ID ≤ último ID semeado) são
    /// ignorados. Só retorna erro se o log de amostras falhar.
    pub fn on_trade(&mut self, trade: Trade, now_ms: i64) -> Result<TickOutcome, SampleLogError> {
        if let (Some(id), Some(last)) = (trade.id, self.last_seeded_id) {
            if id <= last {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(id, last_seeded = last, "trade já presente no warm-up");
                return Ok(TickOutcome::default());
            }
        }
        self.counters.trades.fetch_add(1, Ordering::Relaxed);

        // PASSO 1: janelas
        let seq = self.store.update(trade, now_ms);

        // PASSO 2: features + sinal (vetores com NaN/inf são descartados)
        let signal = match features::compute(self.store.trades()) {
            Some(fv) if fv.is_finite() => {
                let signal = self.classifier.predict(&fv);
                self.counters.predictions.fetch_add(1, Ordering::Relaxed);
                self.pending.push_back(PendingPrediction {
                    seq,
                    recv_ts: now_ms,
                    features: fv,
                    signal,
                });
                trace!(seq, signal = signal.as_i8(), "predição");
                Some(signal)
            }
            Some(_) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(seq, "vetor de features não finito descartado");
                None
            }
            None => None,
        };

        // PASSO 3: predições cuja entrada já saiu do log nunca serão rotuladas
        self.expire_pending();

        // PASSO 4: rótulo (independente da predição deste tick)
        let sample = match self.labeler.try_label(self.store.price_log(), trade.price, now_ms) {
            Some(outcome) => self.emit(outcome)?,
            None => None,
        };

        Ok(TickOutcome { signal, sample })
    }

    /// Pré-carrega a janela de trades (sem afetar o log de preços).
    pub fn seed(&mut self, trades: Vec<Trade>) {
        self.last_seeded_id = trades.iter().filter_map(|t| t.id).max();
        self.store.seed_trades(trades);
    }

    /// Reinicia janelas e descarta predições pendentes (ex.: reconexão).
    pub fn reset(&mut self) {
        let dropped = self.pending.len() as u64;
        if dropped > 0 {
            self.counters.expired.fetch_add(dropped, Ordering::Relaxed);
        }
        self.pending.clear();
        self.last_seeded_id = None;
        self.store.reset();
        info!(dropped, "janelas reiniciadas");
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn expire_pending(&mut self) {
        let oldest = match self.store.price_log().front() {
            Some(point) => point.seq,
            None => return,
        };
        while let Some(front) = self.pending.front() {
            if front.seq >= oldest {
                break;
            }
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            debug!(seq = front.seq, "predição expirou sem rótulo");
            self.pending.pop_front();
        }
    }

    fn emit(&mut self, outcome: LabelOutcome) -> Result<Option<Sample>, SampleLogError> {
        // A fila está ordenada por seq. Com relógio monotônico a referência
        // é a frente; se o relógio de parede voltar, pode estar no meio.
        let Ok(index) = self
            .pending
            .binary_search_by_key(&outcome.reference.seq, |p| p.seq)
        else {
            return Ok(None);
        };
        let Some(prediction) = self.pending.remove(index) else {
            return Ok(None);
        };

        let sample = Sample {
            timestamp_ms: prediction.recv_ts,
            features: prediction.features,
            predicted_signal: prediction.signal,
            label: outcome.label,
        };
        debug!(
            seq = prediction.seq,
            change = outcome.change,
            volatility = outcome.volatility,
            label = outcome.label.as_i8(),
            "amostra rotulada"
        );
        self.sink.append(sample.clone())?;
        self.counters.samples.fetch_add(1, Ordering::Relaxed);
        Ok(Some(sample))
    }
}
