//! Janelas de Estado (TradeWindow + PriceLog)
//!
//! [`WindowStore`] mantém duas janelas independentes:
//! - os últimos N trades (FIFO, capacidade fixa), usados pelas features;
//! - o log de preços indexado pelo horário de *chegada*, podado por idade,
//!   usado pelo rotulador.
//!
//! A assimetria é intencional: features usam o timestamp da exchange,
//! rótulos usam o relógio local de chegada.

use std::collections::VecDeque;

use tracing::debug;

use crate::types::Trade;

/// Entrada do log de preços.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    /// Número sequencial do `update` que gerou a entrada.
    pub seq: u64,
    /// Horário de chegada (ms desde epoch).
    pub timestamp_ms: i64,
    pub price: f64,
}

/// Estado das janelas. Dono exclusivo: o loop de ingestão.
#[derive(Debug)]
pub struct WindowStore {
    trades: VecDeque<Trade>,
    capacity: usize,
    price_log: VecDeque<PricePoint>,
    retention_ms: i64,
    next_seq: u64,
}

impl WindowStore {
    /// Cria janelas vazias.
    ///
    /// # Argumentos
    /// * `capacity` - Número máximo de trades na janela (mínimo 1)
    /// * `retention_ms` - Idade máxima das entradas do log de preços
    pub fn new(capacity: usize, retention_ms: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            trades: VecDeque::with_capacity(capacity),
            capacity,
            price_log: VecDeque::new(),
            retention_ms,
            next_seq: 0,
        }
    }

    /// Registra um trade recebido em `now_ms` (horário de chegada).
    ///
    /// # Retorno
    /// Número sequencial atribuído à entrada do log de preços.
    pub fn update(&mut self, trade: Trade, now_ms: i64) -> u64 {
        if let Some(last) = self.trades.back() {
            if trade.timestamp_ms < last.timestamp_ms {
                debug!(
                    ts = trade.timestamp_ms,
                    last_ts = last.timestamp_ms,
                    "trade fora de ordem, mantido na ordem de chegada"
                );
            }
        }

        self.push_trade(trade);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.price_log.push_back(PricePoint {
            seq,
            timestamp_ms: now_ms,
            price: trade.price,
        });
        self.prune(now_ms);
        seq
    }

    /// Insere trades históricos apenas na janela de trades.
    ///
    /// O log de preços não é tocado: o horário de chegada desses trades é
    /// desconhecido.
    pub fn seed_trades<I: IntoIterator<Item = Trade>>(&mut self, trades: I) {
        for trade in trades {
            self.push_trade(trade);
        }
    }

    /// Remove entradas do log com `now - ts > retention`.
    pub fn prune(&mut self, now_ms: i64) {
        while let Some(oldest) = self.price_log.front() {
            if now_ms.saturating_sub(oldest.timestamp_ms) > self.retention_ms {
                self.price_log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Esvazia as duas janelas (ex.: após reconexão).
    pub fn reset(&mut self) {
        self.trades.clear();
        self.price_log.clear();
    }

    /// Trades atuais, do mais antigo para o mais recente.
    pub fn snapshot_trades(&self) -> Vec<Trade> {
        self.trades.iter().copied().collect()
    }

    /// Log de preços atual, do mais antigo para o mais recente.
    pub fn snapshot_price_log(&self) -> Vec<PricePoint> {
        self.price_log.iter().copied().collect()
    }

    /// Acesso sem cópia à janela de trades (hot path).
    pub fn trades(&self) -> &VecDeque<Trade> {
        &self.trades
    }

    /// Acesso sem cópia ao log de preços (hot path).
    pub fn price_log(&self) -> &VecDeque<PricePoint> {
        &self.price_log
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }

    fn push_trade(&mut self, trade: Trade) {
        if self.trades.len() == self.capacity {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn trade(price: f64, ts: i64) -> Trade {
        Trade::new(price, 1.0, Side::Buy, ts)
    }

    #[test]
    fn evicts_oldest_trade_at_capacity() {
        let mut store = WindowStore::new(3, 5_000);
        for i in 0..5 {
            store.update(trade(100.0 + i as f64, i), 0);
        }
        let prices: Vec<f64> = store.snapshot_trades().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn price_log_uses_arrival_time_and_prunes_by_age() {
        let mut store = WindowStore::new(30, 5_000);
        store.update(trade(100.0, 1), 0);
        store.update(trade(101.0, 2), 3_000);
        store.update(trade(102.0, 3), 5_000);
        // Exatamente na retenção: mantém.
        assert_eq!(store.price_log().len(), 3);
        assert_eq!(store.price_log()[0].timestamp_ms, 0);

        store.update(trade(103.0, 4), 5_001);
        let log = store.snapshot_price_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].timestamp_ms, 3_000);
        assert!(log.iter().all(|p| 5_001 - p.timestamp_ms <= 5_000));
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut store = WindowStore::new(2, 1_000);
        let a = store.update(trade(1.0, 0), 0);
        let b = store.update(trade(1.0, 0), 0);
        let c = store.update(trade(1.0, 0), 10_000);
        assert!(a < b && b < c);
        assert_eq!(store.price_log().len(), 1);
        assert_eq!(store.price_log()[0].seq, c);
    }

    #[test]
    fn out_of_order_trades_keep_arrival_order() {
        let mut store = WindowStore::new(10, 5_000);
        store.update(trade(100.0, 2_000), 0);
        store.update(trade(101.0, 1_000), 1);
        let ts: Vec<i64> = store.snapshot_trades().iter().map(|t| t.timestamp_ms).collect();
        assert_eq!(ts, vec![2_000, 1_000]);
    }

    #[test]
    fn seed_only_touches_trade_window() {
        let mut store = WindowStore::new(2, 5_000);
        store.seed_trades(vec![trade(1.0, 0), trade(2.0, 1), trade(3.0, 2)]);
        assert_eq!(store.trades().len(), 2);
        assert!(store.price_log().is_empty());

        store.reset();
        assert!(store.trades().is_empty());
    }
}
