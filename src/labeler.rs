//! Rotulagem Adaptativa (com atraso)
//!
//! O rótulo de uma predição passada é o movimento de preço observado depois
//! de `horizon_ms`, comparado a um limiar igual à volatilidade recente do
//! próprio log de preços. Mercado calmo: movimentos menores já contam.
//! Mercado agitado: o limiar sobe sozinho.

use crate::types::Signal;
use crate::window::PricePoint;

/// Volatilidade usada quando o log não tem variações suficientes.
pub const DEFAULT_VOLATILITY_FALLBACK: f64 = 0.0002;

/// Horizonte padrão do rótulo.
pub const DEFAULT_HORIZON_MS: i64 = 4_000;

/// Resultado de uma rotulagem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelOutcome {
    /// Entrada de referência (a primeira com idade >= horizonte).
    pub reference: PricePoint,
    /// `(P - preço_passado) / preço_passado`
    pub change: f64,
    /// Limiar usado.
    pub volatility: f64,
    pub label: Signal,
}

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveLabeler {
    horizon_ms: i64,
    volatility_fallback: f64,
}

impl Default for AdaptiveLabeler {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_MS, DEFAULT_VOLATILITY_FALLBACK)
    }
}

impl AdaptiveLabeler {
    pub fn new(horizon_ms: i64, volatility_fallback: f64) -> Self {
        Self {
            horizon_ms,
            volatility_fallback,
        }
    }

    pub fn horizon_ms(&self) -> i64 {
        self.horizon_ms
    }

    /// Desvio padrão populacional das variações percentuais consecutivas.
    ///
    /// Usa o fallback com menos de 2 variações ou quando o desvio é zero
    /// (preço constante).
    pub fn volatility<'a, I>(&self, price_log: I) -> f64
    where
        I: IntoIterator<Item = &'a PricePoint>,
    {
        let mut changes = Vec::new();
        let mut prev: Option<f64> = None;
        for point in price_log {
            if let Some(p) = prev {
                // Preço zero não define variação percentual.
                if p != 0.0 {
                    changes.push((point.price - p) / p);
                }
            }
            prev = Some(point.price);
        }

        if changes.len() < 2 {
            return self.volatility_fallback;
        }

        let n = changes.len() as f64;
        let mean = changes.iter().sum::<f64>() / n;
        let variance = changes.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>() / n;
        let std = variance.sqrt();
        if std > 0.0 && std.is_finite() {
            std
        } else {
            self.volatility_fallback
        }
    }

    /// Tenta rotular usando o preço atual `price` em `now_ms`.
    ///
    /// # Retorno
    /// `None` enquanto nenhuma entrada do log tiver idade >= horizonte
    /// (estado normal no início do stream). Nunca lê entradas mais novas que
    /// o horizonte para escolher a referência.
    pub fn try_label<'a, I>(&self, price_log: I, price: f64, now_ms: i64) -> Option<LabelOutcome>
    where
        I: IntoIterator<Item = &'a PricePoint>,
        I::IntoIter: Clone,
    {
        let entries = price_log.into_iter();
        let reference = *entries
            .clone()
            .find(|p| now_ms.saturating_sub(p.timestamp_ms) >= self.horizon_ms)?;
        if reference.price == 0.0 {
            return None;
        }

        let volatility = self.volatility(entries);
        let change = (price - reference.price) / reference.price;
        let label = if change > volatility {
            Signal::Buy
        } else if change < -volatility {
            Signal::Sell
        } else {
            Signal::Hold
        };

        Some(LabelOutcome {
            reference,
            change,
            volatility,
            label,
        })
    }
}
