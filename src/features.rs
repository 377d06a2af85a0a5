//! Extração de Features (microestrutura de curto prazo)
//!
//! O schema de features é um contrato com o classificador: a ordem de
//! [`FEATURE_NAMES`] é a ordem das colunas no treino e na inferência.
//! Qualquer mudança de ordem ou de conjunto exige retreinar o modelo.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{Side, Trade};

/// Número de features do schema.
pub const NUM_FEATURES: usize = 13;

/// Schema fixo, na ordem de contrato.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "mean_price",
    "price_std",
    "price_range",
    "price_skewness",
    "price_kurtosis",
    "mean_quantity",
    "std_quantity",
    "price_zscore",
    "buy_sell_ratio",
    "order_flow_imbalance",
    "price_momentum",
    "trades_per_second",
    "volume_per_second",
];

/// Evita divisão por zero nas razões de fluxo.
pub const EPSILON: f64 = 1e-5;

/// Vetor de features nomeado, na ordem de [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; NUM_FEATURES],
}

impl FeatureVector {
    pub fn from_values(values: [f64; NUM_FEATURES]) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    /// Pares `(nome, valor)` na ordem do schema.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    /// `false` se algum valor for NaN ou infinito.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUM_FEATURES))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeatureVisitor;

        impl<'de> Visitor<'de> for FeatureVisitor {
            type Value = FeatureVector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "um objeto com as {} features do schema", NUM_FEATURES)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FeatureVector, A::Error> {
                let mut values = [None; NUM_FEATURES];
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    // Colunas fora do schema são ignoradas.
                    if let Some(i) = FEATURE_NAMES.iter().position(|n| *n == name) {
                        values[i] = Some(value);
                    }
                }
                let mut out = [0.0; NUM_FEATURES];
                for (i, value) in values.iter().enumerate() {
                    out[i] = value.ok_or_else(|| serde::de::Error::missing_field(FEATURE_NAMES[i]))?;
                }
                Ok(FeatureVector::from_values(out))
            }
        }

        deserializer.deserialize_map(FeatureVisitor)
    }
}

/// Momentos de uma série: média, desvio padrão populacional, 3º e 4º
/// momentos centrais. Acumulação sequencial na ordem da janela.
struct Moments {
    mean: f64,
    variance: f64,
    m3: f64,
    m4: f64,
}

impl Moments {
    fn of<I: Iterator<Item = f64> + Clone>(values: I, n: f64) -> Self {
        let mean = values.clone().sum::<f64>() / n;
        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for v in values {
            let d = v - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        Self {
            mean,
            variance: m2 / n,
            m3: m3 / n,
            m4: m4 / n,
        }
    }

    fn std(&self) -> f64 {
        self.variance.sqrt()
    }

    fn skewness(&self) -> f64 {
        let std = self.std();
        if std > 0.0 {
            self.m3 / (std * std * std)
        } else {
            0.0
        }
    }

    /// Curtose não-excessiva (normal ≈ 3).
    fn kurtosis(&self) -> f64 {
        if self.variance > 0.0 {
            self.m4 / (self.variance * self.variance)
        } else {
            0.0
        }
    }
}

/// Calcula o vetor de features de uma janela de trades (mais antigo primeiro).
///
/// Função pura: a mesma sequência de entrada gera sempre o mesmo vetor, bit a bit.
///
/// # Retorno
/// `None` se a janela tiver menos de 2 trades.
pub fn compute<'a, I>(trades: I) -> Option<FeatureVector>
where
    I: IntoIterator<Item = &'a Trade>,
    I::IntoIter: ExactSizeIterator + Clone,
{
    let trades = trades.into_iter();
    let len = trades.len();
    if len < 2 {
        return None;
    }
    let n = len as f64;

    let mut iter = trades.clone();
    let first = iter.next()?;
    let last = iter.last()?;

    // Preço
    let prices = Moments::of(trades.clone().map(|t| t.price), n);
    let price_std = prices.std();
    let (min, max) = trades
        .clone()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
            (lo.min(t.price), hi.max(t.price))
        });
    let price_zscore = if len <= 2 || price_std == 0.0 {
        0.0
    } else {
        (last.price - prices.mean) / price_std
    };

    // Quantidade
    let quantities = Moments::of(trades.clone().map(|t| t.quantity), n);
    let total_quantity: f64 = trades.clone().map(|t| t.quantity).sum();

    // Fluxo (contagem de trades por lado)
    let buy_count = trades.clone().filter(|t| t.side == Side::Buy).count() as f64;
    let sell_count = trades.clone().filter(|t| t.side == Side::Sell).count() as f64;
    let buy_sell_ratio = buy_count / (sell_count + EPSILON);
    let order_flow_imbalance = (buy_count - sell_count) / (buy_count + sell_count + EPSILON);

    let price_momentum = if first.price == 0.0 {
        0.0
    } else {
        (last.price - first.price) / first.price
    };

    // Duração pelos timestamps da exchange
    let duration_secs = last.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0;
    let (trades_per_second, volume_per_second) = if duration_secs > 0.0 {
        (n / duration_secs, total_quantity / duration_secs)
    } else {
        (0.0, 0.0)
    };

    Some(FeatureVector::from_values([
        prices.mean,
        price_std,
        max - min,
        prices.skewness(),
        prices.kurtosis(),
        quantities.mean,
        quantities.std(),
        price_zscore,
        buy_sell_ratio,
        order_flow_imbalance,
        price_momentum,
        trades_per_second,
        volume_per_second,
    ]))
}
