//! Tipos e estruturas de dados

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

/// Lado agressor de um trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Deriva o lado a partir da flag de maker da Binance.
    ///
    /// `m == true` significa que a ordem em repouso era do comprador, ou seja,
    /// o agressor vendeu.
    pub fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

/// Trade normalizado. Imutável depois de construído.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub price: f64,
    pub quantity: f64,
    pub side: Side,
    pub timestamp_ms: i64, // Timestamp do trade (da exchange)
    pub id: Option<u64>,   // Trade ID da Binance, quando presente
}

impl Trade {
    pub fn new(price: f64, quantity: f64, side: Side, timestamp_ms: i64) -> Self {
        Self {
            price,
            quantity,
            side,
            timestamp_ms,
            id: None,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Sinal discreto produzido pelo classificador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Sell,
    Hold,
    Buy,
}

impl Signal {
    /// Mapeia o índice de classe do modelo para o sinal: `{0→-1, 1→0, 2→1}`.
    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Signal::Sell),
            1 => Some(Signal::Hold),
            2 => Some(Signal::Buy),
            _ => None,
        }
    }

    /// Inverso de [`Signal::from_class_index`], usado na exportação para treino.
    pub fn class_index(self) -> usize {
        match self {
            Signal::Sell => 0,
            Signal::Hold => 1,
            Signal::Buy => 2,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Sell => -1,
            Signal::Hold => 0,
            Signal::Buy => 1,
        }
    }

    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            -1 => Some(Signal::Sell),
            0 => Some(Signal::Hold),
            1 => Some(Signal::Buy),
            _ => None,
        }
    }
}

impl Serialize for Signal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i8::deserialize(deserializer)?;
        Signal::from_i8(value).ok_or_else(|| {
            serde::de::Error::custom(format!("sinal fora de {{-1, 0, 1}}: {}", value))
        })
    }
}

/// Registro rotulado enviado para o log de amostras.
///
/// Criado uma única vez, quando o rótulo fica disponível; nunca é alterado.
/// O formato serializado é uma linha JSON:
/// `{"timestamp": .., "features": {..}, "predicted_signal": .., "label": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub features: FeatureVector,
    pub predicted_signal: Signal,
    pub label: Signal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buyer_maker_means_sell() {
        assert_eq!(Side::from_buyer_maker(true), Side::Sell);
        assert_eq!(Side::from_buyer_maker(false), Side::Buy);
    }

    #[test]
    fn class_table_is_fixed() {
        assert_eq!(Signal::from_class_index(0), Some(Signal::Sell));
        assert_eq!(Signal::from_class_index(1), Some(Signal::Hold));
        assert_eq!(Signal::from_class_index(2), Some(Signal::Buy));
        assert_eq!(Signal::from_class_index(3), None);
        for signal in [Signal::Sell, Signal::Hold, Signal::Buy] {
            assert_eq!(Signal::from_class_index(signal.class_index()), Some(signal));
        }
    }

    #[test]
    fn signal_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Signal::Sell).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<Signal>("1").unwrap(), Signal::Buy);
        assert!(serde_json::from_str::<Signal>("2").is_err());
    }
}
