//! Extração de Dados do JSON (Hot Path)
//!
//! Converte as mensagens do stream `<symbol>@trade` da Binance em [`Trade`].
//! Aceita tanto o stream simples quanto o envelope de streams combinados
//! (`{"stream": .., "data": {..}}`).

use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::{Side, Trade};

/// Preço/quantidade chegam como string decimal ou número.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Decimal {
    Number(f64),
    Text(String),
}

impl Decimal {
    fn to_f64(&self, field: &'static str) -> Result<f64, ParseError> {
        let value = match self {
            Decimal::Number(v) => *v,
            Decimal::Text(s) => s.trim().parse().map_err(|_| ParseError::InvalidNumber {
                field,
                value: s.clone(),
            })?,
        };
        if !value.is_finite() {
            return Err(ParseError::NonFinite { field, value });
        }
        Ok(value)
    }
}

/// Evento bruto do stream `@trade`.
#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "q")]
    quantity: Decimal,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
    #[serde(rename = "T")]
    trade_time: i64,
    #[serde(rename = "t", default)]
    trade_id: Option<u64>,
}

/// Trade retornado por `GET /api/v3/trades` (usado no warm-up).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestTrade {
    #[serde(default)]
    id: Option<u64>,
    price: Decimal,
    qty: Decimal,
    time: i64,
    is_buyer_maker: bool,
}

impl RestTrade {
    pub fn into_trade(self) -> Result<Trade, ParseError> {
        let trade = Trade::new(
            self.price.to_f64("price")?,
            self.qty.to_f64("qty")?,
            Side::from_buyer_maker(self.is_buyer_maker),
            self.time,
        );
        Ok(match self.id {
            Some(id) => trade.with_id(id),
            None => trade,
        })
    }
}

/// Extrai um trade de uma mensagem de texto do WebSocket.
///
/// # Argumentos
/// * `text` - String JSON da mensagem do WebSocket
///
/// # Retorno
/// * `Ok(Some(trade))` para eventos de trade
/// * `Ok(None)` para mensagens de controle (ack de subscrição, outros eventos)
/// * `Err(_)` se a mensagem não puder ser interpretada
pub fn extract_trade(text: &str) -> Result<Option<Trade>, ParseError> {
    let value: Value = serde_json::from_str(text)?;

    // Ack de SUBSCRIBE: {"result": null, "id": 1}
    if value.get("result").is_some() && value.get("id").is_some() {
        return Ok(None);
    }

    let data = value.get("data").unwrap_or(&value);
    if let Some(event_type) = data.get("e").and_then(Value::as_str) {
        if event_type != "trade" {
            return Ok(None);
        }
    }

    let raw = RawTrade::deserialize(data)?;
    let trade = Trade::new(
        raw.price.to_f64("p")?,
        raw.quantity.to_f64("q")?,
        Side::from_buyer_maker(raw.is_buyer_maker),
        raw.trade_time,
    );
    Ok(Some(match raw.trade_id {
        Some(id) => trade.with_id(id),
        None => trade,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRADE_JSON: &str = r#"{"e":"trade","E":1720000000123,"s":"BTCUSDT","t":12345,"p":"68000.10","q":"0.015","T":1720000000120,"m":true,"M":true}"#;

    #[test]
    fn parses_binance_trade() {
        let trade = extract_trade(TRADE_JSON).unwrap().unwrap();
        assert_eq!(trade.price, 68000.10);
        assert_eq!(trade.quantity, 0.015);
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.timestamp_ms, 1720000000120);
        assert_eq!(trade.id, Some(12345));
    }

    #[test]
    fn parses_combined_stream_envelope_with_numbers() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","p":100.5,"q":2,"T":1000,"m":false}}"#;
        let trade = extract_trade(text).unwrap().unwrap();
        assert_eq!(trade.price, 100.5);
        assert_eq!(trade.quantity, 2.0);
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.id, None);
    }

    #[test]
    fn ignores_control_messages() {
        assert!(extract_trade(r#"{"result":null,"id":1}"#).unwrap().is_none());
        assert!(extract_trade(r#"{"e":"aggTrade","p":"1","q":"1","T":1,"m":true}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(extract_trade("not json").is_err());
        assert!(extract_trade(r#"{"e":"trade","p":"abc","q":"1","T":1,"m":true}"#).is_err());
        assert!(extract_trade(r#"{"e":"trade","p":"NaN","q":"1","T":1,"m":true}"#).is_err());
        assert!(extract_trade(r#"{"e":"trade","q":"1","T":1,"m":true}"#).is_err());
    }

    #[test]
    fn converts_rest_trade() {
        let text = r#"[{"id":1,"price":"101.0","qty":"0.5","quoteQty":"50.5","time":1500,"isBuyerMaker":false,"isBestMatch":true}]"#;
        let rows: Vec<RestTrade> = serde_json::from_str(text).unwrap();
        let trade = rows.into_iter().next().unwrap().into_trade().unwrap();
        assert_eq!(trade, Trade::new(101.0, 0.5, Side::Buy, 1500).with_id(1));
    }
}
