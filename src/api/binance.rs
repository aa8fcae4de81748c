use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::gateway::ExchangeGateway;
use crate::config::ExchangeSettings;
use crate::error::ExchangeError;
use crate::execution::OrderSpec;
use crate::models::{
    Balance, Candle, InstrumentInfo, OpenOrder, OrderAck, OrderFill, PositionRisk,
};

const MAX_RETRIES: u32 = 3;

/// "Invalid symbol."
const INVALID_SYMBOL: i64 = -1121;
/// "No need to change margin type."
const MARGIN_TYPE_UNCHANGED: i64 = -4046;
/// "Order does not exist."
const NO_SUCH_ORDER: i64 = -2013;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the Binance USDⓈ-M futures REST API
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceEntry {
    asset: String,
    balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRiskEntry {
    symbol: String,
    position_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrderEntry {
    symbol: String,
    order_id: i64,
    #[serde(rename = "type")]
    order_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderEntry {
    order_id: i64,
    status: String,
    executed_qty: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPriceEntry {
    mark_price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolEntry {
    symbol: String,
    price_precision: u32,
    quantity_precision: u32,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CodeResponse {
    code: i64,
    msg: String,
}

/// One element of a batch order response: either an order or an error
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchEntry {
    #[serde(rename_all = "camelCase")]
    Order { order_id: i64 },
    Error { code: i64, msg: String },
}

impl BinanceFuturesClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let rpm = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: settings.resolved_base_url(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
            rate_limiter,
        })
    }

    fn sign(&self, payload: &str) -> String {
        // HMAC accepts keys of any length, so new_from_slice cannot fail here
        let mut mac = match HmacSha256::new_from_slice(self.api_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_url(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<Url, ExchangeError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ExchangeError::Decode(format!("invalid URL for {}: {}", path, e)))?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if signed {
                query.append_pair("recvWindow", &self.recv_window_ms.to_string());
                query.append_pair("timestamp", &chrono::Utc::now().timestamp_millis().to_string());
            }
        }

        if signed {
            let payload = url.query().unwrap_or_default().to_string();
            let signature = self.sign(&payload);
            url.set_query(Some(&format!("{}&signature={}", payload, signature)));
        }

        Ok(url)
    }

    /// Send a request, retrying idempotent GETs on 429, 5xx and network errors
    ///
    /// Signed requests are re-signed on every attempt so the timestamp stays fresh.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let retries = if method == Method::GET { MAX_RETRIES } else { 1 };
        let mut last_error = String::new();

        for attempt in 1..=retries {
            self.rate_limiter.until_ready().await;

            let url = self.build_url(path, params, signed)?;
            let mut request = self.client.request(method.clone(), url);
            if signed {
                request = request.header("X-MBX-APIKEY", &self.api_key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await?;

                    if status.is_success() {
                        return serde_json::from_str(&body).map_err(|e| {
                            ExchangeError::Decode(format!("{} {}: {}", path, e, body))
                        });
                    }

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < retries {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Binance {} returned {}, retrying in {}s (attempt {}/{})",
                            path,
                            status,
                            backoff_secs,
                            attempt,
                            retries
                        );
                        last_error = format!("{}: {}", status, body);
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    return Err(ExchangeError::from_api_body(status.as_u16(), &body));
                }
                Err(e) if attempt < retries => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error calling Binance {}: {}, retrying in {}s (attempt {}/{})",
                        path,
                        e,
                        backoff_secs,
                        attempt,
                        retries
                    );
                    last_error = e.to_string();
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => return Err(ExchangeError::Http(e)),
            }
        }

        Err(ExchangeError::RetriesExhausted {
            attempts: retries,
            last_error,
        })
    }
}

fn parse_f64(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .parse()
        .map_err(|_| ExchangeError::Decode(format!("{} is not a number: {}", field, value)))
}

fn kline_number(row: &[serde_json::Value], index: usize) -> Result<f64, ExchangeError> {
    match row.get(index) {
        Some(serde_json::Value::String(s)) => parse_f64("kline field", s),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Decode(format!("kline field {} out of range", index))),
        other => Err(ExchangeError::Decode(format!(
            "kline field {} missing or malformed: {:?}",
            index, other
        ))),
    }
}

fn parse_kline(row: &[serde_json::Value]) -> Result<Candle, ExchangeError> {
    let open_time_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::Decode("kline open time missing".to_string()))?;
    let open_time = chrono::DateTime::from_timestamp_millis(open_time_ms)
        .ok_or_else(|| ExchangeError::Decode(format!("invalid kline time {}", open_time_ms)))?;

    Ok(Candle {
        open_time,
        open: kline_number(row, 1)?,
        high: kline_number(row, 2)?,
        low: kline_number(row, 3)?,
        close: kline_number(row, 4)?,
        volume: kline_number(row, 5)?,
    })
}

#[async_trait]
impl ExchangeGateway for BinanceFuturesClient {
    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        let entries: Vec<BalanceEntry> = self
            .request(Method::GET, "/fapi/v2/balance", &[], true)
            .await?;

        entries
            .into_iter()
            .map(|e| {
                Ok(Balance {
                    balance: parse_f64("balance", &e.balance)?,
                    available_balance: parse_f64("availableBalance", &e.available_balance)?,
                    asset: e.asset,
                })
            })
            .collect()
    }

    async fn get_positions(&self) -> Result<Vec<PositionRisk>, ExchangeError> {
        let entries: Vec<PositionRiskEntry> = self
            .request(Method::GET, "/fapi/v2/positionRisk", &[], true)
            .await?;

        entries
            .into_iter()
            .map(|e| {
                let position_amount: Decimal = e.position_amt.parse().map_err(|_| {
                    ExchangeError::Decode(format!("positionAmt is not a number: {}", e.position_amt))
                })?;
                Ok(PositionRisk {
                    symbol: e.symbol,
                    position_amount,
                })
            })
            .collect()
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        let params = [("symbol", symbol.to_string())];
        let entries: Vec<OpenOrderEntry> = self
            .request(Method::GET, "/fapi/v1/openOrders", &params, true)
            .await?;

        Ok(entries
            .into_iter()
            .map(|e| OpenOrder {
                symbol: e.symbol,
                order_id: e.order_id,
                order_type: e.order_type,
            })
            .collect())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let params = [("symbol", symbol.to_string())];
        let response: CodeResponse = self
            .request(Method::DELETE, "/fapi/v1/allOpenOrders", &params, true)
            .await?;

        if response.code != 200 {
            return Err(ExchangeError::Api {
                code: response.code,
                message: response.msg,
            });
        }

        tracing::debug!("Cancelled all {} orders: {}", symbol, response.msg);
        Ok(())
    }

    async fn place_orders(&self, orders: &[OrderSpec]) -> Result<Vec<OrderAck>, ExchangeError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let batch: Vec<serde_json::Map<String, serde_json::Value>> = orders
            .iter()
            .map(|order| {
                order
                    .to_params()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                    .collect()
            })
            .collect();
        let params = [("batchOrders", serde_json::to_string(&batch).map_err(|e| {
            ExchangeError::Decode(format!("failed to encode batch: {}", e))
        })?)];

        let entries: Vec<BatchEntry> = self
            .request(Method::POST, "/fapi/v1/batchOrders", &params, true)
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                BatchEntry::Order { order_id } => OrderAck::Accepted { order_id },
                BatchEntry::Error { code, msg } => OrderAck::Rejected { code, message: msg },
            })
            .collect())
    }

    async fn find_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderFill>, ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        let result: Result<OrderEntry, _> = self
            .request(Method::GET, "/fapi/v1/order", &params, true)
            .await;

        match result {
            Ok(entry) => {
                let executed_quantity: Decimal = entry.executed_qty.parse().map_err(|_| {
                    ExchangeError::Decode(format!(
                        "executedQty is not a number: {}",
                        entry.executed_qty
                    ))
                })?;
                Ok(Some(OrderFill {
                    order_id: entry.order_id,
                    status: entry.status,
                    executed_quantity,
                }))
            }
            Err(ExchangeError::Api { code: NO_SUCH_ORDER, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Option<f64>, ExchangeError> {
        let params = [("symbol", symbol.to_string())];
        let result: Result<MarkPriceEntry, _> = self
            .request(Method::GET, "/fapi/v1/premiumIndex", &params, false)
            .await;

        match result {
            Ok(entry) => parse_f64("markPrice", &entry.mark_price).map(Some),
            Err(ExchangeError::Api { code: INVALID_SYMBOL, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .request(Method::GET, "/fapi/v1/klines", &params, false)
            .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn get_exchange_rules(&self) -> Result<Vec<InstrumentInfo>, ExchangeError> {
        let info: ExchangeInfoResponse = self
            .request(Method::GET, "/fapi/v1/exchangeInfo", &[], false)
            .await?;

        Ok(info
            .symbols
            .into_iter()
            .map(|s| InstrumentInfo {
                symbol: s.symbol,
                price_precision: s.price_precision,
                quantity_precision: s.quantity_precision,
                status: s.status,
            })
            .collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        let _: serde_json::Value = self
            .request(Method::POST, "/fapi/v1/leverage", &params, true)
            .await?;
        Ok(())
    }

    async fn set_isolated_margin(&self, symbol: &str) -> Result<(), ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("marginType", "ISOLATED".to_string()),
        ];
        let result: Result<serde_json::Value, _> = self
            .request(Method::POST, "/fapi/v1/marginType", &params, true)
            .await;

        match result {
            Ok(_) | Err(ExchangeError::Api { code: MARGIN_TYPE_UNCHANGED, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn client_for(server: &mockito::ServerGuard) -> BinanceFuturesClient {
        let settings = ExchangeSettings {
            base_url: Some(server.url()),
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            ..Default::default()
        };
        BinanceFuturesClient::new(&settings).unwrap()
    }

    #[test]
    fn test_signature_matches_reference_vector() {
        // Example from the Binance API documentation
        let settings = ExchangeSettings {
            api_secret: "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j"
                .to_string(),
            ..Default::default()
        };
        let client = BinanceFuturesClient::new(&settings).unwrap();

        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(payload),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_signed_url_carries_signature() {
        let client = BinanceFuturesClient::new(&ExchangeSettings::default()).unwrap();
        let url = client
            .build_url("/fapi/v1/openOrders", &[("symbol", "BTCUSDT".to_string())], true)
            .unwrap();
        let query = url.query().unwrap();

        assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
    }

    #[tokio::test]
    async fn test_get_mark_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/premiumIndex")
            .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
            .with_status(200)
            .with_body(r#"{"symbol":"BTCUSDT","markPrice":"50012.50000000","indexPrice":"50010.1"}"#)
            .create_async()
            .await;

        let price = client_for(&server).get_mark_price("BTCUSDT").await.unwrap();

        assert_eq!(price, Some(50012.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_symbol_has_no_mark_price() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/premiumIndex")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;

        let price = client_for(&server).get_mark_price("NOPEUSDT").await.unwrap();
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn test_get_candles_parses_klines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "5m".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    [1700000000000,"49900.0","50100.0","49800.0","50050.5","12.3",1700000299999,"0",10,"0","0","0"],
                    [1700000300000,"50050.5","50200.0","50000.0","50150.0","8.1",1700000599999,"0",7,"0","0","0"]
                ]"#,
            )
            .create_async()
            .await;

        let candles = client_for(&server)
            .get_candles("BTCUSDT", "5m", 2)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 50050.5);
        assert_eq!(candles[1].close, 50150.0);
        assert!(candles[0].open_time < candles[1].open_time);
    }

    #[tokio::test]
    async fn test_exchange_rules() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/exchangeInfo")
            .with_status(200)
            .with_body(
                r#"{"timezone":"UTC","symbols":[
                    {"symbol":"BTCUSDT","pair":"BTCUSDT","status":"TRADING","pricePrecision":2,"quantityPrecision":3},
                    {"symbol":"ETHUSDT","pair":"ETHUSDT","status":"TRADING","pricePrecision":2,"quantityPrecision":3}
                ]}"#,
            )
            .create_async()
            .await;

        let rules = client_for(&server).get_exchange_rules().await.unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].symbol, "BTCUSDT");
        assert_eq!(rules[0].quantity_precision, 3);
    }

    #[tokio::test]
    async fn test_batch_orders_report_each_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/batchOrders")
            .match_query(Matcher::Regex("batchOrders=.*signature=".into()))
            .match_header("X-MBX-APIKEY", "test-key")
            .with_status(200)
            .with_body(
                r#"[{"orderId":123456,"symbol":"BTCUSDT","status":"NEW"},{"code":-2021,"msg":"Order would immediately trigger."}]"#,
            )
            .create_async()
            .await;

        let orders = vec![
            OrderSpec::market("BTCUSDT", OrderSide::Buy, dec!(0.1), false).unwrap(),
            OrderSpec::stop_market("BTCUSDT", OrderSide::Sell, dec!(49000)).unwrap(),
        ];
        let acks = client_for(&server).place_orders(&orders).await.unwrap();

        assert_eq!(acks[0], OrderAck::Accepted { order_id: 123456 });
        assert_eq!(
            acks[1],
            OrderAck::Rejected {
                code: -2021,
                message: "Order would immediately trigger.".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_find_order_by_client_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("origClientOrderId".into(), "sb-abc".into()),
            ]))
            .match_header("X-MBX-APIKEY", "test-key")
            .with_status(200)
            .with_body(
                r#"{"orderId":778899,"symbol":"BTCUSDT","status":"FILLED","clientOrderId":"sb-abc","executedQty":"0.101","type":"MARKET"}"#,
            )
            .create_async()
            .await;

        let fill = client_for(&server)
            .find_order("BTCUSDT", "sb-abc")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(fill.order_id, 778899);
        assert_eq!(fill.status, "FILLED");
        assert_eq!(fill.executed_quantity, dec!(0.101));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_client_order_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v1/order")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2013,"msg":"Order does not exist."}"#)
            .create_async()
            .await;

        let fill = client_for(&server)
            .find_order("BTCUSDT", "sb-never-sent")
            .await
            .unwrap();
        assert_eq!(fill, None);
    }

    #[tokio::test]
    async fn test_cancel_all_reports_failure_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/fapi/v1/allOpenOrders")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":-2011,"msg":"Unknown order sent."}"#)
            .create_async()
            .await;

        let result = client_for(&server).cancel_all_orders("BTCUSDT").await;
        assert!(matches!(result, Err(ExchangeError::Api { code: -2011, .. })));
    }

    #[tokio::test]
    async fn test_margin_type_already_isolated_is_ok() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fapi/v1/marginType")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-4046,"msg":"No need to change margin type."}"#)
            .create_async()
            .await;

        let result = client_for(&server).set_isolated_margin("BTCUSDT").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_positions_and_balance() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fapi/v2/positionRisk")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"symbol":"BTCUSDT","positionAmt":"-0.100"},{"symbol":"ETHUSDT","positionAmt":"0.000"}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/fapi/v2/balance")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"accountAlias":"x","asset":"USDT","balance":"1234.50","availableBalance":"1000.00"}]"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let positions = client.get_positions().await.unwrap();
        assert_eq!(positions[0].position_amount, dec!(-0.1));

        let balance = crate::api::usdt_balance(&client).await.unwrap();
        assert_eq!(balance, Some(1234.5));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v1/openOrders")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code":-2015,"msg":"Invalid API-key, IP, or permissions for action."}"#)
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server).get_open_orders("BTCUSDT").await;

        assert!(matches!(result, Err(ExchangeError::Api { code: -2015, .. })));
        mock.assert_async().await;
    }
}
