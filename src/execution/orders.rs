use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::OrderSide;

#[derive(Debug, Error, PartialEq)]
pub enum OrderSpecError {
    #[error("{kind} order for {symbol} needs a positive quantity, got {quantity}")]
    Quantity {
        kind: &'static str,
        symbol: String,
        quantity: Decimal,
    },

    #[error("{kind} order for {symbol} needs a positive trigger price, got {price}")]
    Price {
        kind: &'static str,
        symbol: String,
        price: Decimal,
    },

    #[error("callback rate {0} outside the accepted 0.1-5 percent range")]
    CallbackRate(Decimal),
}

/// A validated exchange order, one variant per order kind
///
/// Only constructed through the `market`, `stop_market`, `take_profit_market`
/// and `trailing_stop_market` constructors, which check their inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OrderSpec {
    Market {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
        /// Sent as `newClientOrderId` so a lost response can be looked up later
        client_order_id: Option<String>,
    },
    /// Mark-price triggered stop closing the whole position
    StopMarket {
        symbol: String,
        side: OrderSide,
        stop_price: Decimal,
    },
    /// Mark-price triggered take-profit closing the whole position
    TakeProfitMarket {
        symbol: String,
        side: OrderSide,
        stop_price: Decimal,
    },
    TrailingStopMarket {
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        activation_price: Decimal,
        callback_rate: Decimal,
    },
}

impl OrderSpec {
    pub fn market(
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<Self, OrderSpecError> {
        check_quantity("MARKET", symbol, quantity)?;
        Ok(Self::Market {
            symbol: symbol.to_string(),
            side,
            quantity,
            reduce_only,
            client_order_id: None,
        })
    }

    /// Tag a market order with a client order id; other kinds are returned unchanged
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        if let Self::Market {
            client_order_id, ..
        } = &mut self
        {
            *client_order_id = Some(id.into());
        }
        self
    }

    pub fn stop_market(
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
    ) -> Result<Self, OrderSpecError> {
        check_price("STOP_MARKET", symbol, stop_price)?;
        Ok(Self::StopMarket {
            symbol: symbol.to_string(),
            side,
            stop_price,
        })
    }

    pub fn take_profit_market(
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
    ) -> Result<Self, OrderSpecError> {
        check_price("TAKE_PROFIT_MARKET", symbol, stop_price)?;
        Ok(Self::TakeProfitMarket {
            symbol: symbol.to_string(),
            side,
            stop_price,
        })
    }

    pub fn trailing_stop_market(
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        activation_price: Decimal,
        callback_rate: Decimal,
    ) -> Result<Self, OrderSpecError> {
        check_quantity("TRAILING_STOP_MARKET", symbol, quantity)?;
        check_price("TRAILING_STOP_MARKET", symbol, activation_price)?;
        if callback_rate < Decimal::new(1, 1) || callback_rate > Decimal::from(5) {
            return Err(OrderSpecError::CallbackRate(callback_rate));
        }
        Ok(Self::TrailingStopMarket {
            symbol: symbol.to_string(),
            side,
            quantity,
            activation_price,
            callback_rate,
        })
    }

    /// Exchange order type tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Market { .. } => "MARKET",
            Self::StopMarket { .. } => "STOP_MARKET",
            Self::TakeProfitMarket { .. } => "TAKE_PROFIT_MARKET",
            Self::TrailingStopMarket { .. } => "TRAILING_STOP_MARKET",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Market { symbol, .. }
            | Self::StopMarket { symbol, .. }
            | Self::TakeProfitMarket { symbol, .. }
            | Self::TrailingStopMarket { symbol, .. } => symbol,
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            Self::Market { side, .. }
            | Self::StopMarket { side, .. }
            | Self::TakeProfitMarket { side, .. }
            | Self::TrailingStopMarket { side, .. } => *side,
        }
    }

    /// Request parameters in exchange notation
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol().to_string()),
            ("side", self.side().as_str().to_string()),
            ("type", self.kind().to_string()),
        ];

        match self {
            Self::Market {
                quantity,
                reduce_only,
                client_order_id,
                ..
            } => {
                params.push(("quantity", quantity.to_string()));
                if *reduce_only {
                    params.push(("reduceOnly", "true".to_string()));
                }
                if let Some(id) = client_order_id {
                    params.push(("newClientOrderId", id.clone()));
                }
            }
            Self::StopMarket { stop_price, .. } | Self::TakeProfitMarket { stop_price, .. } => {
                // closePosition implies reduce-only; the exchange rejects both flags together
                params.push(("positionSide", "BOTH".to_string()));
                params.push(("stopPrice", stop_price.to_string()));
                params.push(("closePosition", "true".to_string()));
                params.push(("timeInForce", "GTE_GTC".to_string()));
                params.push(("workingType", "MARK_PRICE".to_string()));
                params.push(("priceProtect", "TRUE".to_string()));
            }
            Self::TrailingStopMarket {
                quantity,
                activation_price,
                callback_rate,
                ..
            } => {
                params.push(("positionSide", "BOTH".to_string()));
                params.push(("quantity", quantity.to_string()));
                params.push(("reduceOnly", "true".to_string()));
                params.push(("activationPrice", activation_price.to_string()));
                params.push(("callbackRate", callback_rate.to_string()));
                params.push(("workingType", "MARK_PRICE".to_string()));
                params.push(("priceProtect", "TRUE".to_string()));
            }
        }

        params
    }
}

fn check_quantity(kind: &'static str, symbol: &str, quantity: Decimal) -> Result<(), OrderSpecError> {
    if quantity <= Decimal::ZERO {
        return Err(OrderSpecError::Quantity {
            kind,
            symbol: symbol.to_string(),
            quantity,
        });
    }
    Ok(())
}

fn check_price(kind: &'static str, symbol: &str, price: Decimal) -> Result<(), OrderSpecError> {
    if price <= Decimal::ZERO {
        return Err(OrderSpecError::Price {
            kind,
            symbol: symbol.to_string(),
            price,
        });
    }
    Ok(())
}
