use crate::error::DataError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

/// Generic [`BingX`](super::BingX) response envelope shared by REST responses and WebSocket
/// frames.
///
/// ### Raw Payload Examples
/// See docs: <https://bingx-api.github.io/docs/#/en-us/swapV2/socket/>
/// #### Subscription acknowledgement
/// ```json
/// {"id":"e745cd6d-d0f6-4a70-8d5a-043e4c741b40","code":0,"msg":"","dataType":"","data":null}
/// ```
///
/// #### Kline push
/// ```json
/// {"code":0,"dataType":"BTC-USDT@kline_1m","s":"BTC-USDT","data":[{"c":"43010.5","o":"43000.0","h":"43020.0","l":"42990.0","v":"12.34","T":1700000040000}]}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BingXMessage {
    #[serde(default)]
    pub code: Value,

    #[serde(default)]
    pub msg: Option<String>,

    #[serde(rename = "dataType", default)]
    pub data_type: Option<SmolStr>,

    #[serde(default)]
    pub data: Value,
}

impl BingXMessage {
    /// Determine if the envelope reports success (`0`, `"0"`, or an absent code).
    pub fn is_ok(&self) -> bool {
        is_success_code(&self.code)
    }

    /// Convert a failed envelope into a descriptive message.
    pub fn error_message(&self) -> String {
        format!(
            "BingX error code {}: {}",
            self.code,
            self.msg.as_deref().unwrap_or_default()
        )
    }

    /// Deserialize `data` as a list, accepting a single object as a list of one.
    pub fn data_as<T>(&self, entity: &'static str) -> Result<Vec<T>, DataError>
    where
        T: serde::de::DeserializeOwned,
    {
        match &self.data {
            Value::Null => Ok(vec![]),
            Value::Array(_) => serde_json::from_value(self.data.clone())
                .map_err(|error| DataError::parse(entity, error)),
            _ => serde_json::from_value(self.data.clone())
                .map(|item| vec![item])
                .map_err(|error| DataError::parse(entity, error)),
        }
    }
}

/// Relay response wrapping an upstream body as a string.
///
/// ```json
/// {"contents":"{\"code\":0,\"msg\":\"\",\"data\":[...]}","status":{"http_code":200}}
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub contents: Option<String>,
}

/// BingX success codes are `0` either as a number or a string.
pub fn is_success_code(code: &Value) -> bool {
    match code {
        Value::Null => true,
        Value::Number(number) => number.as_i64() == Some(0),
        Value::String(code) => code.trim() == "0",
        _ => false,
    }
}
