use crate::{
    error::DataError,
    subscription::{Context, candle::Candle},
};
use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};
use tracing::{debug, error, info};
use url::Url;

/// Default timeout for a single historical REST request.
pub const DEFAULT_HISTORICAL_TIMEOUT: Duration = Duration::from_secs(15);

/// Performs HTTP GET requests for historical candle payloads.
///
/// Production uses [`HttpClient`], tests substitute an in-memory implementation.
#[async_trait]
pub trait HistoricalClient: Debug + Send + Sync {
    async fn get(&self, url: &Url) -> Result<String, DataError>;
}

/// [`HistoricalClient`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HISTORICAL_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client }
    }
}

#[async_trait]
impl HistoricalClient for HttpClient {
    async fn get(&self, url: &Url) -> Result<String, DataError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

/// Fetch and parse the most recent candles for the [`Context`] from its provider.
///
/// A parse failure fails the whole fetch, a partial series is never returned.
pub async fn fetch_historical(
    client: &dyn HistoricalClient,
    context: &Context,
) -> Result<Vec<Candle>, DataError> {
    let provider = context.source.provider();
    let url = provider.historical_url(context)?;

    debug!(%context, %url, "fetching historical candles");

    let result = match client.get(&url).await {
        Ok(payload) => provider.parse_historical(&payload),
        Err(error) => Err(error),
    };

    match &result {
        Ok(candles) => info!(%context, candles = candles.len(), "fetched historical candles"),
        Err(error) => error!(%context, %error, "failed to fetch historical candles"),
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::exchange::Source;
    use parking_lot::Mutex;

    /// In-memory [`HistoricalClient`] returning a canned response and recording requested urls.
    #[derive(Debug)]
    pub(crate) struct MockHistoricalClient {
        pub(crate) response: Result<String, DataError>,
        pub(crate) requests: Mutex<Vec<Url>>,
    }

    impl MockHistoricalClient {
        pub(crate) fn new(response: Result<String, DataError>) -> Self {
            Self {
                response,
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl HistoricalClient for MockHistoricalClient {
        async fn get(&self, url: &Url) -> Result<String, DataError> {
            self.requests.lock().push(url.clone());
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_fetch_historical() {
        struct TestCase {
            context: Context,
            response: Result<String, DataError>,
            expected: Result<Vec<i64>, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: Binance klines, unordered input is sorted
                context: Context::new(Source::Binance, "btcusdt", "1h").unwrap(),
                response: Ok(r#"[
                    [1700003600000,"2","3","1","2.5","10",0,"0",0,"0","0","0"],
                    [1700000000000,"1","2","0.5","1.5","5",0,"0",0,"0","0","0"]
                ]"#
                .to_string()),
                expected: Ok(vec![1700000000, 1700003600]),
            },
            TestCase {
                // TC1: BingX relay payload w/ inner error code
                context: Context::new(Source::BingX, "BTC-USDT", "1h").unwrap(),
                response: Ok(
                    r#"{"contents":"{\"code\":100400,\"msg\":\"invalid symbol\",\"data\":[]}"}"#
                        .to_string(),
                ),
                expected: Err(()),
            },
            TestCase {
                // TC2: network failure
                context: Context::new(Source::Binance, "btcusdt", "1h").unwrap(),
                response: Err(DataError::Network {
                    url: "https://fapi.binance.com".to_string(),
                    message: "connection refused".to_string(),
                }),
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let client = MockHistoricalClient::new(test.response);
            let actual = fetch_historical(&client, &test.context)
                .await
                .map(|candles| candles.iter().map(|candle| candle.time).collect::<Vec<_>>())
                .map_err(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
            assert_eq!(client.requests.lock().len(), 1, "TC{} requests failed", index);
        }
    }
}
