use chrono::DateTime;
use ragdeck_core::tool::{Error as ToolError, Tool, ToolResult};
use reqwest::{Client, StatusCode, Url};
use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
// Yahoo rejects requests without a browser-like user agent.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ragdeck)";

const PERIODS: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];
const INTERVALS: &[&str] = &[
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk",
    "1mo", "3mo",
];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Envelope<ChartResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: Envelope<QuoteSummaryResult>,
}

/// The `{result, error}` wrapper of every Yahoo Finance response.
#[derive(Debug, Deserialize)]
struct Envelope<R> {
    result: Option<Vec<R>>,
    error: Option<ApiError>,
}

impl From<ChartResponse> for Envelope<ChartResult> {
    #[inline]
    fn from(resp: ChartResponse) -> Self {
        resp.chart
    }
}

impl From<QuoteSummaryResponse> for Envelope<QuoteSummaryResult> {
    #[inline]
    fn from(resp: QuoteSummaryResponse) -> Self {
        resp.quote_summary
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: String,
    currency: Option<String>,
    exchange_name: Option<String>,
    full_exchange_name: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<u64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// A `{raw, fmt}` pair; missing figures come as `{}`.
#[derive(Debug, Default, Deserialize)]
struct Figure {
    raw: Option<f64>,
}

fn raw(figure: Option<Figure>) -> Option<f64> {
    figure.and_then(|figure| figure.raw)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    recommendation_trend: Option<RecommendationTrend>,
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    asset_profile: Option<AssetProfile>,
    price: Option<PriceModule>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationTrend {
    #[serde(default)]
    trend: Vec<Trend>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase"))]
struct Trend {
    period: String,
    #[serde(default)]
    strong_buy: u32,
    #[serde(default)]
    buy: u32,
    #[serde(default)]
    hold: u32,
    #[serde(default)]
    sell: u32,
    #[serde(default)]
    strong_sell: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    market_cap: Option<Figure>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<Figure>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<Figure>,
    dividend_yield: Option<Figure>,
    beta: Option<Figure>,
    fifty_two_week_high: Option<Figure>,
    fifty_two_week_low: Option<Figure>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    enterprise_value: Option<Figure>,
    trailing_eps: Option<Figure>,
    forward_eps: Option<Figure>,
    price_to_book: Option<Figure>,
    profit_margins: Option<Figure>,
    shares_outstanding: Option<Figure>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
    country: Option<String>,
    website: Option<String>,
    full_time_employees: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
}

/// A client of Yahoo Finance's chart and quote summary APIs shared by the
/// market data tools.
#[derive(Clone, Debug)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    /// Creates a client of the public Yahoo Finance endpoint.
    #[inline]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a client that talks to `base_url` instead.
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Self {
        let base_url: String = base_url.into();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("failed to build a custom HTTP client: {err}");
                Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Returns `base_url` extended by `segments`, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = Url::parse(&self.base_url).map_err(execution_error)?;
        url.path_segments_mut()
            .map_err(|()| {
                execution_error(format!("invalid base URL `{}`", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, ToolError> {
        let mut url = self.endpoint(&["v8", "finance", "chart", symbol])?;
        url.query_pairs_mut()
            .append_pair("range", range)
            .append_pair("interval", interval);

        debug!("fetching {range}/{interval} chart of {symbol}");
        self.first_result::<ChartResponse, _>(url, symbol).await
    }

    async fn quote_summary(
        &self,
        symbol: &str,
        modules: &[&str],
    ) -> Result<QuoteSummaryResult, ToolError> {
        let mut url =
            self.endpoint(&["v10", "finance", "quoteSummary", symbol])?;
        url.query_pairs_mut()
            .append_pair("modules", &modules.join(","));

        debug!("fetching {} of {symbol}", modules.join(","));
        self.first_result::<QuoteSummaryResponse, _>(url, symbol)
            .await
    }

    async fn first_result<T, R>(
        &self,
        url: Url,
        symbol: &str,
    ) -> Result<R, ToolError>
    where
        T: DeserializeOwned + Into<Envelope<R>>,
    {
        let resp = self.client.get(url).send().await.map_err(execution_error)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(execution_error)?;

        // Errors come with an envelope too, prefer its description.
        let envelope: Envelope<R> = match serde_json::from_slice::<T>(&body) {
            Ok(resp) => resp.into(),
            Err(_) if !status.is_success() => return Err(status_error(status)),
            Err(err) => return Err(execution_error(err)),
        };
        if let Some(err) = envelope.error {
            return Err(ToolError::execution_error()
                .with_reason(format!("{}: {}", err.code, err.description)));
        }
        if !status.is_success() {
            return Err(status_error(status));
        }
        envelope
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| {
                ToolError::execution_error()
                    .with_reason(format!("no data found for {symbol}"))
            })
    }
}

impl Default for YahooFinanceClient {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn execution_error<E: std::fmt::Display>(err: E) -> ToolError {
    ToolError::execution_error().with_reason(err.to_string())
}

fn status_error(status: StatusCode) -> ToolError {
    ToolError::execution_error()
        .with_reason(format!("market data request failed with status {status}"))
}

fn normalize_symbol(symbol: &str) -> Result<String, ToolError> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(
            ToolError::invalid_input().with_reason("`symbol` must not be empty")
        );
    }
    Ok(symbol.to_uppercase())
}

#[derive(Deserialize, JsonSchema)]
pub struct SymbolParameters {
    #[schemars(description = "The stock ticker symbol, e.g. NVDA.")]
    symbol: String,
}

/// A tool returning the latest price of a stock.
pub struct StockPriceTool {
    client: YahooFinanceClient,
    parameter_schema: Value,
}

impl StockPriceTool {
    /// Creates a new stock price tool.
    #[inline]
    pub fn new(client: YahooFinanceClient) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(SymbolParameters).to_value(),
        }
    }
}

impl Tool for StockPriceTool {
    type Input = SymbolParameters;

    fn name(&self) -> &str {
        "get_current_stock_price"
    }

    fn description(&self) -> &str {
        "Gets the current price of a stock."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SymbolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let symbol = normalize_symbol(&input.symbol)?;
            let chart = client.chart(&symbol, "1d", "1d").await?;
            match chart.meta.regular_market_price {
                Some(price) => Ok(format!("{price:.4}")),
                None => Err(ToolError::execution_error().with_reason(format!(
                    "could not fetch the current price of {symbol}"
                ))),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct StockSummary {
    symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    exchange: Option<String>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    day_high: Option<f64>,
    day_low: Option<f64>,
    volume: Option<u64>,
    previous_close: Option<f64>,
}

impl From<ChartMeta> for StockSummary {
    fn from(meta: ChartMeta) -> Self {
        Self {
            symbol: meta.symbol,
            name: meta.long_name.or(meta.short_name),
            price: meta.regular_market_price,
            currency: meta.currency,
            exchange: meta.full_exchange_name.or(meta.exchange_name),
            fifty_two_week_high: meta.fifty_two_week_high,
            fifty_two_week_low: meta.fifty_two_week_low,
            day_high: meta.regular_market_day_high,
            day_low: meta.regular_market_day_low,
            volume: meta.regular_market_volume,
            previous_close: meta.previous_close.or(meta.chart_previous_close),
        }
    }
}

/// A tool returning key figures of a stock as JSON.
pub struct StockSummaryTool {
    client: YahooFinanceClient,
    parameter_schema: Value,
}

impl StockSummaryTool {
    /// Creates a new stock summary tool.
    #[inline]
    pub fn new(client: YahooFinanceClient) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(SymbolParameters).to_value(),
        }
    }
}

impl Tool for StockSummaryTool {
    type Input = SymbolParameters;

    fn name(&self) -> &str {
        "get_stock_summary"
    }

    fn description(&self) -> &str {
        "Gets key figures of a stock as JSON: price, currency, exchange, \
         52-week high and low, day high and low, volume and previous close."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SymbolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let symbol = normalize_symbol(&input.symbol)?;
            let chart = client.chart(&symbol, "1d", "1d").await?;
            let summary = StockSummary::from(chart.meta);
            serde_json::to_string(&summary).map_err(execution_error)
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct HistoricalPricesParameters {
    #[schemars(description = "The stock ticker symbol, e.g. NVDA.")]
    symbol: String,
    #[schemars(
        description = "Time range: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd \
                       or max. Default to 1mo."
    )]
    period: Option<String>,
    #[schemars(
        description = "Bar size: 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, \
                       1wk, 1mo or 3mo. Default to 1d."
    )]
    interval: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
struct PriceBar {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
    volume: Option<u64>,
}

fn price_bars(chart: ChartResult, intraday: bool) -> Vec<PriceBar> {
    let quote = chart.indicators.quote.into_iter().next().unwrap_or_default();
    let pick =
        |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();
    let format = if intraday { "%Y-%m-%d %H:%M" } else { "%Y-%m-%d" };

    chart
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &timestamp)| {
            // Bars without a close are gaps, e.g. trading halts.
            let close = pick(&quote.close, i)?;
            let date = DateTime::from_timestamp(timestamp, 0)?;
            Some(PriceBar {
                date: date.format(format).to_string(),
                open: pick(&quote.open, i),
                high: pick(&quote.high, i),
                low: pick(&quote.low, i),
                close,
                volume: quote.volume.get(i).copied().flatten(),
            })
        })
        .collect()
}

/// A tool returning historical prices of a stock as JSON.
pub struct HistoricalPricesTool {
    client: YahooFinanceClient,
    parameter_schema: Value,
}

impl HistoricalPricesTool {
    /// Creates a new historical prices tool.
    #[inline]
    pub fn new(client: YahooFinanceClient) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(HistoricalPricesParameters)
                .to_value(),
        }
    }
}

impl Tool for HistoricalPricesTool {
    type Input = HistoricalPricesParameters;

    fn name(&self) -> &str {
        "get_historical_stock_prices"
    }

    fn description(&self) -> &str {
        "Gets historical prices of a stock as a JSON list of bars with date, \
         open, high, low, close and volume."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: HistoricalPricesParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let symbol = normalize_symbol(&input.symbol)?;
            let period = input.period.as_deref().unwrap_or("1mo");
            if !PERIODS.contains(&period) {
                return Err(ToolError::invalid_input()
                    .with_reason(format!("unsupported period `{period}`")));
            }
            let interval = input.interval.as_deref().unwrap_or("1d");
            if !INTERVALS.contains(&interval) {
                return Err(ToolError::invalid_input()
                    .with_reason(format!("unsupported interval `{interval}`")));
            }

            let chart = client.chart(&symbol, period, interval).await?;
            let intraday = (interval.ends_with('m')
                && !interval.ends_with("mo"))
                || interval.ends_with('h');
            let bars = price_bars(chart, intraday);
            serde_json::to_string(&bars).map_err(execution_error)
        }
    }
}

/// A tool returning the analyst recommendation trend of a stock as JSON.
pub struct AnalystRecommendationsTool {
    client: YahooFinanceClient,
    parameter_schema: Value,
}

impl AnalystRecommendationsTool {
    /// Creates a new analyst recommendations tool.
    #[inline]
    pub fn new(client: YahooFinanceClient) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(SymbolParameters).to_value(),
        }
    }
}

impl Tool for AnalystRecommendationsTool {
    type Input = SymbolParameters;

    fn name(&self) -> &str {
        "get_analyst_recommendations"
    }

    fn description(&self) -> &str {
        "Gets analyst recommendations of a stock as a JSON list with the \
         number of strong buy, buy, hold, sell and strong sell ratings per \
         period. Period `0m` is the current month, `-1m` the month before."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SymbolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let symbol = normalize_symbol(&input.symbol)?;
            let summary = client
                .quote_summary(&symbol, &["recommendationTrend"])
                .await?;
            let trend = summary.recommendation_trend.unwrap_or_default().trend;
            if trend.is_empty() {
                return Err(ToolError::execution_error().with_reason(format!(
                    "no analyst recommendations found for {symbol}"
                )));
            }
            serde_json::to_string(&trend).map_err(execution_error)
        }
    }
}

#[derive(Debug, Serialize)]
struct StockFundamentals {
    symbol: String,
    company_name: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    country: Option<String>,
    website: Option<String>,
    employees: Option<u64>,
    currency: Option<String>,
    market_cap: Option<f64>,
    enterprise_value: Option<f64>,
    shares_outstanding: Option<f64>,
    trailing_pe: Option<f64>,
    forward_pe: Option<f64>,
    price_to_book: Option<f64>,
    trailing_eps: Option<f64>,
    forward_eps: Option<f64>,
    dividend_yield: Option<f64>,
    profit_margins: Option<f64>,
    beta: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
}

impl StockFundamentals {
    fn new(symbol: String, summary: QuoteSummaryResult) -> Self {
        let detail = summary.summary_detail.unwrap_or_default();
        let stats = summary.default_key_statistics.unwrap_or_default();
        let profile = summary.asset_profile.unwrap_or_default();
        let price = summary.price.unwrap_or_default();
        Self {
            symbol,
            company_name: price.long_name.or(price.short_name),
            sector: profile.sector,
            industry: profile.industry,
            country: profile.country,
            website: profile.website,
            employees: profile.full_time_employees,
            currency: detail.currency,
            market_cap: raw(detail.market_cap),
            enterprise_value: raw(stats.enterprise_value),
            shares_outstanding: raw(stats.shares_outstanding),
            trailing_pe: raw(detail.trailing_pe),
            forward_pe: raw(detail.forward_pe),
            price_to_book: raw(stats.price_to_book),
            trailing_eps: raw(stats.trailing_eps),
            forward_eps: raw(stats.forward_eps),
            dividend_yield: raw(detail.dividend_yield),
            profit_margins: raw(stats.profit_margins),
            beta: raw(detail.beta),
            fifty_two_week_high: raw(detail.fifty_two_week_high),
            fifty_two_week_low: raw(detail.fifty_two_week_low),
        }
    }
}

/// A tool returning company fundamentals of a stock as JSON.
pub struct StockFundamentalsTool {
    client: YahooFinanceClient,
    parameter_schema: Value,
}

impl StockFundamentalsTool {
    /// Creates a new stock fundamentals tool.
    #[inline]
    pub fn new(client: YahooFinanceClient) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(SymbolParameters).to_value(),
        }
    }
}

impl Tool for StockFundamentalsTool {
    type Input = SymbolParameters;

    fn name(&self) -> &str {
        "get_stock_fundamentals"
    }

    fn description(&self) -> &str {
        "Gets company fundamentals of a stock as JSON: company name, sector, \
         industry, market cap, enterprise value, P/E, P/B, EPS, dividend \
         yield, profit margins, beta and 52-week range."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: SymbolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let symbol = normalize_symbol(&input.symbol)?;
            let summary = client
                .quote_summary(
                    &symbol,
                    &[
                        "price",
                        "summaryDetail",
                        "defaultKeyStatistics",
                        "assetProfile",
                    ],
                )
                .await?;
            let fundamentals = StockFundamentals::new(symbol, summary);
            serde_json::to_string(&fundamentals).map_err(execution_error)
        }
    }
}
