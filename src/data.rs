use crate::config::DataSettings;
use crate::error::{AllocError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Which closing-price field a series was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PriceField {
    AdjClose,
    Close,
}

/// Daily history for one symbol as handed back by a [`PriceSource`].
#[derive(Clone, Debug, Default)]
pub struct DailyHistory {
    pub symbol: String,
    pub dates: Vec<NaiveDate>,
    pub close: Vec<Option<f64>>,
    /// `None` when the provider has no dividend/split-adjusted series.
    pub adj_close: Option<Vec<Option<f64>>>,
}

impl DailyHistory {
    /// Adjusted closes when the provider has any, raw closes otherwise.
    pub fn preferred_closes(&self) -> (PriceField, &[Option<f64>]) {
        match &self.adj_close {
            Some(adj) if adj.iter().any(Option::is_some) => (PriceField::AdjClose, adj),
            _ => (PriceField::Close, &self.close),
        }
    }

    /// Date → price for every date with a usable (finite, positive) price.
    fn valid_points(&self) -> BTreeMap<NaiveDate, f64> {
        let (_, closes) = self.preferred_closes();
        self.dates
            .iter()
            .enumerate()
            .filter_map(|(i, &date)| {
                let price = closes.get(i).copied().flatten()?;
                (price.is_finite() && price > 0.0).then_some((date, price))
            })
            .collect()
    }
}

/// Date-aligned closing prices, one column per ticker.
///
/// Every row holds a finite, positive price for every ticker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceTable {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<f64>>,
    unadjusted: Vec<String>,
}

impl PriceTable {
    pub fn new(tickers: Vec<String>, dates: Vec<NaiveDate>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if tickers.is_empty() {
            return Err(AllocError::InvalidInput("price table needs at least one ticker".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(AllocError::InvalidInput(format!("duplicate ticker {}", dup)));
        }
        if dates.is_empty() {
            return Err(AllocError::InvalidInput("price table has no rows".to_string()));
        }
        if dates.len() != rows.len() {
            return Err(AllocError::InvalidInput(format!(
                "{} dates but {} price rows",
                dates.len(),
                rows.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AllocError::InvalidInput("dates must be strictly increasing".to_string()));
        }
        for (date, row) in dates.iter().zip(rows.iter()) {
            if row.len() != tickers.len() {
                return Err(AllocError::InvalidInput(format!(
                    "row {} has {} prices for {} tickers",
                    date,
                    row.len(),
                    tickers.len()
                )));
            }
            if let Some(pos) = row.iter().position(|p| !(p.is_finite() && *p > 0.0)) {
                return Err(AllocError::InvalidInput(format!(
                    "price for {} on {} is not a positive number",
                    tickers[pos], date
                )));
            }
        }

        Ok(Self {
            tickers,
            dates,
            rows,
            unadjusted: Vec::new(),
        })
    }

    /// Builds a table from per-ticker columns of equal length.
    pub fn from_columns(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if columns.len() != tickers.len() {
            return Err(AllocError::InvalidInput(format!(
                "{} columns for {} tickers",
                columns.len(),
                tickers.len()
            )));
        }
        if let Some(col) = columns.iter().find(|c| c.len() != dates.len()) {
            return Err(AllocError::InvalidInput(format!(
                "column of length {} does not match {} dates",
                col.len(),
                dates.len()
            )));
        }
        let rows = (0..dates.len())
            .map(|t| columns.iter().map(|c| c[t]).collect())
            .collect();
        Self::new(tickers, dates, rows)
    }

    fn with_unadjusted(mut self, unadjusted: Vec<String>) -> Self {
        self.unadjusted = unadjusted;
        self
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of trading dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    /// Tickers whose series fell back to the raw close.
    pub fn unadjusted(&self) -> &[String] {
        &self.unadjusted
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[idx]).collect()
    }

    /// Simple daily returns `p_t / p_{t-1} - 1`, one row per date after the first.
    pub fn pct_change(&self) -> Vec<Vec<f64>> {
        self.rows
            .windows(2)
            .map(|w| w[1].iter().zip(w[0].iter()).map(|(cur, prev)| cur / prev - 1.0).collect())
            .collect()
    }
}

/// Joins per-symbol histories on the dates where every symbol has a valid price.
pub fn align_histories(histories: &[DailyHistory]) -> Result<PriceTable> {
    let points: Vec<BTreeMap<NaiveDate, f64>> = histories.iter().map(DailyHistory::valid_points).collect();
    let Some((first, rest)) = points.split_first() else {
        return Err(AllocError::InvalidInput("no price histories to align".to_string()));
    };

    let mut dates = Vec::new();
    let mut rows = Vec::new();
    for (&date, &price) in first {
        let mut row = Vec::with_capacity(points.len());
        row.push(price);
        for series in rest {
            match series.get(&date) {
                Some(&p) => row.push(p),
                None => break,
            }
        }
        if row.len() == points.len() {
            dates.push(date);
            rows.push(row);
        }
    }

    let dropped = points.iter().map(BTreeMap::len).max().unwrap_or(0) - dates.len();
    if dropped > 0 {
        debug!("Dropped {} dates with a missing price for at least one ticker", dropped);
    }

    let unadjusted = histories
        .iter()
        .filter(|h| h.preferred_closes().0 == PriceField::Close)
        .map(|h| h.symbol.clone())
        .collect();
    let tickers = histories.iter().map(|h| h.symbol.clone()).collect();

    Ok(PriceTable::new(tickers, dates, rows)?.with_unadjusted(unadjusted))
}

/// Splits a comma separated ticker list the way users type it.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_uppercase()).collect()
}

/// Upper-cases, trims and de-duplicates tickers, keeping first occurrence order.
pub fn normalize_tickers(tickers: &[String]) -> Result<Vec<String>> {
    if tickers.is_empty() {
        return Err(AllocError::InvalidInput("ticker set is empty".to_string()));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(AllocError::InvalidInput("blank ticker symbol".to_string()));
        }
        if !symbol.chars().all(is_symbol_char) {
            return Err(AllocError::InvalidInput(format!(
                "ticker '{}' may only contain letters, digits and . - ^ = _",
                symbol
            )));
        }
        if seen.insert(symbol.clone()) {
            out.push(symbol);
        }
    }
    Ok(out)
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=' | '_')
}

/// Boundary to a market-data provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Daily history for `symbol` covering `start..=end`.
    async fn daily_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DailyHistory>;
}

/// Fetches prices for `tickers` and aligns them into a [`PriceTable`].
///
/// Dates missing a price for any ticker are dropped. A source failure, or a
/// ticker with no usable price at all, fails the whole load.
pub async fn load_prices<S>(source: &S, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<PriceTable>
where
    S: PriceSource + ?Sized,
{
    let tickers = normalize_tickers(tickers)?;
    if start > end {
        return Err(AllocError::InvalidInput(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }

    info!("Loading daily prices for {:?} from {} to {}", tickers, start, end);

    let mut histories = Vec::with_capacity(tickers.len());
    for symbol in &tickers {
        let mut history = source.daily_history(symbol, start, end).await?;
        history.symbol = symbol.clone();
        let history = clip_to_range(history, start, end);

        if history.valid_points().is_empty() {
            return Err(AllocError::DataUnavailable {
                tickers: vec![symbol.clone()],
                start,
                end,
                reason: "provider returned no valid closing prices".to_string(),
            });
        }
        if history.preferred_closes().0 == PriceField::Close {
            warn!("Adjusted close not available for {}, using raw close instead", symbol);
        }
        histories.push(history);
    }

    let table = align_histories(&histories).map_err(|e| AllocError::DataUnavailable {
        tickers: tickers.clone(),
        start,
        end,
        reason: e.to_string(),
    })?;

    info!(
        "Loaded {} aligned trading days for {} tickers",
        table.len(),
        table.num_assets()
    );
    Ok(table)
}

fn clip_to_range(history: DailyHistory, start: NaiveDate, end: NaiveDate) -> DailyHistory {
    let keep: Vec<bool> = history.dates.iter().map(|d| (start..=end).contains(d)).collect();
    if keep.iter().all(|&k| k) {
        return history;
    }
    let pick = |values: &[Option<f64>]| -> Vec<Option<f64>> {
        keep.iter()
            .enumerate()
            .filter(|&(_, &k)| k)
            .map(|(i, _)| values.get(i).copied().flatten())
            .collect()
    };

    DailyHistory {
        dates: history.dates.iter().zip(keep.iter()).filter(|&(_, &k)| k).map(|(d, _)| *d).collect(),
        close: pick(&history.close),
        adj_close: history.adj_close.as_deref().map(pick),
        symbol: history.symbol,
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Yahoo Finance
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    #[serde(default)]
    result: Option<Vec<YahooResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Deserialize, Debug)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn history_from_chart(symbol: &str, response: YahooChartResponse) -> std::result::Result<DailyHistory, String> {
    if let Some(err) = response.chart.error {
        return Err(format!(
            "{}: {}",
            err.code.unwrap_or_else(|| "error".to_string()),
            err.description.unwrap_or_default()
        ));
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| "no chart result".to_string())?;
    if result.timestamp.is_empty() {
        return Err("no trading days in range".to_string());
    }

    let close = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();
    let adj_close = result.indicators.adjclose.into_iter().next().map(|a| a.adjclose);

    let mut dates = Vec::with_capacity(result.timestamp.len());
    let mut closes = Vec::with_capacity(result.timestamp.len());
    let mut adj = adj_close.as_ref().map(|_| Vec::with_capacity(result.timestamp.len()));
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        dates.push(date);
        closes.push(close.get(i).copied().flatten());
        if let (Some(out), Some(src)) = (adj.as_mut(), adj_close.as_ref()) {
            out.push(src.get(i).copied().flatten());
        }
    }

    Ok(DailyHistory {
        symbol: symbol.to_uppercase(),
        dates,
        close: closes,
        adj_close: adj,
    })
}

/// Daily history from the Yahoo Finance v8 chart endpoint.
#[derive(Clone, Debug)]
pub struct YahooSource {
    client: reqwest::Client,
    settings: DataSettings,
}

impl YahooSource {
    pub fn new(settings: DataSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    /// The end date is inclusive, so `period2` is midnight UTC after it.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .checked_add_days(Days::new(1))
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        // Index symbols start with '^', which is not valid unescaped in a path.
        let symbol = symbol.replace('^', "%5E");
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%7Csplit&includeAdjustedClose=true",
            self.settings.base_url, symbol, period1, period2
        )
    }
}

#[async_trait]
impl PriceSource for YahooSource {
    async fn daily_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DailyHistory> {
        let unavailable = |reason: String| AllocError::DataUnavailable {
            tickers: vec![symbol.to_string()],
            start,
            end,
            reason,
        };

        let url = self.chart_url(symbol, start, end);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read response body: {}", e)))?;

        let parsed: YahooChartResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                unavailable(format!("malformed chart response: {}", e))
            } else {
                unavailable(format!("HTTP {}", status))
            }
        })?;

        history_from_chart(symbol, parsed).map_err(unavailable)
    }
}

#[cfg(test)]
pub(crate) fn daily_dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    (0..n).map(|i| start + Days::new(i as u64)).collect()
}

#[cfg(test)]
pub(crate) fn test_table(tickers: &[&str], columns: Vec<Vec<f64>>) -> PriceTable {
    let n = columns.first().map(Vec::len).unwrap_or(0);
    PriceTable::from_columns(
        tickers.iter().map(|t| t.to_string()).collect(),
        daily_dates(n),
        columns,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn history(symbol: &str, closes: &[Option<f64>], adj: Option<&[Option<f64>]>) -> DailyHistory {
        DailyHistory {
            symbol: symbol.to_string(),
            dates: daily_dates(closes.len()),
            close: closes.to_vec(),
            adj_close: adj.map(|a| a.to_vec()),
        }
    }

    struct StubSource {
        histories: HashMap<String, DailyHistory>,
    }

    #[async_trait]
    impl PriceSource for StubSource {
        async fn daily_history(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DailyHistory> {
            self.histories
                .get(symbol)
                .cloned()
                .ok_or_else(|| AllocError::DataUnavailable {
                    tickers: vec![symbol.to_string()],
                    start,
                    end,
                    reason: "unreachable".to_string(),
                })
        }
    }

    #[test]
    fn test_missing_value_drops_date_for_all_tickers() {
        let a = history("AAA", &[Some(10.0), Some(11.0), Some(12.0), Some(13.0)], None);
        let b = history("BBB", &[Some(20.0), None, Some(22.0), Some(23.0)], None);

        let table = align_histories(&[a, b]).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.dates(), &[date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 4)]);
        assert_eq!(table.column(0), vec![10.0, 12.0, 13.0]);
        assert_eq!(table.column(1), vec![20.0, 22.0, 23.0]);
    }

    #[test]
    fn test_non_positive_prices_count_as_missing() {
        let a = history("AAA", &[Some(10.0), Some(0.0), Some(f64::NAN), Some(13.0)], None);
        let b = history("BBB", &[Some(20.0), Some(21.0), Some(22.0), Some(23.0)], None);

        let table = align_histories(&[a, b]).unwrap();
        assert_eq!(table.dates(), &[date(2024, 1, 1), date(2024, 1, 4)]);
    }

    #[test]
    fn test_adjusted_close_preferred_and_fallback_recorded() {
        let adj = [Some(9.5), Some(10.5)];
        let a = history("AAA", &[Some(10.0), Some(11.0)], Some(&adj));
        let b = history("BBB", &[Some(20.0), Some(21.0)], None);

        let table = align_histories(&[a, b]).unwrap();
        assert_eq!(table.column(0), vec![9.5, 10.5]);
        assert_eq!(table.column(1), vec![20.0, 21.0]);
        assert_eq!(table.unadjusted(), &["BBB".to_string()]);
    }

    #[test]
    fn test_pct_change() {
        let table = test_table(&["AAA"], vec![vec![100.0, 110.0, 99.0]]);
        let returns = table.pct_change();
        assert_eq!(returns.len(), 2);
        assert!((returns[0][0] - 0.10).abs() < 1e-12);
        assert!((returns[1][0] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_price_table_rejects_bad_input() {
        let tickers = vec!["AAA".to_string(), "AAA".to_string()];
        assert!(PriceTable::new(tickers, daily_dates(1), vec![vec![1.0, 2.0]]).is_err());

        let tickers = vec!["AAA".to_string()];
        assert!(PriceTable::new(tickers.clone(), vec![], vec![]).is_err());
        assert!(PriceTable::new(tickers.clone(), daily_dates(1), vec![vec![-1.0]]).is_err());
        assert!(PriceTable::new(tickers, daily_dates(2), vec![vec![1.0]]).is_err());
    }

    #[test]
    fn test_normalize_tickers() {
        let raw = parse_tickers(" aapl, MSFT ,aapl,goog");
        assert_eq!(normalize_tickers(&raw).unwrap(), vec!["AAPL", "MSFT", "GOOG"]);

        assert!(normalize_tickers(&[]).is_err());
        assert!(normalize_tickers(&parse_tickers("AAPL,,MSFT")).is_err());
    }

    #[test]
    fn test_normalize_tickers_rejects_url_breaking_symbols() {
        for bad in ["BRK/B", "AAPL?x=1", "MSFT#frag", "GO OG", "A%2F"] {
            let err = normalize_tickers(&[bad.to_string()]).unwrap_err();
            assert!(matches!(err, AllocError::InvalidInput(_)), "{} should be rejected", bad);
        }
        let ok = normalize_tickers(&parse_tickers("brk-b,^gspc,eurusd=x,rds.a")).unwrap();
        assert_eq!(ok, vec!["BRK-B", "^GSPC", "EURUSD=X", "RDS.A"]);
    }

    #[test]
    fn test_history_from_chart_reads_adjclose() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"AAA"},
            "timestamp":[1704205800,1704292200,1704378600],
            "indicators":{"quote":[{"open":[1,2,3],"close":[10.0,null,12.0]}],
                          "adjclose":[{"adjclose":[9.0,null,11.0]}]}}],"error":null}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let h = history_from_chart("aaa", parsed).unwrap();

        assert_eq!(h.symbol, "AAA");
        assert_eq!(h.dates, vec![date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]);
        assert_eq!(h.close, vec![Some(10.0), None, Some(12.0)]);
        assert_eq!(h.adj_close, Some(vec![Some(9.0), None, Some(11.0)]));
        assert_eq!(h.preferred_closes().0, PriceField::AdjClose);
    }

    #[test]
    fn test_history_from_chart_without_adjclose_and_errors() {
        let body = r#"{"chart":{"result":[{"timestamp":[1704205800],
            "indicators":{"quote":[{"close":[10.0]}]}}],"error":null}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let h = history_from_chart("AAA", parsed).unwrap();
        assert!(h.adj_close.is_none());
        assert_eq!(h.preferred_closes().0, PriceField::Close);

        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let err = history_from_chart("ZZZZ", parsed).unwrap_err();
        assert!(err.contains("Not Found"));
    }

    #[test]
    fn test_chart_url_end_is_inclusive() {
        let source = YahooSource::new(DataSettings {
            base_url: "http://localhost:1".to_string(),
            ..DataSettings::default()
        });
        let url = source.chart_url("AAPL", date(2024, 1, 1), date(2024, 1, 31));
        assert!(url.starts_with("http://localhost:1/v8/finance/chart/AAPL?"));
        assert!(url.contains("period1=1704067200"));
        assert!(url.contains("period2=1706745600"));

        let url = source.chart_url("^GSPC", date(2024, 1, 1), date(2024, 1, 31));
        assert!(url.starts_with("http://localhost:1/v8/finance/chart/%5EGSPC?"));
    }

    #[tokio::test]
    async fn test_load_prices_aligns_and_clips() {
        let mut histories = HashMap::new();
        histories.insert(
            "AAA".to_string(),
            history("AAA", &[Some(10.0), Some(11.0), Some(12.0), Some(13.0)], None),
        );
        histories.insert(
            "BBB".to_string(),
            history("BBB", &[Some(20.0), Some(21.0), None, Some(23.0)], None),
        );
        let source = StubSource { histories };

        let table = load_prices(
            &source,
            &parse_tickers("aaa,bbb"),
            date(2024, 1, 2),
            date(2024, 1, 4),
        )
        .await
        .unwrap();

        assert_eq!(table.tickers(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(table.dates(), &[date(2024, 1, 2), date(2024, 1, 4)]);
        assert_eq!(table.column(0), vec![11.0, 13.0]);
    }

    #[tokio::test]
    async fn test_load_prices_unreachable_source_is_data_unavailable() {
        let source = StubSource {
            histories: HashMap::new(),
        };
        let err = load_prices(&source, &parse_tickers("AAA"), date(2024, 1, 1), date(2024, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_prices_empty_ticker_history_is_data_unavailable() {
        let mut histories = HashMap::new();
        histories.insert("AAA".to_string(), history("AAA", &[Some(10.0), Some(11.0)], None));
        histories.insert("BBB".to_string(), history("BBB", &[None, None], None));
        let source = StubSource { histories };

        let err = load_prices(&source, &parse_tickers("AAA,BBB"), date(2024, 1, 1), date(2024, 1, 2))
            .await
            .unwrap_err();
        match err {
            AllocError::DataUnavailable { tickers, .. } => assert_eq!(tickers, vec!["BBB"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_prices_disjoint_dates_is_data_unavailable() {
        let mut histories = HashMap::new();
        histories.insert("AAA".to_string(), history("AAA", &[Some(10.0), None], None));
        histories.insert("BBB".to_string(), history("BBB", &[None, Some(20.0)], None));
        let source = StubSource { histories };

        let err = load_prices(&source, &parse_tickers("AAA,BBB"), date(2024, 1, 1), date(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_prices_rejects_inverted_range() {
        let source = StubSource {
            histories: HashMap::new(),
        };
        let err = load_prices(&source, &parse_tickers("AAA"), date(2024, 2, 1), date(2024, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AllocError::InvalidInput(_)));
    }
}
