//! Dashboard pipelines.
//!
//! Each pipeline reads datasets from the store, coerces the columns it knows about, applies the
//! request's filters and reduces the result with [aggregations](crate::aggregations). Stored
//! datasets are shared and immutable, so pipelines always work on copies.

use crate::aggregation::{Aggregation, GroupRecord};
use crate::aggregations::{ColumnTotal, GroupMeanChange, GroupSum, ShareOfTotal};
use crate::coerce;
use crate::dataset_store::DatasetStore;
use crate::error::DashboardError;
use crate::filter::{FilterConfig, FilterOptions, FilterValues};
use crate::join::inner_join;
use crate::table::{Record, Table};
use crate::types::Value;

use polars::prelude::{col, lit, DataType};
use serde::{Deserialize, Serialize};

/// Dataset and column names read by the dashboard pipelines.
///
/// Every field has a default, so a layout file only needs to name what differs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DashboardLayout {
    /// Dataset holding dated gold and housing prices
    pub price_dataset: String,
    /// Dataset holding market capitalisation per symbol
    pub market_dataset: String,
    /// Dataset holding stock weights per symbol
    pub stocks_dataset: String,
    pub date_column: String,
    pub gold_price_column: String,
    pub housing_price_column: String,
    /// Derived column holding the year of each date
    pub year_column: String,
    /// Derived column holding the abbreviated month of each date
    pub month_column: String,
    /// Market columns below are matched after lower-casing column names
    pub sector_column: String,
    pub symbol_column: String,
    pub market_cap_column: String,
    pub stock_weight_column: String,
    /// Suffix of market columns that clash with stocks columns after the join
    pub market_suffix: String,
    /// Suffix of stocks columns that clash with market columns after the join
    pub stocks_suffix: String,
    /// Maximum number of sectors in the market breakdown
    pub sector_limit: usize,
    /// Summary grouping column
    pub category_column: String,
    /// Summary value column
    pub value_column: String,
    /// Dataset whose filtered total is reported separately in the summary
    pub summary_extra_dataset: String,
}

impl Default for DashboardLayout {
    fn default() -> Self {
        Self {
            price_dataset: "googlesheet1".to_string(),
            market_dataset: "googlesheet2".to_string(),
            stocks_dataset: "googlesheet3".to_string(),
            date_column: "Date".to_string(),
            gold_price_column: "Gold Price".to_string(),
            housing_price_column: "Housing Price".to_string(),
            year_column: "Year".to_string(),
            month_column: "Month".to_string(),
            sector_column: "sector".to_string(),
            symbol_column: "sym".to_string(),
            market_cap_column: "market cap".to_string(),
            stock_weight_column: "% stock weight".to_string(),
            market_suffix: "_sp500".to_string(),
            stocks_suffix: "_stocks".to_string(),
            sector_limit: 5,
            category_column: "Category".to_string(),
            value_column: "Value".to_string(),
            summary_extra_dataset: "googlesheet3".to_string(),
        }
    }
}

/// Yearly gold and housing price trends.
#[derive(Debug, PartialEq, Serialize)]
pub struct PriceTrends {
    /// Gold price summed per year, as `value`
    pub aggregated_data: Vec<GroupRecord>,
    /// Percentage change of the mean housing price per year, as `housing`
    pub aggregated_housing_price: Vec<GroupRecord>,
    /// Parsed date column of the whole price dataset
    pub date: Vec<Value>,
    #[serde(flatten)]
    pub options: FilterOptions,
}

/// Market capitalisation per sector and stock weights.
#[derive(Debug, PartialEq, Serialize)]
pub struct MarketBreakdown {
    /// Market cap and share of total per sector, as `marketcap` and `percentage`
    pub aggregated_data: Vec<GroupRecord>,
    /// Symbol and stock weight of each filtered stock
    pub stock_data: Vec<Record>,
    #[serde(flatten)]
    pub options: FilterOptions,
}

/// Result of the data pipeline.
#[derive(Debug, PartialEq, Serialize)]
pub struct DashboardData {
    pub price_trends: PriceTrends,
    pub sp500_data: MarketBreakdown,
}

/// Result of the summary pipeline.
#[derive(Debug, PartialEq, Serialize)]
pub struct Summary {
    /// Filtered total of the value column over all datasets
    pub total_sales: f64,
    /// Filtered total of the value column of the extra dataset
    pub googlesheet3_sum: f64,
    /// Value summed per category, as `value`
    pub aggregated_data: Vec<GroupRecord>,
    #[serde(flatten)]
    pub options: FilterOptions,
}

/// Compute yearly price trends from the price dataset.
///
/// # Arguments
///
/// * `layout`: Dashboard layout
/// * `config`: Filter configuration
/// * `values`: Request filter values
/// * `prices`: Price dataset
pub fn price_trends(
    layout: &DashboardLayout,
    config: &FilterConfig,
    values: &FilterValues,
    prices: &Table,
) -> Result<PriceTrends, DashboardError> {
    let mut prices = prices.clone();
    coerce::numeric_column(&mut prices, &layout.gold_price_column, &[','], 0.0)?;
    coerce::numeric_column(&mut prices, &layout.housing_price_column, &[], 0.0)?;
    coerce::date_parts(
        &mut prices,
        &layout.date_column,
        &layout.year_column,
        &layout.month_column,
    )?;

    // Rows without a year cannot be placed on the trend.
    prices.require_column(&layout.year_column)?;
    let dated = prices.filter(
        col(layout.year_column.as_str())
            .cast(DataType::String)
            .neq(lit("")),
    )?;
    let filtered = config.apply(&dated, values)?;

    let aggregated_data = GroupSum::new(&layout.year_column, &layout.gold_price_column, "value")
        .aggregate(&filtered)?;
    let aggregated_housing_price = GroupMeanChange::new(
        &layout.year_column,
        &layout.housing_price_column,
        "housing",
    )
    .aggregate(&filtered)?;
    let date = match prices.column_index(&layout.date_column) {
        Some(index) => prices.column_values(index)?,
        None => vec![],
    };
    let options = config.options(&prices, values)?;
    Ok(PriceTrends {
        aggregated_data,
        aggregated_housing_price,
        date,
        options,
    })
}

/// Compute the sector breakdown from the market and stocks datasets.
///
/// Both datasets have their column names lower-cased before they are joined on sector and
/// symbol.
///
/// # Arguments
///
/// * `layout`: Dashboard layout
/// * `config`: Filter configuration
/// * `values`: Request filter values
/// * `market`: Market capitalisation dataset
/// * `stocks`: Stock weight dataset
pub fn market_breakdown(
    layout: &DashboardLayout,
    config: &FilterConfig,
    values: &FilterValues,
    market: &Table,
    stocks: &Table,
) -> Result<MarketBreakdown, DashboardError> {
    let mut market = market.clone();
    market.lowercase_columns()?;
    coerce::numeric_column(&mut market, &layout.market_cap_column, &[], 0.0)?;
    let mut stocks = stocks.clone();
    stocks.lowercase_columns()?;
    coerce::percent_column(&mut stocks, &layout.stock_weight_column, 0.0)?;

    let mut joined = inner_join(
        &market,
        &stocks,
        &[layout.sector_column.as_str(), layout.symbol_column.as_str()],
        (layout.market_suffix.as_str(), layout.stocks_suffix.as_str()),
    )?;
    joined.rename_column(
        &format!("{}{}", layout.market_cap_column, layout.market_suffix),
        &layout.market_cap_column,
    )?;

    let filtered = config.apply(&joined, values)?;
    let options = config.options(&joined, values)?;
    let aggregated_data = ShareOfTotal::new(
        &layout.sector_column,
        &layout.market_cap_column,
        "marketcap",
        Some(layout.sector_limit),
    )
    .aggregate(&filtered)?;
    let stock_data = filtered
        .select(&[
            layout.symbol_column.as_str(),
            layout.stock_weight_column.as_str(),
        ])?
        .to_records()?;
    Ok(MarketBreakdown {
        aggregated_data,
        stock_data,
        options,
    })
}

/// Summarise all datasets by category.
///
/// # Arguments
///
/// * `layout`: Dashboard layout
/// * `config`: Filter configuration
/// * `values`: Request filter values
/// * `datasets`: Named datasets, concatenated in the given order
pub fn summary<'a, I>(
    layout: &DashboardLayout,
    config: &FilterConfig,
    values: &FilterValues,
    datasets: I,
) -> Result<Summary, DashboardError>
where
    I: IntoIterator<Item = (&'a str, &'a Table)>,
{
    let datasets: Vec<(&str, &Table)> = datasets.into_iter().collect();
    let mut combined = Table::concat(datasets.iter().map(|(_, table)| *table))?;
    coerce::numeric_column(&mut combined, &layout.value_column, &[], 0.0)?;

    let filtered = config.apply(&combined, values)?;
    let options = config.options(&combined, values)?;
    let total = ColumnTotal::new(&layout.value_column);
    let total_sales = total.aggregate(&filtered)?;
    let googlesheet3_sum = match datasets
        .iter()
        .find(|(name, _)| *name == layout.summary_extra_dataset)
    {
        Some((_, table)) => total.aggregate(&config.apply(table, values)?)?,
        None => 0.0,
    };
    let aggregated_data = GroupSum::new(&layout.category_column, &layout.value_column, "value")
        .aggregate(&filtered)?;
    Ok(Summary {
        total_sales,
        googlesheet3_sum,
        aggregated_data,
        options,
    })
}

/// Run the data pipeline over the stored datasets.
///
/// # Arguments
///
/// * `store`: Dataset store
/// * `layout`: Dashboard layout
/// * `config`: Filter configuration
/// * `values`: Request filter values
#[tracing::instrument(level = "DEBUG", skip(store, layout, config))]
pub async fn get_data(
    store: &DatasetStore,
    layout: &DashboardLayout,
    config: &FilterConfig,
    values: &FilterValues,
) -> Result<DashboardData, DashboardError> {
    if store.is_empty().await {
        return Err(DashboardError::NoDatasets);
    }
    let prices = store.get(&layout.price_dataset).await.ok_or_else(|| {
        DashboardError::DatasetsUnavailable {
            names: "Price trends".to_string(),
        }
    })?;
    let price_trends = price_trends(layout, config, values, &prices)?;

    let market = store.get(&layout.market_dataset).await;
    let stocks = store.get(&layout.stocks_dataset).await;
    let (Some(market), Some(stocks)) = (market, stocks) else {
        return Err(DashboardError::DatasetsUnavailable {
            names: "S&P500 or Stock".to_string(),
        });
    };
    let sp500_data = market_breakdown(layout, config, values, &market, &stocks)?;
    Ok(DashboardData {
        price_trends,
        sp500_data,
    })
}

/// Run the summary pipeline over the stored datasets.
///
/// # Arguments
///
/// * `store`: Dataset store
/// * `layout`: Dashboard layout
/// * `config`: Filter configuration
/// * `values`: Request filter values
#[tracing::instrument(level = "DEBUG", skip(store, layout, config))]
pub async fn get_summary(
    store: &DatasetStore,
    layout: &DashboardLayout,
    config: &FilterConfig,
    values: &FilterValues,
) -> Result<Summary, DashboardError> {
    let datasets = store.snapshot().await;
    if datasets.is_empty() {
        return Err(DashboardError::NoDatasets);
    }
    summary(
        layout,
        config,
        values,
        datasets
            .iter()
            .map(|(name, table)| (name.as_str(), table.as_ref())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterDescriptor;
    use crate::test_utils;
    use crate::types::Selection;

    use serde_json::json;

    fn year_config() -> FilterConfig {
        FilterConfig::new(vec![test_utils::filter("year", "Year", &[])])
    }

    fn sector_config() -> FilterConfig {
        FilterConfig::new(vec![
            test_utils::filter("sector", "sector", &[]),
            test_utils::filter("sym", "sym", &["sector"]),
        ])
    }

    fn values(pairs: &[(&str, &str)]) -> FilterValues {
        pairs
            .iter()
            .map(|(column, value)| (column.to_string(), Selection::One(value.to_string())))
            .collect()
    }

    #[test]
    fn test_layout_defaults_and_partial_file() {
        let layout: DashboardLayout =
            serde_json::from_value(json!({"price_dataset": "excelsheet1", "sector_limit": 3}))
                .unwrap();
        assert_eq!("excelsheet1", layout.price_dataset);
        assert_eq!(3, layout.sector_limit);
        assert_eq!("googlesheet2", layout.market_dataset);
        assert_eq!("% stock weight", layout.stock_weight_column);
    }

    #[test]
    fn test_price_trends() {
        let layout = DashboardLayout::default();
        let prices = test_utils::get_test_price_table();
        let trends = price_trends(&layout, &year_config(), &FilterValues::new(), &prices).unwrap();
        assert_eq!(
            json!([
                {"Year": "2020", "value": 3200.0},
                {"Year": "2021", "value": 3700.0},
                {"Year": "2022", "value": 2000.0},
            ]),
            serde_json::to_value(&trends.aggregated_data).unwrap()
        );
        assert_eq!(
            json!([
                {"Year": "2020", "housing": 0.0},
                {"Year": "2021", "housing": 36.36},
                {"Year": "2022", "housing": -10.0},
            ]),
            serde_json::to_value(&trends.aggregated_housing_price).unwrap()
        );
        assert_eq!(6, trends.date.len());
        assert!(trends.date[5].is_null());
        // Options are computed before rows without a year are dropped.
        assert_eq!(
            vec![
                Value::from(""),
                Value::from("2020"),
                Value::from("2021"),
                Value::from("2022")
            ],
            trends.options["year_options"]
        );
        // The stored table is untouched.
        assert_eq!(test_utils::get_test_price_table(), prices);
    }

    #[test]
    fn test_price_trends_filtered() {
        let layout = DashboardLayout::default();
        let prices = test_utils::get_test_price_table();
        let trends = price_trends(
            &layout,
            &year_config(),
            &values(&[("Year", "2021")]),
            &prices,
        )
        .unwrap();
        assert_eq!(
            json!([{"Year": "2021", "value": 3700.0}]),
            serde_json::to_value(&trends.aggregated_data).unwrap()
        );
        assert_eq!(
            json!([{"Year": "2021", "housing": 0.0}]),
            serde_json::to_value(&trends.aggregated_housing_price).unwrap()
        );
    }

    #[test]
    fn test_price_trends_serialises_flat_options() {
        let layout = DashboardLayout::default();
        let prices = test_utils::get_test_price_table();
        let trends = price_trends(&layout, &year_config(), &FilterValues::new(), &prices).unwrap();
        let json = serde_json::to_value(&trends).unwrap();
        assert_eq!(json!("2020-01-15T00:00:00"), json["date"][0]);
        assert_eq!(json!(null), json["date"][5]);
        assert!(json["year_options"].is_array());
    }

    #[test]
    fn test_price_trends_without_date_column() {
        let layout = DashboardLayout::default();
        let sales = test_utils::get_test_sales_table();
        match price_trends(&layout, &year_config(), &FilterValues::new(), &sales) {
            Err(DashboardError::ColumnNotFound { column }) => assert_eq!("Year", column),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_market_breakdown() {
        let layout = DashboardLayout::default();
        let breakdown = market_breakdown(
            &layout,
            &sector_config(),
            &FilterValues::new(),
            &test_utils::get_test_market_table(),
            &test_utils::get_test_stocks_table(),
        )
        .unwrap();
        assert_eq!(
            json!([
                {"sector": "Energy", "marketcap": 100.0, "percentage": 16.7},
                {"sector": "Tech", "marketcap": 500.0, "percentage": 83.3},
            ]),
            serde_json::to_value(&breakdown.aggregated_data).unwrap()
        );
        assert_eq!(
            json!([
                {"sym": "AAPL", "% stock weight": 0.065},
                {"sym": "MSFT", "% stock weight": 0.0525},
                {"sym": "XOM", "% stock weight": 0.0},
            ]),
            serde_json::to_value(&breakdown.stock_data).unwrap()
        );
        assert_eq!(
            vec![Value::from("Energy"), Value::from("Tech")],
            breakdown.options["sector_options"]
        );
    }

    #[test]
    fn test_market_breakdown_cascading_options() {
        let layout = DashboardLayout::default();
        let breakdown = market_breakdown(
            &layout,
            &sector_config(),
            &values(&[("sector", "Tech")]),
            &test_utils::get_test_market_table(),
            &test_utils::get_test_stocks_table(),
        )
        .unwrap();
        assert_eq!(
            vec![Value::from("AAPL"), Value::from("MSFT")],
            breakdown.options["sym_options"]
        );
        assert_eq!(
            vec![Value::from("Energy"), Value::from("Tech")],
            breakdown.options["sector_options"]
        );
        assert_eq!(
            json!([{"sector": "Tech", "marketcap": 500.0, "percentage": 100.0}]),
            serde_json::to_value(&breakdown.aggregated_data).unwrap()
        );
    }

    #[test]
    fn test_market_breakdown_sector_limit() {
        let layout = DashboardLayout {
            sector_limit: 1,
            ..Default::default()
        };
        let breakdown = market_breakdown(
            &layout,
            &FilterConfig::default(),
            &FilterValues::new(),
            &test_utils::get_test_market_table(),
            &test_utils::get_test_stocks_table(),
        )
        .unwrap();
        assert_eq!(1, breakdown.aggregated_data.len());
        assert_eq!(Some(16.7), breakdown.aggregated_data[0].get("percentage"));
    }

    #[test]
    fn test_summary() {
        let layout = DashboardLayout::default();
        let sales = test_utils::get_test_sales_table();
        let config = test_utils::get_test_filter_config();
        let summary = summary(
            &layout,
            &config,
            &values(&[("Category", "Electronics")]),
            [("excelsheet1", &sales), ("googlesheet3", &sales)],
        )
        .unwrap();
        assert_eq!(66.0, summary.total_sales);
        assert_eq!(33.0, summary.googlesheet3_sum);
        assert_eq!(
            json!([{"Category": "Electronics", "value": 66.0}]),
            serde_json::to_value(&summary.aggregated_data).unwrap()
        );
        assert_eq!(
            vec![Value::from("Clothing"), Value::from("Electronics")],
            summary.options["category_options"]
        );
        assert_eq!(
            vec![Value::from("Laptops"), Value::from("Phones")],
            summary.options["subcategory_options"]
        );
    }

    #[test]
    fn test_summary_without_extra_dataset() {
        let layout = DashboardLayout::default();
        let sales = test_utils::get_test_sales_table();
        let summary = summary(
            &layout,
            &FilterConfig::default(),
            &FilterValues::new(),
            [("excelsheet1", &sales)],
        )
        .unwrap();
        assert_eq!(45.0, summary.total_sales);
        assert_eq!(0.0, summary.googlesheet3_sum);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json!(0.0), json["googlesheet3_sum"]);
    }

    #[tokio::test]
    async fn test_get_data_requires_datasets() {
        let store = DatasetStore::new();
        let layout = DashboardLayout::default();
        let config = FilterConfig::default();
        let result = get_data(&store, &layout, &config, &FilterValues::new()).await;
        assert!(matches!(result, Err(DashboardError::NoDatasets)));

        store
            .insert("googlesheet1", test_utils::get_test_price_table())
            .await;
        match get_data(&store, &layout, &config, &FilterValues::new()).await {
            Err(error) => assert_eq!("S&P500 or Stock data not available", error.to_string()),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_get_data() {
        let store = DatasetStore::new();
        store
            .insert("googlesheet1", test_utils::get_test_price_table())
            .await;
        store
            .insert("googlesheet2", test_utils::get_test_market_table())
            .await;
        store
            .insert("googlesheet3", test_utils::get_test_stocks_table())
            .await;
        let layout = DashboardLayout::default();
        let config = FilterConfig::new(vec![FilterDescriptor {
            id: "sector".to_string(),
            column: "sector".to_string(),
            depends_on: vec![],
            kind: Some("top-level".to_string()),
        }]);
        let data = get_data(&store, &layout, &config, &values(&[("sector", "Energy")]))
            .await
            .unwrap();
        assert_eq!(3, data.price_trends.aggregated_data.len());
        assert_eq!(1, data.sp500_data.stock_data.len());
        // Stored tables keep their original column names.
        assert_eq!(
            "Sector",
            store.get("googlesheet2").await.unwrap().columns()[0]
        );
    }

    #[tokio::test]
    async fn test_get_summary_requires_datasets() {
        let store = DatasetStore::new();
        let result = get_summary(
            &store,
            &DashboardLayout::default(),
            &FilterConfig::default(),
            &FilterValues::new(),
        )
        .await;
        assert!(matches!(result, Err(DashboardError::NoDatasets)));
    }
}
