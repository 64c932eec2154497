use crate::filter::{FilterConfig, FilterDescriptor};
use crate::table::Table;
use crate::types::Value;

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn text_rows(rows: &[&[&str]]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| Value::from(*cell)).collect())
        .collect()
}

/// Create a FilterDescriptor.
pub(crate) fn filter(id: &str, column: &str, depends_on: &[&str]) -> FilterDescriptor {
    FilterDescriptor {
        id: id.to_string(),
        column: column.to_string(),
        depends_on: depends_on.iter().map(|id| id.to_string()).collect(),
        kind: None,
    }
}

/// Create the category > subcategory > item cascade.
pub(crate) fn get_test_filter_config() -> FilterConfig {
    FilterConfig::new(vec![
        filter("category", "Category", &[]),
        filter("subcategory", "SubCategory", &["category"]),
        filter("item", "Item", &["category", "subcategory"]),
    ])
}

/// Create a sales table with Category, SubCategory, Item and numeric Value columns.
pub(crate) fn get_test_sales_table() -> Table {
    let rows: [(&str, &str, &str, f64); 5] = [
        ("Electronics", "Phones", "Phone", 10.0),
        ("Electronics", "Laptops", "Laptop", 20.0),
        ("Clothing", "Shirts", "Shirt", 5.0),
        ("Clothing", "Pants", "Jeans", 7.0),
        ("Electronics", "Phones", "Tablet", 3.0),
    ];
    Table::from_rows(
        columns(&["Category", "SubCategory", "Item", "Value"]),
        rows.iter()
            .map(|(category, subcategory, item, value)| {
                vec![
                    Value::from(*category),
                    Value::from(*subcategory),
                    Value::from(*item),
                    Value::from(*value),
                ]
            })
            .collect(),
    )
    .unwrap()
}

/// Create a price trends table as returned by the Google Sheets API (all text).
pub(crate) fn get_test_price_table() -> Table {
    Table::from_rows(
        columns(&["Date", "Gold Price", "Housing Price"]),
        text_rows(&[
            &["2020-01-15", "1,500", "100"],
            &["2020-06-15", "1,700", "120"],
            &["2021-01-15", "1,800", "150"],
            &["2021-06-15", "1,900", "150"],
            &["2022-03-01", "2,000", "135"],
            &["not a date", "9,999", "1"],
        ]),
    )
    .unwrap()
}

/// Create a market capitalisation table as returned by the Google Sheets API (all text).
pub(crate) fn get_test_market_table() -> Table {
    Table::from_rows(
        columns(&["Sector", "Sym", "Market Cap"]),
        text_rows(&[
            &["Tech", "AAPL", "300"],
            &["Tech", "MSFT", "200"],
            &["Energy", "XOM", "100"],
            &["Health", "JNJ", "oops"],
        ]),
    )
    .unwrap()
}

/// Create a stock weight table as returned by the Google Sheets API (all text).
pub(crate) fn get_test_stocks_table() -> Table {
    Table::from_rows(
        columns(&["Sector", "Sym", "% Stock Weight", "Market Cap"]),
        text_rows(&[
            &["Tech", "AAPL", "6.5%", "1"],
            &["Tech", "MSFT", " 5.25 % ", "1"],
            &["Energy", "XOM", "n/a", "1"],
            &["Energy", "CVX", "1%", "1"],
        ]),
    )
    .unwrap()
}
