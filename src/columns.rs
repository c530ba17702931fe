//! Canonical column names for sales data files.

pub const STOCK_CODE: &str = "StockCode";
pub const DESCRIPTION: &str = "Description";
pub const UNIT_PRICE: &str = "UnitPrice";
pub const QUANTITY: &str = "Quantity";
pub const TOTAL_PRICE: &str = "TotalPrice";
pub const COUNTRY: &str = "Country";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const DATE: &str = "Date";

/// Header order used by the data generator and expected by the CLI.
pub const ALL: [&str; 8] = [
    STOCK_CODE,
    DESCRIPTION,
    UNIT_PRICE,
    QUANTITY,
    TOTAL_PRICE,
    COUNTRY,
    INVOICE_NO,
    DATE,
];
