//! Built-in tools that models can use.

mod web_search;
mod yahoo_finance;

pub use web_search::WebSearchTool;
pub use yahoo_finance::{
    AnalystRecommendationsTool, HistoricalPricesTool, StockFundamentalsTool,
    StockPriceTool, StockSummaryTool, YahooFinanceClient,
};
