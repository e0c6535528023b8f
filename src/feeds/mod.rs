pub mod market_ws;
