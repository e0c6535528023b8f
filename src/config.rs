use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use tracing::warn;

/// One binary market to monitor, configured as
/// `condition_id:yes_token:no_token[:tick_size[:neg_risk]]`.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub condition_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub tick_size: Decimal,
    pub neg_risk: bool,
}

impl MarketConfig {
    pub fn parse(spec: &str) -> Option<Self> {
        let parts: Vec<&str> = spec.trim().split(':').collect();
        if parts.len() < 3 || parts[..3].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            condition_id: parts[0].to_string(),
            yes_token_id: parts[1].to_string(),
            no_token_id: parts[2].to_string(),
            tick_size: parts
                .get(3)
                .and_then(|t| Decimal::from_str(t).ok())
                .unwrap_or(dec!(0.01)),
            neg_risk: parts
                .get(4)
                .map(|n| n.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub clob_rest_url: String,
    pub clob_ws_url: String,
    pub gamma_api_url: String,
    pub chain_id: u64,
    pub ws_reconnect_delay_seconds: u64,
    pub ws_ping_interval_seconds: u64,
    pub rest_timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_backoff_base: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            clob_rest_url: "https://clob.polymarket.com".into(),
            clob_ws_url: "wss://ws-subscriptions-clob.polymarket.com/ws/".into(),
            gamma_api_url: "https://gamma-api.polymarket.com".into(),
            chain_id: 137,
            ws_reconnect_delay_seconds: 5,
            ws_ping_interval_seconds: 30,
            rest_timeout_seconds: 10,
            max_retries: 3,
            retry_backoff_base: 1.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Minimum net edge (after fees and slippage reserve) to enter.
    pub min_edge: Decimal,
    /// Flat per-share reserve against adverse moves between signal and fill.
    pub slippage_buffer: Decimal,
    pub max_notional_per_trade: Decimal,
    pub max_open_pairs: usize,
    pub cooldown_ms: u64,
    pub order_timeout_seconds: u64,
    /// Exit when combined bid ≥ 1 − threshold.
    pub convergence_threshold: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_edge: dec!(0.005),
            slippage_buffer: dec!(0.002),
            max_notional_per_trade: dec!(100),
            max_open_pairs: 5,
            cooldown_ms: 1000,
            order_timeout_seconds: 30,
            convergence_threshold: dec!(0.001),
        }
    }
}

/// Venue fees in basis points. Zero for most markets.
#[derive(Debug, Clone, Default)]
pub struct FeeConfig {
    pub maker_fee_bps: Decimal,
    pub taker_fee_bps: Decimal,
}

impl FeeConfig {
    pub fn maker_fee_rate(&self) -> Decimal {
        self.maker_fee_bps / dec!(10000)
    }

    pub fn taker_fee_rate(&self) -> Decimal {
        self.taker_fee_bps / dec!(10000)
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub max_daily_loss: Decimal,
    pub max_position_value: Decimal,
    pub kill_switch_loss_threshold: Decimal,
    pub max_consecutive_failures: u32,
    pub health_check_interval_seconds: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: dec!(500),
            max_position_value: dec!(1000),
            kill_switch_loss_threshold: dec!(200),
            max_consecutive_failures: 3,
            health_check_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub private_key: String,
    pub funder_address: String,
    pub signature_type: u8,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,

    pub connection: ConnectionConfig,
    pub trading: TradingConfig,
    pub fees: FeeConfig,
    pub risk: RiskConfig,
    pub markets: Vec<MarketConfig>,

    pub db_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            funder_address: String::new(),
            signature_type: 2,
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            connection: ConnectionConfig::default(),
            trading: TradingConfig::default(),
            fees: FeeConfig::default(),
            risk: RiskConfig::default(),
            markets: Vec::new(),
            db_path: "paribot_state.json".into(),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env_var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("could not parse {key}, using default");
            default
        }),
        None => default,
    }
}

impl Config {
    /// Load from the environment (a .env file is honored if present).
    ///
    /// Required: POLYMARKET_PRIVATE_KEY, POLYMARKET_FUNDER_ADDRESS, and
    /// POLYMARKET_MARKETS (comma-separated market specs). Every trading,
    /// fee, and risk parameter has an override of the same name.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(key) = env_var("POLYMARKET_PRIVATE_KEY") {
            config.private_key = key;
        }
        if let Some(addr) = env_var("POLYMARKET_FUNDER_ADDRESS") {
            config.funder_address = addr;
        }
        config.signature_type = env_parse("POLYMARKET_SIGNATURE_TYPE", config.signature_type);
        config.api_key = env_var("POLYMARKET_API_KEY");
        config.api_secret = env_var("POLYMARKET_API_SECRET");
        config.api_passphrase = env_var("POLYMARKET_API_PASSPHRASE");

        if let Some(markets) = env_var("POLYMARKET_MARKETS") {
            for spec in markets.split(',') {
                match MarketConfig::parse(spec) {
                    Some(market) => config.markets.push(market),
                    None => warn!("skipping malformed market spec: {spec}"),
                }
            }
        }

        config.trading.min_edge = env_parse("MIN_EDGE", config.trading.min_edge);
        config.trading.slippage_buffer =
            env_parse("SLIPPAGE_BUFFER", config.trading.slippage_buffer);
        config.trading.max_notional_per_trade =
            env_parse("MAX_NOTIONAL_PER_TRADE", config.trading.max_notional_per_trade);
        config.trading.max_open_pairs =
            env_parse("MAX_OPEN_PAIRS", config.trading.max_open_pairs);
        config.trading.cooldown_ms = env_parse("COOLDOWN_MS", config.trading.cooldown_ms);
        config.trading.order_timeout_seconds =
            env_parse("ORDER_TIMEOUT_SECONDS", config.trading.order_timeout_seconds);
        config.trading.convergence_threshold =
            env_parse("CONVERGENCE_THRESHOLD", config.trading.convergence_threshold);

        config.fees.maker_fee_bps = env_parse("MAKER_FEE_BPS", config.fees.maker_fee_bps);
        config.fees.taker_fee_bps = env_parse("TAKER_FEE_BPS", config.fees.taker_fee_bps);

        config.risk.max_daily_loss = env_parse("MAX_DAILY_LOSS", config.risk.max_daily_loss);
        config.risk.max_position_value =
            env_parse("MAX_POSITION_VALUE", config.risk.max_position_value);
        config.risk.kill_switch_loss_threshold = env_parse(
            "KILL_SWITCH_LOSS_THRESHOLD",
            config.risk.kill_switch_loss_threshold,
        );
        config.risk.max_consecutive_failures = env_parse(
            "MAX_CONSECUTIVE_FAILURES",
            config.risk.max_consecutive_failures,
        );
        config.risk.health_check_interval_seconds = env_parse(
            "HEALTH_CHECK_INTERVAL_SECONDS",
            config.risk.health_check_interval_seconds,
        );

        if let Some(path) = env_var("DB_PATH") {
            config.db_path = path;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.private_key.is_empty(),
            "POLYMARKET_PRIVATE_KEY must be set"
        );
        anyhow::ensure!(
            !self.funder_address.is_empty(),
            "POLYMARKET_FUNDER_ADDRESS must be set"
        );
        anyhow::ensure!(
            !self.markets.is_empty(),
            "at least one market must be configured via POLYMARKET_MARKETS"
        );
        anyhow::ensure!(
            self.trading.min_edge > Decimal::ZERO,
            "min_edge must be positive"
        );
        anyhow::ensure!(
            self.trading.slippage_buffer >= Decimal::ZERO,
            "slippage_buffer cannot be negative"
        );
        anyhow::ensure!(
            self.trading.max_notional_per_trade > Decimal::ZERO,
            "max_notional_per_trade must be positive"
        );
        Ok(())
    }
}
