use anyhow::bail;
use common::StrategyParams;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub universe: Vec<String>,
    /// Trading capital used for position sizing and the daily loss limit.
    pub capital: f64,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// Presence of this file forces the circuit breaker open for the day.
    #[serde(default = "default_kill_switch_file")]
    pub kill_switch_file: String,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub hypothesis: HypothesisConfig,
    pub feed: FeedConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    pub buy_threshold: f64,
    pub sentiment_weight: f64,
    pub momentum_weight: f64,
    pub max_positions: usize,
    /// Fraction of capital allocated per trade.
    pub max_alloc_per_trade: f64,
    #[serde(default)]
    pub use_weekend_insights: bool,
    pub cycle_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub min_hold_hours: i64,
    pub max_hold_days: i64,
    pub small_loss_threshold: f64,
    pub daily_loss_limit_pct: f64,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_n_similar")]
    pub n_similar_results: usize,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_max_boost")]
    pub max_boost: f64,
    #[serde(default = "default_rag_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_similar_results: default_n_similar(),
            confidence_floor: default_confidence_floor(),
            max_boost: default_max_boost(),
            base_url: default_rag_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HypothesisConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    #[serde(default = "default_improvement_epsilon")]
    pub improvement_epsilon: f64,
    /// 0 derives the budget from depth, beam width, and branching.
    #[serde(default)]
    pub max_evaluations: usize,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            beam_width: default_beam_width(),
            improvement_epsilon: default_improvement_epsilon(),
            max_evaluations: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Empty selects the paper/live default for the chosen mode.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub use_paper: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_storage_dir() -> String {
    "storage".into()
}

fn default_kill_switch_file() -> String {
    "STOP_TRADING".into()
}

fn default_n_similar() -> usize {
    5
}

fn default_confidence_floor() -> f64 {
    0.35
}

fn default_max_boost() -> f64 {
    0.2
}

fn default_rag_base_url() -> String {
    "http://127.0.0.1:9301".into()
}

fn default_request_timeout() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_depth() -> usize {
    2
}

fn default_beam_width() -> usize {
    3
}

fn default_improvement_epsilon() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option once at startup, before any network call.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.universe.is_empty() {
            bail!("universe must list at least one ticker");
        }
        if self.capital <= 0.0 {
            bail!("capital must be positive");
        }

        let t = &self.trading;
        if t.sentiment_weight < 0.0 || t.momentum_weight < 0.0 {
            bail!("signal weights must be non-negative");
        }
        if t.sentiment_weight + t.momentum_weight <= 0.0 {
            bail!("at least one signal weight must be positive");
        }
        if !(-1.0..=1.0).contains(&t.buy_threshold) {
            bail!("buy_threshold must be in [-1, 1]");
        }
        if t.max_positions == 0 {
            bail!("max_positions must be at least 1");
        }
        if !(0.0..=1.0).contains(&t.max_alloc_per_trade) || t.max_alloc_per_trade == 0.0 {
            bail!("max_alloc_per_trade must be in (0, 1]");
        }

        let r = &self.risk;
        for (name, value) in [
            ("stop_loss_pct", r.stop_loss_pct),
            ("take_profit_pct", r.take_profit_pct),
            ("small_loss_threshold", r.small_loss_threshold),
            ("daily_loss_limit_pct", r.daily_loss_limit_pct),
        ] {
            if !(0.0..1.0).contains(&value) || value == 0.0 {
                bail!("{name} must be in (0, 1)");
            }
        }
        if r.min_hold_hours < 0 {
            bail!("min_hold_hours must be non-negative");
        }
        if r.max_hold_days < 1 {
            bail!("max_hold_days must be at least 1");
        }
        if r.max_trades_per_day == 0 || r.max_consecutive_losses == 0 {
            bail!("circuit breaker limits must be at least 1");
        }

        if self.rag.enabled {
            if self.rag.n_similar_results == 0 {
                bail!("rag.n_similar_results must be at least 1");
            }
            if !(0.0..=1.0).contains(&self.rag.confidence_floor) {
                bail!("rag.confidence_floor must be in [0, 1]");
            }
        }

        if self.hypothesis.max_depth == 0 || self.hypothesis.beam_width == 0 {
            bail!("hypothesis.max_depth and hypothesis.beam_width must be at least 1");
        }

        Ok(())
    }

    /// Strategy parameters from static configuration, used when no insight
    /// artifact is in play.
    pub fn base_params(&self) -> StrategyParams {
        StrategyParams {
            buy_threshold: self.trading.buy_threshold,
            take_profit_pct: self.risk.take_profit_pct,
            stop_loss_pct: self.risk.stop_loss_pct,
            position_size_multiplier: 1.0,
            focus_tickers: None,
        }
    }
}
