use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use broker_client::BrokerRestClient;
use chrono::Utc;
use common::{Error, Position, PositionStatus, Side, StrategyParams, TickerSnapshot};
use exit_engine::ExitRuleEngine;
use feed_client::FeedClient;
use hypothesis_engine::{
    HistoricalSnapshot, HypothesisSearch, InsightArtifact, SearchConfig,
};
use memory_client::{
    HttpMemoryStore, MemoryRecord, MemoryRetriever, MemoryStore, OutcomeLabel, RetrieverConfig,
};
use serde_json::json;
use signal_engine::SignalGenerator;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::circuit::{CircuitBreaker, CircuitLimits, EntryGate};
use crate::config::AppConfig;
use crate::journal::{now_iso, DecisionJournal};
use crate::ledger::PositionLedger;

pub struct Bot {
    config: AppConfig,
    broker: BrokerRestClient,
    feed: FeedClient,
    memory_store: Option<HttpMemoryStore>,
    retriever: Option<MemoryRetriever<HttpMemoryStore>>,
    ledger: PositionLedger,
    circuit: CircuitBreaker,
    journal: DecisionJournal,
    storage_dir: PathBuf,
}

impl Bot {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let storage_dir = PathBuf::from(&config.storage_dir);

        let broker = BrokerRestClient::new(
            &config.broker.base_url,
            config.broker.use_paper,
            config.broker.request_timeout_ms,
            config.broker.max_retries,
        )?;
        let feed = FeedClient::new(
            &config.feed.base_url,
            config.feed.request_timeout_ms,
            config.feed.max_retries,
        )?;

        let (memory_store, retriever) = if config.rag.enabled {
            let store = HttpMemoryStore::new(&config.rag.base_url, config.rag.request_timeout_ms)?;
            let retriever = MemoryRetriever::new(
                store.clone(),
                RetrieverConfig {
                    enabled: true,
                    n_similar_results: config.rag.n_similar_results,
                    confidence_floor: config.rag.confidence_floor,
                    max_boost: config.rag.max_boost,
                },
            );
            (Some(store), Some(retriever))
        } else {
            (None, None)
        };

        let ledger = match PositionLedger::load(storage_dir.join("ledger.json")) {
            Ok(ledger) => ledger,
            Err(Error::StateCorruption(reason)) => {
                // Local state cannot be trusted; the broker's open-position
                // list is authoritative.
                warn!(%reason, "ledger corrupt, rebuilding from broker");
                let ledger = PositionLedger::recover(storage_dir.join("ledger.json"));
                let broker_positions = broker.get_open_positions().await?;
                ledger.rebuild_from_broker(&broker_positions, Utc::now())?;
                ledger
            }
            Err(e) => return Err(e.into()),
        };

        let circuit = CircuitBreaker::load(
            CircuitLimits {
                capital: config.capital,
                daily_loss_limit_pct: config.risk.daily_loss_limit_pct,
                max_trades_per_day: config.risk.max_trades_per_day,
                max_consecutive_losses: config.risk.max_consecutive_losses,
            },
            storage_dir.join("circuit-state.json"),
            PathBuf::from(&config.kill_switch_file),
            Utc::now().date_naive(),
        );

        let mut journal = DecisionJournal::open(storage_dir.join("journal"))?;
        journal.write_event(json!({
            "ts": now_iso(),
            "kind": "bot_start",
            "use_paper": config.broker.use_paper,
            "rag_enabled": config.rag.enabled,
            "use_weekend_insights": config.trading.use_weekend_insights,
        }));
        info!("Journal path: {}", journal.dir().display());

        Ok(Self {
            config,
            broker,
            feed,
            memory_store,
            retriever,
            ledger,
            circuit,
            journal,
            storage_dir,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot running...");
        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Cycle failed: {:?}", e);
            }
            sleep(Duration::from_secs(self.config.trading.cycle_interval_secs)).await;
        }
    }

    fn insights_dir(&self) -> PathBuf {
        self.storage_dir.join("insights")
    }

    /// Active strategy parameters: static config, overridden by the latest
    /// weekend insight artifact when enabled.
    fn effective_params(&self) -> StrategyParams {
        let base = self.config.base_params();
        if !self.config.trading.use_weekend_insights {
            return base;
        }
        match InsightArtifact::load_latest(&self.insights_dir()) {
            Ok(Some(artifact)) => {
                info!(
                    generated_at = %artifact.generated_at,
                    score = artifact.simulated_score,
                    "applying weekend insight parameters"
                );
                artifact.selected_parameters
            }
            Ok(None) => base,
            Err(e) => {
                warn!(error = %e, "insight artifact unreadable, using config defaults");
                base
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let now = Utc::now();
        let today = now.date_naive();
        let gate = self.circuit.gate(today);
        let params = self.effective_params();

        self.journal.write_event(json!({
            "ts": now_iso(),
            "kind": "cycle_start",
            "open_positions": self.ledger.open_count(),
            "entries_allowed": gate.is_allowed(),
        }));
        if let EntryGate::Blocked(ref reason) = gate {
            self.journal.write_event(json!({
                "ts": now_iso(),
                "kind": "entries_blocked",
                "reason": reason,
            }));
        }

        // Broker truth is needed for exit pnl and reconciliation; without it
        // nothing in this cycle can act.
        let broker_positions = self.broker.get_open_positions().await?;
        let by_ticker: HashMap<&str, &common::BrokerPosition> = broker_positions
            .iter()
            .map(|p| (p.ticker.as_str(), p))
            .collect();

        // Reconcile: positions the broker no longer reports are stale.
        for position in self.ledger.open_positions() {
            if !by_ticker.contains_key(position.ticker.as_str()) {
                self.ledger.remove_stale(&position.ticker)?;
                self.journal.write_event(json!({
                    "ts": now_iso(),
                    "kind": "reconcile_drop",
                    "ticker": position.ticker,
                }));
            }
        }

        let exits = self.run_exit_pass(&params, &by_ticker, today).await;

        // Risk reduction above is always permitted; new entries go through
        // the circuit gate decided at the top of the cycle.
        let (entries, suppressed) = self.run_entry_pass(&params, &gate, today).await;

        self.journal.write_event(json!({
            "ts": now_iso(),
            "kind": "cycle_summary",
            "exits": exits,
            "entries": entries,
            "suppressed": suppressed,
            "open_positions": self.ledger.open_count(),
        }));
        Ok(())
    }

    /// Evaluate every open position independently and execute confirmed
    /// sells. Returns the number of positions closed.
    async fn run_exit_pass(
        &mut self,
        params: &StrategyParams,
        broker_positions: &HashMap<&str, &common::BrokerPosition>,
        today: chrono::NaiveDate,
    ) -> usize {
        let exit_engine = ExitRuleEngine::with_params(
            params,
            self.config.risk.min_hold_hours,
            self.config.risk.max_hold_days,
            self.config.risk.small_loss_threshold,
        );

        let mut closed = 0usize;
        for position in self.ledger.open_positions() {
            let Some(bp) = broker_positions.get(position.ticker.as_str()) else {
                continue;
            };
            let pnl_pct = bp.unrealized_pl_pct;
            let held = Utc::now() - position.entry_time;
            let decision = exit_engine.evaluate(pnl_pct, held);

            self.journal.write_event(json!({
                "ts": now_iso(),
                "kind": "exit_decision",
                "ticker": position.ticker,
                "pnl_pct": pnl_pct,
                "held_hours": held.num_hours(),
                "action": decision.action,
                "reason": decision.reason.as_str(),
            }));

            if !decision.is_sell() {
                continue;
            }

            match self.broker.close_position(&position.ticker).await {
                Ok(order_id) => {
                    let realized_pnl = pnl_pct * position.entry_notional;
                    if let Err(e) = self.ledger.close(&position.ticker) {
                        warn!(ticker = %position.ticker, error = %e, "ledger close failed");
                        continue;
                    }
                    if let Err(e) = self.circuit.record_close(realized_pnl, today) {
                        warn!(error = %e, "failed to record close in circuit state");
                    }
                    closed += 1;
                    info!(
                        ticker = %position.ticker,
                        reason = decision.reason.as_str(),
                        pnl_pct,
                        "position closed"
                    );
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "exit_filled",
                        "ticker": position.ticker,
                        "order_id": order_id,
                        "reason": decision.reason.as_str(),
                        "realized_pnl": realized_pnl,
                    }));
                }
                Err(e) => {
                    // The position stays tracked and the exit is retried on
                    // the next cycle; never silently abandoned.
                    warn!(ticker = %position.ticker, error = %e, "exit failed, will retry next cycle");
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "exit_retry_pending",
                        "ticker": position.ticker,
                        "reason": decision.reason.as_str(),
                        "error": e.to_string(),
                    }));
                }
            }
        }
        closed
    }

    /// Generate, adjust, rank, and (gate permitting) submit new entries.
    /// Returns (entries submitted, buys suppressed by memory).
    async fn run_entry_pass(
        &mut self,
        params: &StrategyParams,
        gate: &EntryGate,
        today: chrono::NaiveDate,
    ) -> (usize, usize) {
        let now = Utc::now();
        let mut snapshots: Vec<TickerSnapshot> = Vec::new();
        for ticker in &self.config.universe {
            if !params.allows_ticker(ticker) {
                continue;
            }
            match self.feed.fetch_signals(ticker).await {
                Ok(snap) => snapshots.push(snap),
                Err(Error::DataUnavailable(reason)) => {
                    warn!(ticker = %ticker, %reason, "feed data unavailable, skipping ticker");
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "feed error, skipping ticker");
                }
            }
        }

        let volatility: HashMap<String, Option<f64>> = snapshots
            .iter()
            .map(|s| (s.ticker.clone(), s.volatility))
            .collect();

        let generator = SignalGenerator::new(
            params.buy_threshold,
            self.config.trading.sentiment_weight,
            self.config.trading.momentum_weight,
            self.config.trading.max_positions,
        );
        let mut signals = generator.generate(&snapshots, now);

        let mut suppressed = 0usize;
        if let Some(retriever) = &self.retriever {
            for signal in signals.iter_mut() {
                let vol = volatility.get(&signal.ticker).copied().flatten();
                let adjustment = retriever.adjust(signal, vol).await;
                if adjustment.suppressed {
                    suppressed += 1;
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "signal_suppressed",
                        "ticker": adjustment.ticker,
                        "win_fraction": adjustment.win_fraction,
                        "mean_similarity": adjustment.mean_similarity,
                    }));
                } else if adjustment.boost != 0.0 {
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "signal_boosted",
                        "ticker": adjustment.ticker,
                        "boost": adjustment.boost,
                    }));
                }
            }
        }

        let ranked = generator.rank_and_admit(signals, &self.ledger.open_tickers());

        if !gate.is_allowed() {
            return (0, suppressed);
        }

        let mut entries = 0usize;
        for signal in ranked.iter().filter(|s| s.is_buy()) {
            let notional = self.config.capital
                * self.config.trading.max_alloc_per_trade
                * params.position_size_multiplier;

            match self
                .broker
                .submit_order(&signal.ticker, Side::Buy, notional)
                .await
            {
                Ok(order_id) => {
                    let position = Position {
                        ticker: signal.ticker.clone(),
                        entry_time: now,
                        entry_notional: notional,
                        entry_price: None,
                        order_id: order_id.clone(),
                        status: PositionStatus::Open,
                    };
                    if let Err(e) = self.ledger.record_entry(position) {
                        warn!(ticker = %signal.ticker, error = %e, "ledger entry failed");
                        continue;
                    }
                    if let Err(e) = self.circuit.record_entry(today) {
                        warn!(error = %e, "failed to record entry in circuit state");
                    }
                    entries += 1;
                    info!(
                        ticker = %signal.ticker,
                        composite = signal.composite_score,
                        notional,
                        "entry submitted"
                    );
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "entry_submitted",
                        "ticker": signal.ticker,
                        "order_id": order_id,
                        "notional": notional,
                        "composite_score": signal.composite_score,
                        "sentiment_only": signal.sentiment_only(),
                    }));
                }
                Err(e) => {
                    warn!(ticker = %signal.ticker, error = %e, "order failed");
                    self.journal.write_event(json!({
                        "ts": now_iso(),
                        "kind": "entry_failed",
                        "ticker": signal.ticker,
                        "error": e.to_string(),
                    }));
                }
            }
        }
        (entries, suppressed)
    }

    /// Weekend batch job: search the hypothesis space over a read-only
    /// historical snapshot and publish a new insight artifact. Never touches
    /// the ledger or circuit state.
    pub async fn run_exploration(&mut self) -> Result<()> {
        let history_path = self.storage_dir.join("history.jsonl");
        let history = HistoricalSnapshot::load(&history_path)?;
        if history.len() < 10 {
            warn!(
                records = history.len(),
                "need at least 10 historical signals for exploration"
            );
            return Ok(());
        }

        let search_config = SearchConfig {
            max_depth: self.config.hypothesis.max_depth,
            beam_width: self.config.hypothesis.beam_width,
            improvement_epsilon: self.config.hypothesis.improvement_epsilon,
            max_evaluations: self.config.hypothesis.max_evaluations,
        };
        let search = HypothesisSearch::new(search_config, &history);
        let outcome = search.run(self.effective_params());

        let artifact = InsightArtifact::from_outcome(&outcome, Utc::now());
        let path = artifact.write_atomic(&self.insights_dir())?;
        info!(path = %path.display(), score = outcome.best_score, "insight artifact written");

        self.journal.write_event(json!({
            "ts": now_iso(),
            "kind": "exploration_complete",
            "nodes_evaluated": outcome.nodes_evaluated,
            "best_score": outcome.best_score,
            "baseline_score": outcome.baseline_score,
            "timed_out": outcome.timed_out,
            "path": outcome.path,
        }));

        // Seed the memory store with the run summary so future cycles can
        // retrieve it; the outcome label is filled in once trades resolve.
        if let Some(store) = &self.memory_store {
            let record = MemoryRecord {
                source_text: outcome.rationale.clone(),
                scope: "market".into(),
                observed_at: Utc::now(),
                outcome: OutcomeLabel::Unlabeled,
            };
            if let Err(e) = store.store(record).await {
                warn!(error = %e, "failed to store exploration summary in memory");
            }
        }

        Ok(())
    }
}
