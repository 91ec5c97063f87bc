use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use valuation_core::{
    AssumptionDefaultsProvider, CapitalIntensityProfile, DCFAssumptions, DataQuality,
    FinancialDataProvider, FinancialDataSet, InsightContext, InsightsPayload, InsightsProvider,
    ModelId, ValuationContext, ValuationError, ValuationResult,
};
use valuation_engine::{classify, CapitalIntensityEstimator, GrowthNormalizer, ModelDispatcher};

use crate::assumptions::AssumptionBuilder;
use crate::config::OrchestratorConfig;
use crate::insights::synthesize_offline;
use crate::session::{Session, SessionInputs, SessionState};

/// Replace the capital-intensity ratios in `a` and re-run the peak-cycle
/// check against them.
fn with_capital_intensity(
    mut a: DCFAssumptions,
    capital: &CapitalIntensityProfile,
) -> DCFAssumptions {
    a.capex_percentage = capital.capex_pct;
    a.working_capital_percentage = capital.working_capital_pct;
    a.depreciation_percentage = capital.depreciation_pct;
    let decision = GrowthNormalizer::detect(
        a.revenue_growth_rate,
        a.capex_percentage,
        a.depreciation_percentage,
        a.terminal_growth_rate,
    );
    GrowthNormalizer::apply(&mut a, &decision);
    a
}

/// Who asked for a recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Ticker load, automatic refresh. Charged to the cost budget.
    System,
    /// Assumption edits and model-tab switches. Always permitted.
    User,
    /// Explicit reset to defaults. Always permitted.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum CalculationOutcome {
    Completed(ValuationResult),
    /// Another calculation held the lock; nothing was computed.
    Dropped,
    /// Cost budget exhausted; computed with sector-default capital intensity.
    Blocked(ValuationResult),
    /// A later edit or a ticker change replaced this request.
    Superseded,
}

impl CalculationOutcome {
    pub fn result(&self) -> Option<&ValuationResult> {
        match self {
            CalculationOutcome::Completed(r) | CalculationOutcome::Blocked(r) => Some(r),
            CalculationOutcome::Dropped | CalculationOutcome::Superseded => None,
        }
    }
}

/// Where an insight payload came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightOutcome {
    pub insights: InsightsPayload,
    pub offline: bool,
}

pub struct ValuationOrchestrator {
    data: Arc<dyn FinancialDataProvider>,
    defaults: Arc<dyn AssumptionDefaultsProvider>,
    insights: Arc<dyn InsightsProvider>,
    dispatcher: ModelDispatcher,
    config: OrchestratorConfig,
    session: RwLock<Option<Arc<Session>>>,
}

impl ValuationOrchestrator {
    pub fn new(
        data: Arc<dyn FinancialDataProvider>,
        defaults: Arc<dyn AssumptionDefaultsProvider>,
        insights: Arc<dyn InsightsProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            dispatcher: ModelDispatcher::new(data.clone()),
            data,
            defaults,
            insights,
            config,
            session: RwLock::new(None),
        }
    }

    /// Replace the model dispatcher, e.g. to register an alternative model.
    pub fn with_dispatcher(mut self, dispatcher: ModelDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a session for `ticker`, discarding the previous one with its
    /// budget, cache and pending edits.
    pub async fn open_session(&self, ticker: &str, raw_sector: Option<&str>) -> Arc<Session> {
        let sector = classify(raw_sector);
        let primary = ModelDispatcher::primary_model(sector);
        let session = Arc::new(Session::new(
            ticker,
            sector,
            primary,
            self.config.cost_budget,
            self.config.stability_tolerance,
        ));

        let previous = self.session.write().await.replace(session.clone());
        if let Some(previous) = previous {
            tracing::info!(
                from = %previous.ticker(),
                to = %session.ticker(),
                "Ticker changed, session reset"
            );
        }
        tracing::info!(ticker = %session.ticker(), %sector, model = %primary, "Session opened");
        session
    }

    pub async fn close_session(&self) {
        if let Some(session) = self.session.write().await.take() {
            tracing::info!(ticker = %session.ticker(), "Session closed");
        }
    }

    pub async fn active_session(&self) -> Result<Arc<Session>, ValuationError> {
        self.session.read().await.clone().ok_or(ValuationError::NoActiveSession)
    }

    async fn is_current(&self, session: &Arc<Session>) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Fetch financials, market data and advisory defaults once per session.
    /// Failures degrade to empty inputs; they never abort the session.
    async fn ensure_inputs(&self, session: &Session) -> Arc<SessionInputs> {
        if let Some(inputs) = session.inputs.read().await.as_ref() {
            return inputs.clone();
        }
        session.set_state(SessionState::Fetching).await;

        let ticker = session.ticker();
        let (financials, market, advisory) = tokio::join!(
            self.data.get_financial_data(ticker, self.config.history_years),
            self.data.get_basic_company_data(ticker),
            self.defaults.get_dcf_defaults(ticker, session.sector()),
        );

        let (financials, financials_error) = match financials {
            Ok(f) => (f, None),
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "Financial data unavailable");
                (
                    FinancialDataSet {
                        ticker: ticker.to_string(),
                        ..Default::default()
                    },
                    Some(e),
                )
            }
        };
        let market = market.unwrap_or_else(|e| {
            tracing::warn!(%ticker, error = %e, "Market data unavailable");
            Default::default()
        });
        let advisory_defaults = advisory
            .map_err(|e| {
                tracing::warn!(
                    %ticker,
                    error = %e,
                    "Advisory defaults unavailable, using sector table"
                )
            })
            .ok();

        let inputs = Arc::new(SessionInputs {
            financials,
            financials_error,
            market,
            advisory_defaults,
        });
        *session.inputs.write().await = Some(inputs.clone());
        inputs
    }

    /// The session's capital-intensity profile, estimated on first use.
    async fn capital_intensity(
        &self,
        session: &Session,
        inputs: &SessionInputs,
    ) -> CapitalIntensityProfile {
        if let Some(profile) = session.capital_intensity.read().await.as_ref() {
            return profile.clone();
        }
        let fetched = match &inputs.financials_error {
            Some(e) => Err(e),
            None => Ok(&inputs.financials),
        };
        let profile = CapitalIntensityEstimator::resolve(session.sector(), fetched);
        *session.capital_intensity.write().await = Some(profile.clone());
        profile
    }

    async fn session_assumptions(
        &self,
        session: &Session,
        inputs: &SessionInputs,
        capital: &CapitalIntensityProfile,
    ) -> DCFAssumptions {
        if let Some(a) = session.assumptions.read().await.as_ref() {
            return a.clone();
        }
        let (a, rationale) = AssumptionBuilder::build(
            session.ticker(),
            session.sector(),
            inputs.advisory_defaults.as_ref(),
            &inputs.financials,
            capital,
        );
        *session.assumptions.write().await = Some(a.clone());
        *session.rationale.write().await = rationale;
        a
    }

    /// Run `model` for the active session.
    ///
    /// At most one calculation runs per session; a concurrent request is
    /// dropped. System triggers are charged to the cost budget and, once it
    /// is exhausted, produce a degraded result instead.
    pub async fn calculate(
        &self,
        model: ModelId,
        trigger: Trigger,
    ) -> Result<CalculationOutcome, ValuationError> {
        let session = self.active_session().await?;
        let Some(_guard) = session.lock.try_acquire() else {
            tracing::warn!(
                ticker = %session.ticker(),
                model = %model,
                ?trigger,
                "Calculation in progress, request dropped"
            );
            return Ok(CalculationOutcome::Dropped);
        };

        let within_budget = match trigger {
            Trigger::System => session.budget.try_charge(),
            Trigger::User | Trigger::Reset => true,
        };

        let inputs = self.ensure_inputs(&session).await;

        if !within_budget {
            tracing::warn!(
                ticker = %session.ticker(),
                model = %model,
                budget = self.config.cost_budget,
                "Cost budget exhausted, computing degraded result"
            );
            let capital = CapitalIntensityEstimator::sector_default(
                session.sector(),
                "Cost protection budget exhausted for this ticker",
            );
            let existing = session.assumptions.read().await.clone();
            let assumptions = match existing {
                Some(a) => with_capital_intensity(a, &capital),
                None => {
                    AssumptionBuilder::build(
                        session.ticker(),
                        session.sector(),
                        inputs.advisory_defaults.as_ref(),
                        &inputs.financials,
                        &capital,
                    )
                    .0
                }
            };
            session.set_state(SessionState::Computing).await;
            let mut result = self.run_model(&session, &inputs, &assumptions, model).await;

            if !self.is_current(&session).await {
                tracing::info!(
                    ticker = %session.ticker(),
                    model = %model,
                    "Session replaced during degraded calculation, result discarded"
                );
                return Ok(CalculationOutcome::Superseded);
            }
            result.reasoning.insert(
                0,
                format!(
                    "Degraded: cost protection budget of {} recalculations exhausted; \
                     {} sector-default capital intensity used",
                    self.config.cost_budget,
                    session.sector()
                ),
            );
            result
                .assumptions
                .insert("data_quality".to_string(), capital.data_quality.to_string());
            session.set_state(SessionState::Blocked).await;
            return Ok(CalculationOutcome::Blocked(result));
        }

        let capital = self.capital_intensity(&session, &inputs).await;
        let assumptions = self.session_assumptions(&session, &inputs, &capital).await;

        session.set_state(SessionState::Computing).await;
        let result = self.run_model(&session, &inputs, &assumptions, model).await;

        if !self.is_current(&session).await {
            tracing::info!(
                ticker = %session.ticker(),
                model = %model,
                "Session replaced during calculation, result discarded"
            );
            return Ok(CalculationOutcome::Superseded);
        }

        if result.is_error() {
            session.set_state(SessionState::Error).await;
        } else {
            session.fair_value.observe(result.fair_value);
            session.set_state(SessionState::Done).await;
        }
        session.store_result(result.clone());
        tracing::debug!(
            ticker = %session.ticker(),
            budget_used = session.budget_used(),
            ?trigger,
            "Calculation finished"
        );
        Ok(CalculationOutcome::Completed(result))
    }

    async fn run_model(
        &self,
        session: &Session,
        inputs: &SessionInputs,
        assumptions: &DCFAssumptions,
        model: ModelId,
    ) -> ValuationResult {
        let ctx = ValuationContext {
            ticker: session.ticker(),
            sector: session.sector(),
            financials: &inputs.financials,
            market: &inputs.market,
            assumptions,
        };
        self.dispatcher.run(model, &ctx).await
    }

    /// Calculate the session's active model on behalf of the system.
    pub async fn refresh(&self) -> Result<CalculationOutcome, ValuationError> {
        let session = self.active_session().await?;
        let model = session.active_model().await;
        self.calculate(model, Trigger::System).await
    }

    /// Accept an assumption edit. Only the last edit in a debounce window is
    /// computed; earlier ones return `Superseded`.
    pub async fn submit_edit(
        &self,
        assumptions: DCFAssumptions,
    ) -> Result<CalculationOutcome, ValuationError> {
        let session = self.active_session().await?;
        let generation = session.edit_generation.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.config.debounce).await;

        if session.edit_generation.load(Ordering::SeqCst) != generation
            || !self.is_current(&session).await
        {
            tracing::debug!(ticker = %session.ticker(), generation, "Edit superseded");
            return Ok(CalculationOutcome::Superseded);
        }

        tracing::info!(
            ticker = %session.ticker(),
            wacc = assumptions.wacc,
            terminal_growth = assumptions.terminal_growth_rate,
            "Applying assumption edit"
        );
        *session.assumptions.write().await = Some(assumptions);
        let model = session.active_model().await;
        self.calculate(model, Trigger::User).await
    }

    /// Discard edits and the active model's result, reset the budget and
    /// recompute from defaults.
    pub async fn reset_to_defaults(&self) -> Result<CalculationOutcome, ValuationError> {
        let session = self.active_session().await?;
        let model = session.active_model().await;

        session.results.remove(&model);
        *session.assumptions.write().await = None;
        session.rationale.write().await.clear();
        session.edit_generation.fetch_add(1, Ordering::SeqCst);
        session.budget.reset();
        session.fair_value.reset();
        tracing::info!(ticker = %session.ticker(), model = %model, "Assumptions reset to defaults");

        self.calculate(model, Trigger::Reset).await
    }

    /// Make `model` the active tab and compute it.
    pub async fn switch_model(&self, model: ModelId) -> Result<CalculationOutcome, ValuationError> {
        let session = self.active_session().await?;
        let previous = std::mem::replace(&mut *session.active_model.write().await, model);
        if previous != model {
            session.fair_value.reset();
            tracing::info!(
                ticker = %session.ticker(),
                from = %previous,
                to = %model,
                "Model switched"
            );
        }
        self.calculate(model, Trigger::User).await
    }

    /// Insights for the active model's latest result.
    ///
    /// Waits until the fair value has held still for the stability window,
    /// then charges one budget unit and calls the insight service once. A
    /// failed call or an exhausted budget yields an offline payload.
    pub async fn request_insights(&self) -> Result<InsightOutcome, ValuationError> {
        let session = self.active_session().await?;
        let window = self.config.insight_stability_window;

        loop {
            match session.fair_value.stable_for() {
                Some(stable) if stable >= window => break,
                Some(stable) => tokio::time::sleep(window - stable).await,
                None => {
                    return Err(ValuationError::DataUnavailable(format!(
                        "{}: no fair value computed yet",
                        session.ticker()
                    )))
                }
            }
            if !self.is_current(&session).await {
                return Err(ValuationError::NoActiveSession);
            }
        }

        let model = session.active_model().await;
        let result = session
            .cached_result(model, self.config.result_cache_ttl_secs)
            .ok_or_else(|| {
                ValuationError::DataUnavailable(format!(
                    "{}: no current result for {model}, recalculate first",
                    session.ticker()
                ))
            })?;
        let assumptions = session.assumptions().await.unwrap_or_else(|| {
            valuation_engine::sector_tables().default_assumptions(session.sector())
        });
        let capital = session.capital_intensity().await;
        let context = InsightContext {
            sector: session.sector(),
            data_quality: capital.as_ref().map_or(DataQuality::Fallback, |c| c.data_quality),
            requires_normalization: assumptions.requires_normalization,
            capital_intensity_notes: capital.map(|c| c.notes).unwrap_or_default(),
        };

        if !session.budget.try_charge() {
            tracing::warn!(
                ticker = %session.ticker(),
                "Cost budget exhausted, using offline insights"
            );
            return Ok(InsightOutcome {
                insights: synthesize_offline(&result, &assumptions, &context),
                offline: true,
            });
        }

        match self
            .insights
            .get_dcf_insights(session.ticker(), &result, &assumptions, &context)
            .await
        {
            Ok(insights) => Ok(InsightOutcome {
                insights,
                offline: false,
            }),
            Err(e) => {
                tracing::warn!(
                    ticker = %session.ticker(),
                    error = %e,
                    "Insight service failed, using offline insights"
                );
                Ok(InsightOutcome {
                    insights: synthesize_offline(&result, &assumptions, &context),
                    offline: true,
                })
            }
        }
    }
}
