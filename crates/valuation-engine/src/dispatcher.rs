use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use valuation_core::{
    FinancialDataProvider, ModelId, Sector, ValuationContext, ValuationModel, ValuationResult,
};

use crate::models::{
    BankingExcessReturnsModel, ConservativeDcfModel, EvEbitdaModel, ItEvRevenueModel,
    PeMultipleModel, RealEstateNavModel, StandardFcffDcfModel,
};

/// Comparison models selectable for every sector, after the primary.
const ALTERNATES: [ModelId; 4] = [
    ModelId::StandardFcffDcf,
    ModelId::PeMultiple,
    ModelId::EvEbitda,
    ModelId::ConservativeDcf,
];

/// Routes a sector to its models and runs them with failure containment.
pub struct ModelDispatcher {
    models: HashMap<ModelId, Arc<dyn ValuationModel>>,
}

impl ModelDispatcher {
    pub fn new(provider: Arc<dyn FinancialDataProvider>) -> Self {
        let models: Vec<Arc<dyn ValuationModel>> = vec![
            Arc::new(BankingExcessReturnsModel::new()),
            Arc::new(ItEvRevenueModel::new(provider)),
            Arc::new(RealEstateNavModel::new()),
            Arc::new(PeMultipleModel::new()),
            Arc::new(StandardFcffDcfModel::new()),
            Arc::new(EvEbitdaModel::new()),
            Arc::new(ConservativeDcfModel::new()),
        ];
        Self {
            models: models.into_iter().map(|m| (m.id(), m)).collect(),
        }
    }

    /// Replace the implementation registered for `model.id()`.
    pub fn with_model(mut self, model: Arc<dyn ValuationModel>) -> Self {
        self.models.insert(model.id(), model);
        self
    }

    pub fn primary_model(sector: Sector) -> ModelId {
        match sector {
            Sector::Bfsi => ModelId::BankingExcessReturns,
            Sector::It => ModelId::ItEvRevenue,
            Sector::RealEstate => ModelId::RealEstateNav,
            _ => ModelId::StandardFcffDcf,
        }
    }

    /// Primary model first, then every comparison model, without duplicates.
    pub fn available_models(sector: Sector) -> Vec<ModelId> {
        let primary = Self::primary_model(sector);
        std::iter::once(primary)
            .chain(ALTERNATES.into_iter().filter(|m| *m != primary))
            .collect()
    }

    /// Run `model`. Errors and panics inside the model become an error-shaped
    /// result; this never fails.
    pub async fn run(&self, model: ModelId, ctx: &ValuationContext<'_>) -> ValuationResult {
        let Some(implementation) = self.models.get(&model) else {
            tracing::error!(ticker = %ctx.ticker, model = %model, "No implementation registered");
            return ValuationResult::error(
                model,
                ctx.current_price(),
                format!("{model} is not available"),
            );
        };

        tracing::info!(
            ticker = %ctx.ticker,
            model = %model,
            sector = %ctx.sector,
            "Running valuation model"
        );
        match AssertUnwindSafe(implementation.value(ctx)).catch_unwind().await {
            Ok(Ok(result)) => {
                tracing::info!(
                    ticker = %ctx.ticker,
                    model = %model,
                    fair_value = result.fair_value,
                    confidence = result.confidence,
                    "Valuation complete"
                );
                result
            }
            Ok(Err(e)) => {
                tracing::error!(
                    ticker = %ctx.ticker,
                    model = %model,
                    error = %e,
                    "Valuation failed"
                );
                ValuationResult::error(model, ctx.current_price(), e.to_string())
            }
            Err(_) => {
                tracing::error!(ticker = %ctx.ticker, model = %model, "Valuation model panicked");
                ValuationResult::error(
                    model,
                    ctx.current_price(),
                    format!("{} failed unexpectedly", model.display_name()),
                )
            }
        }
    }
}
