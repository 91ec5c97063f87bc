use std::sync::Arc;

use anyhow::{bail, Context, Result};
use valuation_client::ValuationApiClient;
use valuation_core::ModelId;
use valuation_orchestrator::{OrchestratorConfig, ValuationOrchestrator};

const USAGE: &str = "usage: valuation-cli <TICKER> [SECTOR] [--model <id>] [--insights]";

struct Args {
    ticker: String,
    sector: Option<String>,
    model: Option<ModelId>,
    insights: bool,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let mut model = None;
    let mut insights = false;

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--model" => {
                let id = raw.next().context("--model needs a value")?;
                model = Some(ModelId::parse(&id).with_context(|| format!("unknown model '{id}'"))?);
            }
            "--insights" => insights = true,
            _ if arg.starts_with("--") => bail!("unknown flag '{arg}'\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(ticker) = positional.next() else {
        bail!(USAGE);
    };
    Ok(Args {
        ticker,
        sector: positional.next(),
        model,
        insights,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }

    let args = parse_args(std::env::args().skip(1))?;
    let config = OrchestratorConfig::from_env()?;
    let client = Arc::new(ValuationApiClient::with_defaults()?);
    tracing::info!(base_url = %client.base_url(), "Valuation backend");

    let orchestrator = ValuationOrchestrator::new(client.clone(), client.clone(), client, config);
    let session = orchestrator.open_session(&args.ticker, args.sector.as_deref()).await;

    let outcome = match args.model {
        Some(model) if model != session.active_model().await => {
            orchestrator.switch_model(model).await?
        }
        _ => orchestrator.refresh().await?,
    };
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if args.insights {
        let insights = orchestrator.request_insights().await?;
        if insights.offline {
            tracing::warn!("Insight service unavailable, showing offline summary");
        }
        println!("{}", serde_json::to_string_pretty(&insights)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args> {
        parse_args(raw.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["TCS", "Information Technology", "--insights"]).unwrap();
        assert_eq!(parsed.ticker, "TCS");
        assert_eq!(parsed.sector.as_deref(), Some("Information Technology"));
        assert!(parsed.insights);
        assert!(parsed.model.is_none());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&[]).is_err());
        assert!(args(&["TCS", "--model"]).is_err());
        assert!(args(&["TCS", "--model", "nonsense"]).is_err());
        assert!(args(&["TCS", "--verbose"]).is_err());
    }
}
