use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_payment(payment_status: &'static str, applied: Decimal, surplus: Decimal) {
    metrics::counter!("payments_applied_total", "payment_status" => payment_status).increment(1);
    metrics::histogram!("payment_amount").record(applied.to_f64().unwrap_or_default());
    if surplus > Decimal::ZERO {
        metrics::counter!("payment_surplus_total").increment(1);
    }
}

pub(crate) fn record_quiz_attempt(outcome: &'static str) {
    metrics::counter!("quiz_attempts_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_daily_lockout() {
    metrics::counter!("daily_lockouts_total").increment(1);
}

pub(crate) fn record_compliance_session(event: &'static str) {
    metrics::counter!("compliance_sessions_total", "event" => event).increment(1);
}
