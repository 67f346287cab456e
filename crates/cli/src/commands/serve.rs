//! `turnstile serve` — Start the HTTP gateway.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use turnstile_agent::{IterationLoop, LoopSettings, ReplayExecutor, ReplayScript, SessionSetup};
use turnstile_billing::QuotaLedger;
use turnstile_config::AppConfig;
use turnstile_core::{DomainEvent, EventBus};
use turnstile_gateway::GatewayState;
use turnstile_store::SessionSeed;

use super::open_store;

pub async fn run(
    script: PathBuf,
    log: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let seed = log.as_deref().map(SessionSeed::load).transpose()?;
    let stores = open_store(&config, seed.as_ref()).await?;

    let executor =
        ReplayExecutor::new(ReplayScript::load(&script)?).with_writer(stores.writer.clone());

    let event_bus = Arc::new(EventBus::default());
    tokio::spawn(log_events(event_bus.subscribe()));

    let runner = IterationLoop::new(
        Arc::new(QuotaLedger::from_config(&config.billing)),
        stores.log.clone(),
        Arc::new(executor),
    )
    .with_settings(LoopSettings::from_config(&config))
    .with_event_bus(event_bus);

    let setup = SessionSetup::new(stores.resolver.clone()).with_capabilities(config.capabilities());

    println!("🚦 Turnstile Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", stores.log.name());
    println!("   Billing:   {}", if config.billing.enabled { "enabled" } else { "disabled" });

    turnstile_gateway::start(Arc::new(GatewayState {
        config,
        setup,
        runner,
    }))
    .await?;

    Ok(())
}

/// Log domain events until the bus closes. Lagging only skips events.
async fn log_events(mut events: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(?event, "Domain event"),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log fell behind, skipping events")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started(iteration: u32) -> DomainEvent {
        DomainEvent::TurnStarted {
            thread_id: "t-1".into(),
            iteration,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn event_logger_survives_lag_and_stops_on_close() {
        let bus = EventBus::new(2);
        let events = bus.subscribe();
        for i in 0..10 {
            bus.publish(started(i));
        }
        drop(bus);

        tokio::time::timeout(std::time::Duration::from_secs(5), log_events(events))
            .await
            .unwrap();
    }
}
