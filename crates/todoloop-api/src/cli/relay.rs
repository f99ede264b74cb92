//! `todoloop relay`: drain the outbox onto the in-process event bus.
//!
//! A subscriber task prints every delivered event, so the bus always has a
//! listener while the relay runs.

use anyhow::Result;
use console::style;
use todoloop_core::event::EventBus;
use todoloop_core::outbox::{OutboxRelay, RelayReport};
use todoloop_types::outbox::DomainEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

const BUS_CAPACITY: usize = 1024;

pub async fn run_relay(state: &AppState, once: bool, json: bool) -> Result<()> {
    let bus = EventBus::new(BUS_CAPACITY);
    let printer = tokio::spawn(print_events(bus.subscribe(), json));
    let relay = OutboxRelay::new(state.uow.clone(), bus, state.config.outbox.clone());

    if once {
        let report = relay.execute().await?;
        drop(relay);
        let _ = printer.await;
        print_report(&report, json)?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    if !json {
        println!(
            "  {} Relaying every {} ms (Ctrl-C to stop)",
            style("▶").green().bold(),
            state.config.outbox.poll_interval_ms
        );
    }
    relay.run(cancel).await;
    drop(relay);
    let _ = printer.await;
    Ok(())
}

/// Prints events until the bus closes.
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<DomainEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                    }
                } else {
                    println!(
                        "  {} {} {} message {} in {}",
                        style("•").cyan(),
                        style(event.event_type).bold(),
                        event.role,
                        event.chat_message_id,
                        style(event.conversation_id).dim()
                    );
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged behind the bus");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_report(report: &RelayReport, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "claimed": report.claimed,
            "published": report.published,
            "retried": report.retried,
            "failed": report.failed,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} claimed, {} published, {} retried, {} failed",
        style(report.claimed).bold(),
        style(report.published).green(),
        style(report.retried).yellow(),
        style(report.failed).red()
    );
    println!();
    Ok(())
}
