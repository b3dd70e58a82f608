use std::collections::BTreeMap;
use std::sync::Arc;

use delugemux_frame::{Event, Value};
use delugemux_rpc::EventHandler;
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{EventsArgs, Session};
use crate::exit::{rpc_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::print_event;

pub async fn run(args: EventsArgs, session: &Session) -> CliResult<i32> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |event: Event| {
        let _ = tx.send(event);
    });
    let mut client = session.connect(Some(handler)).await?;

    if !args.register.is_empty() {
        let names = args
            .register
            .iter()
            .map(|name| Value::from(name.as_str()))
            .collect();
        client
            .request(
                "daemon.set_event_interest",
                vec![Value::List(names)],
                BTreeMap::new(),
            )
            .await
            .map_err(|err| rpc_error("event registration failed", err))?;
        info!(events = ?args.register, "registered event interest");
    }

    let mut printed = 0usize;
    let outcome = loop {
        if args.count.is_some_and(|count| printed >= count) {
            break Ok(SUCCESS);
        }
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(event) => {
                    print_event(&event, session.format);
                    printed += 1;
                }
                None => break Ok(SUCCESS),
            },
            _ = client.closed() => {
                let reason = client.close_reason().unwrap_or_default();
                break Err(CliError::new(FAILURE, format!("connection closed: {reason}")));
            }
            _ = tokio::signal::ctrl_c() => break Ok(SUCCESS),
        }
    };

    client.close().await;
    outcome
}
