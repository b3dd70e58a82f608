use std::collections::BTreeMap;

use tracing::debug;

use crate::cmd::{parse_duration, CallArgs, Session};
use crate::convert::{parse_arg, parse_kwargs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::print_value;

pub async fn run(args: CallArgs, session: &Session) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = args
        .args
        .iter()
        .map(String::as_str)
        .map(parse_arg)
        .collect::<CliResult<Vec<_>>>()?;
    let kwargs = match &args.kwargs {
        Some(json) => parse_kwargs(json)?,
        None => BTreeMap::new(),
    };

    let mut client = session.connect(None).await?;
    let pending = client
        .call(args.method.as_str(), params, kwargs)
        .map_err(|err| rpc_error("call failed", err))?;
    let tag = pending.tag();

    let result = match tokio::time::timeout(timeout, pending).await {
        Ok(reply) => reply.map_err(|err| rpc_error(&args.method, err)),
        Err(_) => {
            client.multiplexer().abandon(tag);
            Err(CliError::new(
                TIMEOUT,
                format!("{}: no reply within {timeout:?}", args.method),
            ))
        }
    };

    let stats = client.stats();
    debug!(
        tag,
        bytes_sent = stats.bytes_sent,
        bytes_received = stats.bytes_received,
        "call finished"
    );
    client.close().await;

    print_value(&result?, session.format);
    Ok(SUCCESS)
}
