use delugemux_transport::{ConnectConfig, Endpoint};
use tracing::info;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::mux::EventHandler;

/// Connect to a daemon with default settings and start the driver.
pub async fn connect(endpoint: &Endpoint) -> Result<Client> {
    connect_with_config(
        endpoint,
        &ConnectConfig::default(),
        ClientConfig::default(),
        None,
    )
    .await
}

/// Connect with explicit configuration.
pub async fn connect_with_config(
    endpoint: &Endpoint,
    connect_config: &ConnectConfig,
    client_config: ClientConfig,
    on_event: Option<EventHandler>,
) -> Result<Client> {
    let stream = delugemux_transport::connect(endpoint, connect_config).await?;
    info!(
        endpoint = %endpoint,
        peer = %stream.peer_description(),
        "connected"
    );
    Ok(Client::start_with_event_handler(
        stream,
        client_config,
        on_event,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use delugemux_frame::{decode_request, encode_response, FrameConfig, Response, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::RpcError;

    #[tokio::test]
    async fn connect_convenience() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let config = FrameConfig::default();
            let mut wire = Vec::new();
            let request = loop {
                let mut buf = [0u8; 512];
                let n = socket.read(&mut buf).await.unwrap();
                wire.extend_from_slice(&buf[..n]);
                if let Some((_, request)) = decode_request(&wire, &config).unwrap() {
                    break request;
                }
            };
            let reply = encode_response(&Response::Result {
                tag: request.tag,
                value: Value::from(request.method),
            })
            .unwrap();
            socket.write_all(&reply).await.unwrap();
        });

        let client = connect(&Endpoint::tcp("127.0.0.1", port)).await.unwrap();
        let value = client
            .request("daemon.get_method_list", vec![], BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(value, Value::from("daemon.get_method_list"));

        daemon.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect(&Endpoint::tcp("127.0.0.1", port)).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }
}
