use crate::{
    config::BinanceConfig,
    exchange::binance::EVENT_TYPE_AGG_TRADE,
    feed::{FeedEvent, LiveFeed},
    streams::IdleTimeout,
    trade::Market,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Reconnecting Binance `<symbol>@aggTrade` WebSocket subscription.
#[derive(Clone, Debug, Default)]
pub struct BinanceLiveFeed {
    config: BinanceConfig,
}

impl BinanceLiveFeed {
    pub fn new(config: BinanceConfig) -> Self {
        Self { config }
    }
}

impl LiveFeed for BinanceLiveFeed {
    fn subscribe(&self, market: &Market) -> mpsc::Receiver<FeedEvent> {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size);
        let url = stream_url(&self.config.ws_base_url, market);
        let config = self.config.clone();
        let market = market.clone();

        tokio::spawn(async move {
            run_websocket_loop(config, url, market, event_tx).await;
        });

        event_rx
    }
}

/// Stream url for a market, eg/ `wss://stream.binance.com:9443/ws/xlmbtc@aggTrade`.
pub fn stream_url(ws_base_url: &str, market: &Market) -> String {
    format!(
        "{}/{}@{}",
        ws_base_url.trim_end_matches('/'),
        market.symbol.to_ascii_lowercase(),
        EVENT_TYPE_AGG_TRADE
    )
}

/// Connection loop with auto-reconnect. Returns once the event receiver is dropped, which
/// also closes any open connection.
async fn run_websocket_loop(
    config: BinanceConfig,
    url: String,
    market: Market,
    event_tx: mpsc::Sender<FeedEvent>,
) {
    info!(%market, %url, "starting Binance aggTrade subscription");

    'subscription: loop {
        let connected = tokio::select! {
            biased;
            _ = event_tx.closed() => break 'subscription,
            connected = connect_async(url.as_str()) => connected,
        };

        match connected {
            Ok((ws_stream, _)) => {
                info!(%market, "connected to Binance aggTrade stream");

                let mut stream = IdleTimeout::new(ws_stream, config.read_timeout);
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = event_tx.closed() => break 'subscription,
                        message = stream.next() => message,
                    };

                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let event = FeedEvent::Message(text.as_str().to_owned());
                            if event_tx.send(event).await.is_err() {
                                break 'subscription;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(%market, ?frame, "Binance closed connection");
                            break;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            // Heartbeats are answered by tungstenite
                        }
                        Some(Ok(other)) => {
                            debug!(%market, ?other, "ignoring non text frame");
                        }
                        Some(Err(error)) => {
                            error!(%market, %error, "WebSocket error");
                            break;
                        }
                        None if stream.timed_out() => {
                            warn!(%market, "Binance stream went silent");
                            break;
                        }
                        None => break,
                    }
                }
            }
            Err(error) => {
                error!(%market, %url, %error, "failed to connect");
            }
        }

        if event_tx.send(FeedEvent::Reconnecting).await.is_err() {
            break;
        }

        warn!(
            %market,
            delay = ?config.reconnect_delay,
            "connection lost, reconnecting after delay"
        );
        tokio::select! {
            biased;
            _ = event_tx.closed() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    debug!(%market, "feed receiver dropped, stopping subscription");
}
