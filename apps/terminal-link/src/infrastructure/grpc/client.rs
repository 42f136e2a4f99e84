//! gRPC client for the terminal gateway.
//!
//! Implements [`SessionConnector`] and [`TerminalPort`] over a single lazily
//! connected tonic channel. Each method is one raw attempt; retrying lives in
//! the application services.

use async_trait::async_trait;
use futures::StreamExt;
use tonic::Status;
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::config::GatewayConfig;
use super::error::ChannelError;
use super::messages::{
    ConnectExRequest, ConnectReply, ConnectRequest, DisconnectReply, DisconnectRequest,
    ModifyReply, OnSymbolTickRequest, OnTradeRequest, PositionModifyRequest, PositionReply,
    PositionRequest, SymbolRequest, TickEventReply, TickReply, TradeEventReply, VolumeReply,
    into_reply, modify_reply, wire_price,
};
use crate::application::ports::{
    GatewayError, PositionModify, RawReply, RemoteStream, SessionConnector, SessionHeaders,
    TerminalPort,
};
use crate::domain::market::{PositionSnapshot, Tick, TradeEvent};
use crate::domain::session::{Addressing, SessionIdentity, SessionToken};
use crate::domain::volume::VolumeConstraint;

/// Fully qualified gateway method.
#[derive(Debug, Clone, Copy)]
struct Rpc {
    service: &'static str,
    method: &'static str,
    path: &'static str,
}

const CONNECT: Rpc = Rpc {
    service: "terminal.v1.Connection",
    method: "Connect",
    path: "/terminal.v1.Connection/Connect",
};
const CONNECT_EX: Rpc = Rpc {
    service: "terminal.v1.Connection",
    method: "ConnectEx",
    path: "/terminal.v1.Connection/ConnectEx",
};
const DISCONNECT: Rpc = Rpc {
    service: "terminal.v1.Connection",
    method: "Disconnect",
    path: "/terminal.v1.Connection/Disconnect",
};
const SYMBOL_INFO_TICK: Rpc = Rpc {
    service: "terminal.v1.MarketInfo",
    method: "SymbolInfoTick",
    path: "/terminal.v1.MarketInfo/SymbolInfoTick",
};
const SYMBOL_VOLUME: Rpc = Rpc {
    service: "terminal.v1.MarketInfo",
    method: "SymbolVolume",
    path: "/terminal.v1.MarketInfo/SymbolVolume",
};
const POSITION_GET: Rpc = Rpc {
    service: "terminal.v1.Trading",
    method: "PositionGet",
    path: "/terminal.v1.Trading/PositionGet",
};
const POSITION_MODIFY: Rpc = Rpc {
    service: "terminal.v1.Trading",
    method: "PositionModify",
    path: "/terminal.v1.Trading/PositionModify",
};
const ON_SYMBOL_TICK: Rpc = Rpc {
    service: "terminal.v1.Subscriptions",
    method: "OnSymbolTick",
    path: "/terminal.v1.Subscriptions/OnSymbolTick",
};
const ON_TRADE: Rpc = Rpc {
    service: "terminal.v1.Subscriptions",
    method: "OnTrade",
    path: "/terminal.v1.Subscriptions/OnTrade",
};

/// Terminal gateway client.
#[derive(Debug, Clone)]
pub struct GrpcTerminal {
    grpc: Grpc<Channel>,
    config: GatewayConfig,
}

impl GrpcTerminal {
    /// Connect lazily (connection established on first request).
    ///
    /// # Errors
    ///
    /// Returns error if endpoint configuration is invalid.
    pub fn connect_lazy(config: &GatewayConfig) -> Result<Self, ChannelError> {
        let endpoint = Self::create_endpoint(config)?;
        let channel = endpoint.connect_lazy();

        tracing::debug!(endpoint = %config.endpoint, "Created lazy channel to terminal gateway");

        Ok(Self {
            grpc: Grpc::new(channel),
            config: config.clone(),
        })
    }

    /// Gateway settings this client was built from.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Create a configured endpoint from the config.
    fn create_endpoint(config: &GatewayConfig) -> Result<Endpoint, ChannelError> {
        let mut endpoint = Channel::from_shared(config.endpoint.clone())
            .map_err(|e| ChannelError::InvalidConfig {
                message: format!("invalid endpoint: {e}"),
            })?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .tcp_keepalive(Some(config.tcp_keepalive))
            .http2_keep_alive_interval(config.http2_keepalive_interval)
            .keep_alive_timeout(config.keepalive_timeout)
            .keep_alive_while_idle(true)
            .tcp_nodelay(true);

        if config.uses_tls() {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }

        Ok(endpoint)
    }

    async fn unary<Req, Reply>(
        &self,
        rpc: Rpc,
        headers: SessionHeaders,
        message: Req,
    ) -> Result<Reply, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Reply: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("gateway not ready: {e}")))?;

        let mut request = headers.into_request(message)?;
        request
            .extensions_mut()
            .insert(tonic::GrpcMethod::new(rpc.service, rpc.method));

        let codec = tonic_prost::ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(rpc.path), codec)
            .await?;
        Ok(response.into_inner())
    }

    async fn server_streaming<Req, Reply>(
        &self,
        rpc: Rpc,
        headers: SessionHeaders,
        message: Req,
    ) -> Result<tonic::Streaming<Reply>, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Reply: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("gateway not ready: {e}")))?;

        let mut request = headers.into_request(message)?;
        request
            .extensions_mut()
            .insert(tonic::GrpcMethod::new(rpc.service, rpc.method));

        let codec = tonic_prost::ProstCodec::default();
        let response = grpc
            .server_streaming(request, PathAndQuery::from_static(rpc.path), codec)
            .await?;
        Ok(response.into_inner())
    }
}

fn wait_seconds(identity: &SessionIdentity) -> u32 {
    u32::try_from(identity.readiness_timeout.as_secs()).unwrap_or(u32::MAX)
}

fn session_token(reply: ConnectReply) -> RawReply<SessionToken> {
    into_reply(reply.data, reply.error, |data| {
        SessionToken::new(data.session_id)
            .map_err(|e| Status::internal(format!("gateway returned an unusable session: {e}")))
    })
}

#[async_trait]
impl SessionConnector for GrpcTerminal {
    async fn connect(&self, identity: &SessionIdentity) -> Result<SessionToken, GatewayError> {
        let headers = SessionHeaders::default();
        let reply: ConnectReply = match &identity.addressing {
            Addressing::Direct { host, port } => {
                let request = ConnectRequest {
                    user: identity.credentials.login(),
                    password: identity.credentials.password().to_string(),
                    host: host.clone(),
                    port: u32::from(*port),
                    base_chart_symbol: identity.chart_symbol.clone(),
                    wait_timeout_seconds: wait_seconds(identity),
                };
                self.unary(CONNECT, headers, request).await?
            }
            Addressing::Cluster { name } => {
                let request = ConnectExRequest {
                    user: identity.credentials.login(),
                    password: identity.credentials.password().to_string(),
                    cluster_name: name.clone(),
                    base_chart_symbol: identity.chart_symbol.clone(),
                    wait_timeout_seconds: wait_seconds(identity),
                };
                self.unary(CONNECT_EX, headers, request).await?
            }
        };

        Ok(session_token(reply)??)
    }

    async fn disconnect(&self, token: &SessionToken) -> Result<(), GatewayError> {
        let headers = SessionHeaders::new(Some(token.clone()));
        let reply: DisconnectReply = self.unary(DISCONNECT, headers, DisconnectRequest {}).await?;
        into_reply(Some(reply.data), reply.error, |_| Ok(()))??;
        Ok(())
    }
}

#[async_trait]
impl TerminalPort for GrpcTerminal {
    async fn symbol_tick(&self, headers: SessionHeaders, symbol: &str) -> RawReply<Tick> {
        let request = SymbolRequest {
            symbol: symbol.to_string(),
        };
        let reply: TickReply = self.unary(SYMBOL_INFO_TICK, headers, request).await?;
        into_reply(reply.data, reply.error, Tick::try_from)
    }

    async fn symbol_volume(
        &self,
        headers: SessionHeaders,
        symbol: &str,
    ) -> RawReply<VolumeConstraint> {
        let request = SymbolRequest {
            symbol: symbol.to_string(),
        };
        let reply: VolumeReply = self.unary(SYMBOL_VOLUME, headers, request).await?;
        into_reply(reply.data, reply.error, VolumeConstraint::try_from)
    }

    async fn position(&self, headers: SessionHeaders, ticket: u64) -> RawReply<PositionSnapshot> {
        let reply: PositionReply = self
            .unary(POSITION_GET, headers, PositionRequest { ticket })
            .await?;
        into_reply(reply.data, reply.error, PositionSnapshot::try_from)
    }

    async fn modify_position(
        &self,
        headers: SessionHeaders,
        change: PositionModify,
    ) -> RawReply<()> {
        let request = PositionModifyRequest {
            ticket: change.ticket,
            stop_loss: change.stop_loss.map(wire_price).transpose()?,
            take_profit: change.take_profit.map(wire_price).transpose()?,
        };
        let reply: ModifyReply = self.unary(POSITION_MODIFY, headers, request).await?;
        if let Some(data) = &reply.data {
            tracing::debug!(
                ticket = change.ticket,
                retcode = data.retcode,
                comment = %data.comment,
                "Position modify reply"
            );
        }
        modify_reply(reply)
    }

    async fn subscribe_ticks(
        &self,
        headers: SessionHeaders,
        symbols: Vec<String>,
    ) -> Result<RemoteStream<Tick>, Status> {
        let stream = self
            .server_streaming::<_, TickEventReply>(
                ON_SYMBOL_TICK,
                headers,
                OnSymbolTickRequest { symbols },
            )
            .await?;

        Ok(Box::pin(stream.map(|item| {
            item.and_then(|reply| into_reply(reply.data, reply.error, Tick::try_from))
        })))
    }

    async fn subscribe_trades(
        &self,
        headers: SessionHeaders,
    ) -> Result<RemoteStream<TradeEvent>, Status> {
        let stream = self
            .server_streaming::<_, TradeEventReply>(ON_TRADE, headers, OnTradeRequest {})
            .await?;

        Ok(Box::pin(stream.map(|item| {
            item.and_then(|reply| {
                into_reply(reply.data, reply.error, |data| Ok(TradeEvent::from(data)))
            })
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::super::messages::ConnectData;
    use super::*;

    #[tokio::test]
    async fn lazy_connect_accepts_plain_endpoint() {
        let client = GrpcTerminal::connect_lazy(&GatewayConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let result = GrpcTerminal::create_endpoint(&GatewayConfig::new("not a uri"));
        assert!(matches!(result, Err(ChannelError::InvalidConfig { .. })));
    }

    #[test]
    fn rpc_paths_match_service_and_method() {
        for rpc in [
            CONNECT,
            CONNECT_EX,
            DISCONNECT,
            SYMBOL_INFO_TICK,
            SYMBOL_VOLUME,
            POSITION_GET,
            POSITION_MODIFY,
            ON_SYMBOL_TICK,
            ON_TRADE,
        ] {
            assert_eq!(rpc.path, format!("/{}/{}", rpc.service, rpc.method));
        }
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let reply = ConnectReply {
            data: Some(ConnectData {
                session_id: String::new(),
            }),
            error: None,
        };
        assert!(session_token(reply).is_err());
    }
}
