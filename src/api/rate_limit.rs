use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::constants::UNKNOWN_CLIENT;

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config().security.rate_limit.enabled {
        return next.run(request).await;
    }

    let client = client_address(&request, &state.config().server.trusted_proxy_ips);

    match state.rate_limiter().check(&client) {
        Ok(_) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// The socket peer, or the first `X-Forwarded-For` hop when the peer is a
/// trusted proxy.
fn client_address(request: &Request, trusted_proxies: &[String]) -> String {
    let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>() else {
        return UNKNOWN_CLIENT.to_string();
    };
    let peer_ip = peer.ip();

    if is_trusted(peer_ip, trusted_proxies)
        && let Some(forwarded) = forwarded_for(request)
    {
        return forwarded.to_string();
    }

    peer_ip.to_string()
}

fn is_trusted(ip: IpAddr, trusted_proxies: &[String]) -> bool {
    trusted_proxies
        .iter()
        .filter_map(|p| p.trim().parse::<IpAddr>().ok())
        .any(|p| p == ip)
}

fn forwarded_for(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}
