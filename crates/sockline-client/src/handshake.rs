//! Connection URL building and route selection.

use std::fmt;

use bytes::Bytes;
use sockline_transport::TransportKind;
use url::Url;

use crate::error::{ClientError, Result};

/// Protocol revision sent as the `EIO` query parameter.
pub const PROTOCOL_REVISION: &str = "4";

/// One (path, transport kind) candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub kind: TransportKind,
}

impl Route {
    pub fn new(path: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Storage form: `<kind> <path>`.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(format!("{} {}", self.kind, self.path))
    }

    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let (kind, path) = text.split_once(' ')?;
        Some(Self::new(path, TransportKind::from_name(kind)?))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.path, self.kind)
    }
}

/// Candidates in trial order: every configured transport over each path, with
/// a remembered route moved to the front when it is still configured.
pub fn candidate_routes(
    paths: &[String],
    transports: &[TransportKind],
    remembered: Option<Route>,
) -> Vec<Route> {
    let mut routes: Vec<Route> = paths
        .iter()
        .flat_map(|path| transports.iter().map(move |kind| Route::new(path.clone(), *kind)))
        .collect();
    if let Some(remembered) = remembered {
        if let Some(pos) = routes.iter().position(|route| *route == remembered) {
            let route = routes.remove(pos);
            routes.insert(0, route);
        }
    }
    routes
}

/// Build the URL for opening `kind` on `path`.
///
/// The persistent kind uses `ws`/`wss`, the polling kind `http`/`https`.
pub fn build_open_url(
    base: &Url,
    path: &str,
    kind: TransportKind,
    sid: Option<&str>,
    query: &[(String, String)],
) -> Result<Url> {
    let mut url = base.clone();
    let secure = matches!(base.scheme(), "https" | "wss");
    let scheme = match (kind, secure) {
        (TransportKind::WebSocket, false) => "ws",
        (TransportKind::WebSocket, true) => "wss",
        (TransportKind::Polling, false) => "http",
        (TransportKind::Polling, true) => "https",
    };
    url.set_scheme(scheme).map_err(|()| {
        ClientError::InvalidConfig(format!("cannot use scheme '{scheme}' for {base}"))
    })?;
    url.set_path(path);

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("EIO", PROTOCOL_REVISION);
        pairs.append_pair("transport", kind.as_str());
        if let Some(sid) = sid {
            pairs.append_pair("sid", sid);
        }
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_rewrites_scheme() {
        let base = Url::parse("https://chat.local:8443").unwrap();
        let url = build_open_url(
            &base,
            "/socket.io/",
            TransportKind::WebSocket,
            None,
            &[("room".to_string(), "lobby".to_string())],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://chat.local:8443/socket.io/?EIO=4&transport=websocket&room=lobby"
        );
    }

    #[test]
    fn test_polling_url_carries_sid() {
        let base = Url::parse("ws://chat.local").unwrap();
        let url = build_open_url(&base, "/rt", TransportKind::Polling, Some("abc"), &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://chat.local/rt?EIO=4&transport=polling&sid=abc"
        );
    }

    #[test]
    fn test_candidates_try_each_transport_per_path() {
        let routes = candidate_routes(
            &["/a".to_string(), "/b".to_string()],
            &[TransportKind::WebSocket, TransportKind::Polling],
            None,
        );
        assert_eq!(
            routes,
            vec![
                Route::new("/a", TransportKind::WebSocket),
                Route::new("/a", TransportKind::Polling),
                Route::new("/b", TransportKind::WebSocket),
                Route::new("/b", TransportKind::Polling),
            ]
        );
    }

    #[test]
    fn test_remembered_route_goes_first() {
        let remembered = Route::from_bytes(&Route::new("/b", TransportKind::Polling).to_bytes());
        let routes = candidate_routes(
            &["/a".to_string(), "/b".to_string()],
            &[TransportKind::WebSocket, TransportKind::Polling],
            remembered,
        );
        assert_eq!(routes[0], Route::new("/b", TransportKind::Polling));
        assert_eq!(routes.len(), 4);

        let stale = Some(Route::new("/gone", TransportKind::Polling));
        let routes = candidate_routes(&["/a".to_string()], &[TransportKind::Polling], stale);
        assert_eq!(routes, vec![Route::new("/a", TransportKind::Polling)]);
        assert!(Route::from_bytes(b"carrier-pigeon /a").is_none());
    }
}
