//! Shared HTTP router for Handler roles.
//!
//! Every Handler role binds its path patterns here. The listener is started
//! once, after all plugins are loaded; later binds are refused.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::any;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatch::isolate::panic_message;
use crate::dispatch::{CallGuard, CallOutcome, CallSite};
use crate::error::{HttpBindError, TransportResult};
use crate::plugin::HttpFn;

struct Routes {
    router: Router,
    /// pattern → owning plugin
    owners: BTreeMap<String, String>,
}

/// Path-pattern router shared by all plugins.
pub struct HttpRouter {
    routes: Mutex<Routes>,
    started: AtomicBool,
    guard: CallGuard,
}

impl HttpRouter {
    pub fn new(guard: CallGuard) -> Self {
        Self {
            routes: Mutex::new(Routes {
                router: Router::new(),
                owners: BTreeMap::new(),
            }),
            started: AtomicBool::new(false),
            guard,
        }
    }

    /// Binds `pattern` to a plugin's handler.
    ///
    /// Patterns use the router's syntax (`/items/{id}`, `/files/{*rest}`).
    /// Requests are forwarded unmodified. A handler that panics answers
    /// `500`, one that exceeds the call timeout answers `504`.
    pub fn bind(
        &self,
        plugin: &str,
        symbol: &str,
        pattern: &str,
        handler: HttpFn,
    ) -> Result<(), HttpBindError> {
        if !pattern.starts_with('/') {
            return Err(HttpBindError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "must start with '/'".to_string(),
            });
        }

        let mut routes = self.routes.lock();
        if self.started.load(Ordering::Acquire) {
            return Err(HttpBindError::AlreadyServing(pattern.to_string()));
        }
        if let Some(owner) = routes.owners.get(pattern) {
            return Err(HttpBindError::Duplicate {
                pattern: pattern.to_string(),
                owner: owner.clone(),
            });
        }

        let guard = self.guard;
        let plugin_name = plugin.to_string();
        let symbol = symbol.to_string();
        let route = any(move |req: Request| {
            let handler = handler.clone();
            let plugin = plugin_name.clone();
            let symbol = symbol.clone();
            async move {
                let site = CallSite::new(&plugin, "handler", &symbol);
                match guard.run(site, || handler(req)).await {
                    CallOutcome::Completed(response) => response,
                    CallOutcome::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    CallOutcome::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT.into_response(),
                }
            }
        });

        // The router panics on malformed or conflicting patterns; work on a
        // copy so a refused pattern leaves the table untouched.
        let candidate = routes.router.clone();
        let router = panic::catch_unwind(AssertUnwindSafe(|| candidate.route(pattern, route)))
            .map_err(|payload| HttpBindError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: panic_message(payload.as_ref()),
            })?;

        routes.router = router;
        routes.owners.insert(pattern.to_string(), plugin.to_string());
        info!(plugin = %plugin, pattern = %pattern, "Route bound");
        Ok(())
    }

    /// Number of bound patterns.
    pub fn route_count(&self) -> usize {
        self.routes.lock().owners.len()
    }

    /// Bound patterns with their owning plugin.
    pub fn patterns(&self) -> Vec<(String, String)> {
        self.routes
            .lock()
            .owners
            .iter()
            .map(|(p, o)| (p.clone(), o.clone()))
            .collect()
    }

    pub fn is_serving(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Snapshot of the current routing table.
    pub fn router(&self) -> Router {
        self.routes.lock().router.clone()
    }

    /// Starts the listener on `addr` and returns the bound address.
    ///
    /// Returns `Ok(None)` without listening when no route is bound or the
    /// listener was already started. The server task is added to `tasks`
    /// and stops gracefully when `cancel` fires.
    pub async fn start(
        &self,
        addr: &str,
        tasks: &mut JoinSet<()>,
        cancel: CancellationToken,
    ) -> TransportResult<Option<SocketAddr>> {
        let router = {
            let routes = self.routes.lock();
            if routes.owners.is_empty() {
                info!("No HTTP routes bound, listener not started");
                return Ok(None);
            }
            if self.started.swap(true, Ordering::AcqRel) {
                warn!("HTTP listener already started");
                return Ok(None);
            }
            routes.router.clone()
        };

        let addr = normalize_listen_addr(addr);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.started.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        let local = listener.local_addr()?;
        info!(addr = %local, routes = self.route_count(), "HTTP listener started");

        tasks.spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(cancel.cancelled_owned());
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server error");
            }
            info!("HTTP listener stopped");
        });

        Ok(Some(local))
    }
}

impl std::fmt::Debug for HttpRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRouter")
            .field("patterns", &self.patterns())
            .field("serving", &self.is_serving())
            .finish()
    }
}

/// Accepts `:8080` as shorthand for `0.0.0.0:8080`.
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use tower::ServiceExt;

    use super::*;
    use crate::plugin::EntryPoint;

    fn http_fn(entry: EntryPoint) -> HttpFn {
        match entry {
            EntryPoint::Http(f) => f,
            _ => unreachable!(),
        }
    }

    fn echo_path() -> HttpFn {
        http_fn(EntryPoint::http(|req: Request| async move {
            req.uri().path().to_string().into_response()
        }))
    }

    async fn call(router: &HttpRouter, path: &str) -> (StatusCode, String) {
        let response = router
            .router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_request_forwarded_unmodified() {
        let router = HttpRouter::new(CallGuard::default());
        router.bind("p", "Serve", "/items/{id}", echo_path()).unwrap();

        let (status, body) = call(&router, "/items/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "/items/42");

        let (status, _) = call(&router, "/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pattern_rules() {
        let router = HttpRouter::new(CallGuard::default());
        router.bind("a", "Serve", "/a", echo_path()).unwrap();

        assert!(matches!(
            router.bind("b", "Serve", "a", echo_path()),
            Err(HttpBindError::InvalidPattern { .. })
        ));
        assert!(matches!(
            router.bind("b", "Serve", "/a", echo_path()),
            Err(HttpBindError::Duplicate { ref owner, .. }) if owner == "a"
        ));
        router.bind("a", "Serve", "/c/{name}", echo_path()).unwrap();
        assert!(matches!(
            router.bind("b", "Serve", "/c/{id}", echo_path()),
            Err(HttpBindError::InvalidPattern { .. })
        ));
        assert_eq!(router.route_count(), 2);

        let (status, _) = call(&router, "/a").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_panicking_handler_answers_500() {
        let router = HttpRouter::new(CallGuard::default());
        let boom = http_fn(EntryPoint::http(|_req: Request| async move {
            if true {
                panic!("handler bug");
            }
            StatusCode::OK.into_response()
        }));
        router.bind("p", "Boom", "/boom", boom).unwrap();
        router.bind("p", "Serve", "/ok", echo_path()).unwrap();

        assert_eq!(call(&router, "/boom").await.0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(call(&router, "/ok").await.0, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_answers_504() {
        let router = HttpRouter::new(CallGuard::new(Some(Duration::from_secs(1))));
        let slow = http_fn(EntryPoint::http(|_req: Request| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }));
        router.bind("p", "Slow", "/slow", slow).unwrap();
        assert_eq!(call(&router, "/slow").await.0, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_listener_starts_once() {
        let router = Arc::new(HttpRouter::new(CallGuard::default()));
        let mut tasks = JoinSet::new();
        let cancel = CancellationToken::new();

        assert!(router
            .start("127.0.0.1:0", &mut tasks, cancel.clone())
            .await
            .unwrap()
            .is_none());

        router.bind("p", "Serve", "/", echo_path()).unwrap();
        let addr = router
            .start("127.0.0.1:0", &mut tasks, cancel.clone())
            .await
            .unwrap();
        assert!(addr.is_some());
        assert!(router.is_serving());

        assert!(router
            .start("127.0.0.1:0", &mut tasks, cancel.clone())
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            router.bind("p", "Serve", "/late", echo_path()),
            Err(HttpBindError::AlreadyServing(_))
        ));

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[test]
    fn test_normalize_listen_addr() {
        assert_eq!(normalize_listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
