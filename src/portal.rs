//! Front-end portal service — session binding, login flow, guarded pages
//!
//! Every request passes through the session middleware (resolve-or-create,
//! cookie issuance). The login/callback/logout routes drive the
//! authorization-code flow; `/home` and `/groups` are guarded and reject
//! with 401 whenever the session holds no access token. No token
//! verification happens on this side — the bearer token is only relayed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode, header, header::HeaderValue},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::Result;
use crate::flow::AuthFlow;
use crate::graph::GraphClient;
use crate::session::{SESSION_COOKIE, Session, SessionStore};

/// Shared state for the portal service
pub struct PortalState {
    /// Session store shared by all requests
    pub sessions: SessionStore,
    /// Authorization-code flow controller
    pub flow: AuthFlow,
    /// Graph client for group lookups
    pub graph: GraphClient,
    /// Post-logout redirect target
    pub public_url: String,
}

/// Session identifier resolved by the middleware, injected per request
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Query parameters on the provider callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Error code, when the provider rejected the authorize request
    pub error: Option<String>,
    /// Error description
    pub error_description: Option<String>,
}

/// Build the portal router
pub fn portal_router(state: Arc<PortalState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login))
        .route("/auth/microsoft/callback", get(callback))
        .route("/logout", get(logout))
        .route("/home", get(home))
        .route("/groups", get(groups))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the portal
pub async fn serve(state: Arc<PortalState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "portal listening");
    axum::serve(listener, portal_router(state)).await?;
    Ok(())
}

// ── Session middleware ────────────────────────────────────────────────────

/// Resolve the session cookie, creating a session (and issuing a cookie on
/// the response) when the identifier is absent or unknown.
async fn session_middleware(
    State(state): State<Arc<PortalState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_id = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|header| cookie_value(header, SESSION_COOKIE))
        .map(str::to_owned);

    let (id, is_new) = state.sessions.resolve(cookie_id.as_deref());
    if is_new {
        debug!(session = %id, "created new session");
    }
    request.extensions_mut().insert(SessionId(id.clone()));

    let mut response = next.run(request).await;

    if is_new {
        // httpOnly, non-secure, session-scoped — matches the cookie the
        // browser flow expects.
        let cookie = format!("{SESSION_COOKIE}={id}; HttpOnly");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

/// Extract a named cookie from a `Cookie` header value
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// The session for this request, only when it holds an access token
fn authenticated_session(state: &PortalState, session_id: &SessionId) -> Option<Session> {
    state
        .sessions
        .get(&session_id.0)
        .filter(Session::is_authenticated)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn index() -> Html<String> {
    Html(render(
        "<h1>Entra Portal</h1>\n\
         <button onclick=\"location.href='/login'\" style=\"cursor:pointer;\">Login with Microsoft</button>",
    ))
}

/// `GET /login` — redirect the browser to the provider authorize endpoint
async fn login(State(state): State<Arc<PortalState>>) -> Response {
    match state.flow.authorize_url() {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to build authorize URL");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login unavailable").into_response()
        }
    }
}

/// `GET /auth/microsoft/callback` — exchange the code and populate the session
async fn callback(
    State(state): State<Arc<PortalState>>,
    axum::Extension(SessionId(session_id)): axum::Extension<SessionId>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    if let Some(error) = params.error {
        warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "provider returned an error on callback"
        );
    } else if let Some(code) = params.code {
        match state.flow.exchange_code(&code).await {
            Ok(bundle) => {
                let stored = state.sessions.with_session(&session_id, |session| {
                    session.access_token = Some(bundle.access_token);
                    session.refresh_token = bundle.refresh_token;
                    session.id_token = bundle.id_token;
                });
                if stored {
                    info!(session = %session_id, "session authenticated");
                } else {
                    // The id was invalidated between middleware and handler;
                    // the exchanged bundle is dropped.
                    warn!(session = %session_id, "session vanished before tokens could be stored");
                }
            }
            Err(e) => {
                // Swallowed: the user still lands on /home unauthenticated.
                warn!(error = %e, "token exchange failed");
            }
        }
    } else {
        warn!("callback without code parameter");
    }

    // The flow always lands on /home, even after a failed exchange.
    Redirect::to("/home")
}

/// `GET /logout` — clear token fields (the session id survives) and send
/// the browser to the provider logout endpoint
async fn logout(
    State(state): State<Arc<PortalState>>,
    axum::Extension(SessionId(session_id)): axum::Extension<SessionId>,
) -> Response {
    state.sessions.clear_tokens(&session_id);
    info!(session = %session_id, "session tokens cleared");

    match state.flow.logout_url(&state.public_url) {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to build logout URL");
            (StatusCode::INTERNAL_SERVER_ERROR, "Logout unavailable").into_response()
        }
    }
}

/// `GET /home` — guarded landing page
async fn home(
    State(state): State<Arc<PortalState>>,
    axum::Extension(session_id): axum::Extension<SessionId>,
) -> Response {
    if authenticated_session(&state, &session_id).is_none() {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    Html(render(
        "<h1>Entra Portal</h1>\n\
         <p>You are now logged in!</p>\n\
         <a href=\"/groups\">My groups</a>\n\
         <button onclick=\"location.href='/logout'\" style=\"cursor:pointer;\">Logout</button>",
    ))
    .into_response()
}

/// `GET /groups` — guarded; relays the session's access token to the graph
async fn groups(
    State(state): State<Arc<PortalState>>,
    axum::Extension(session_id): axum::Extension<SessionId>,
) -> Response {
    let Some(session) = authenticated_session(&state, &session_id) else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };
    let Some(token) = session.access_token else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };

    match state.graph.member_groups(&token).await {
        Ok(memberships) => {
            let items: String = memberships
                .iter()
                .filter_map(|o| o.display_name.as_deref())
                .map(|name| format!("<li>{name}</li>\n"))
                .collect();
            Html(render(&format!("<h1>Your groups</h1>\n<ul>\n{items}</ul>"))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "group membership lookup failed");
            (StatusCode::BAD_GATEWAY, "Failed to load group memberships").into_response()
        }
    }
}

/// Minimal HTML shell around page content
fn render(content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
             <meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>Entra Portal</title>\n\
         </head>\n\
         <body>\n\
             {content}\n\
         </body>\n\
         </html>\n"
    )
}
