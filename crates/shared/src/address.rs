//! Socket and API URL resolution.
//!
//! Pages served over TLS sit behind a path-based multi-tenant gateway, so every
//! URL has to be routed through `/cloud/<tenant>`. Plain HTTP origins (local
//! development) talk to the flow service directly. The two shapes differ on
//! purpose and must stay that way: the gateway routes on them.

use url::Url;

/// Navigation context of the page plus the flow this client is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressContext {
    /// True when the page was loaded over `https:`.
    pub is_secure: bool,
    /// Host including a non-default port, e.g. `hub.local:8083`.
    pub host: String,
    /// Page path, e.g. `/cloud/tenant42/dashboard`.
    pub path_prefix: String,
    /// Query string including its leading `?`, or empty.
    pub search_params: String,
    pub flow_id: String,
}

/// What a resolved URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// The flow event socket.
    Ws,
    /// An HTTP component path such as `/api/flow/context/full_struct_and_states`.
    Http(&'a str),
}

impl AddressContext {
    /// Build a context from the page URL the client was loaded from.
    pub fn from_page_url(page: &Url, flow_id: impl Into<String>) -> Self {
        let host = match (page.host_str(), page.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };

        let search_params = match page.query() {
            Some(q) if !q.is_empty() => format!("?{q}"),
            _ => String::new(),
        };

        Self {
            is_secure: page.scheme() == "https",
            host,
            path_prefix: page.path().to_string(),
            search_params,
            flow_id: flow_id.into(),
        }
    }

    /// Second segment of the page path (`/x/<tenant>/...`).
    ///
    /// Empty when the path is too short; the resulting URL is then malformed,
    /// which is the caller's problem.
    pub fn tenant_segment(&self) -> &str {
        self.path_prefix.split('/').nth(2).unwrap_or("")
    }

    fn origin(&self) -> String {
        if self.is_secure {
            format!("https://{}", self.host)
        } else {
            format!("http://{}", self.host)
        }
    }

    pub fn ws_url(&self) -> String {
        resolve(self, Target::Ws)
    }

    pub fn http_url(&self, component_path: &str) -> String {
        resolve(self, Target::Http(component_path))
    }
}

/// Resolve a fully-qualified URL for `target`.
pub fn resolve(ctx: &AddressContext, target: Target<'_>) -> String {
    match (ctx.is_secure, target) {
        (true, Target::Ws) => format!(
            "wss://{}/cloud/{}/flow/{}/ws{}",
            ctx.host,
            ctx.tenant_segment(),
            ctx.flow_id,
            ctx.search_params
        ),
        (true, Target::Http(path)) => format!(
            "{}/cloud/{}{}{}",
            ctx.origin(),
            ctx.tenant_segment(),
            path,
            ctx.search_params
        ),
        (false, Target::Ws) => format!("ws://{}/flow/{}/ws", ctx.host, ctx.flow_id),
        (false, Target::Http(path)) => format!("{}{}", ctx.origin(), path),
    }
}
