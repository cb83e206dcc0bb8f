use tracing::info;

/// Default route of the sign-in view
pub const LOGIN_ROUTE: &str = "/account/login";

/// Client-side routing, as seen by the session manager
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// For front ends without a router: records the redirect in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Navigating");
    }
}
