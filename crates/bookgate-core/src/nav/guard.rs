use tracing::debug;

use crate::auth::{SessionHandle, SessionSnapshot};

use super::routes::{RouteIntent, RouteTable};

/// Query parameter carrying the destination to resume after login
pub const REDIRECT_PARAM: &str = "redirect";

const LOGIN_ROUTE: &str = "Login";
const HOME_ROUTE: &str = "Home";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Route name to navigate to instead
    pub destination: String,
    pub params: Vec<(String, String)>,
}

impl Redirect {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(Redirect),
}

/// The navigation subsystem's side of a pre-transition hook. Exactly one of
/// the two methods is called per transition.
pub trait Navigator {
    fn proceed(&mut self);
    fn redirect(&mut self, destination: &str, params: &[(String, String)]);
}

pub struct NavigationGuard {
    routes: RouteTable,
    login_route: String,
    home_route: String,
}

impl NavigationGuard {
    pub fn new(routes: RouteTable, login_route: impl Into<String>, home_route: impl Into<String>) -> Self {
        Self {
            routes,
            login_route: login_route.into(),
            home_route: home_route.into(),
        }
    }

    /// Guard over the library application's route table.
    pub fn library() -> Self {
        Self::new(RouteTable::library(), LOGIN_ROUTE, HOME_ROUTE)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    fn redirect_home(&self) -> Decision {
        Decision::Redirect(Redirect {
            destination: self.home_route.clone(),
            params: Vec::new(),
        })
    }

    /// Decide a transition to `target` (reached via `target_path`).
    ///
    /// Checks run in order: authentication, then role, then the
    /// already-logged-in visit to the login page.
    pub fn evaluate(&self, target: &RouteIntent, target_path: &str, session: &SessionSnapshot) -> Decision {
        if target.requires_auth && !session.is_authenticated() {
            return Decision::Redirect(Redirect {
                destination: self.login_route.clone(),
                params: vec![(REDIRECT_PARAM.to_string(), target_path.to_string())],
            });
        }
        if let Some(role) = target.requires_role {
            if !session.has_role(role) {
                return self.redirect_home();
            }
        }
        if target.name == self.login_route && session.is_authenticated() {
            return self.redirect_home();
        }
        Decision::Allow
    }

    /// Resolve `to` against the route table and decide. Paths outside the
    /// table are treated as public destinations.
    pub fn check(&self, to: &str, session: &SessionSnapshot) -> Decision {
        match self.routes.resolve(to) {
            Some(resolved) => self.evaluate(resolved.intent, to, session),
            None => self.evaluate(&RouteIntent::public("", to), to, session),
        }
    }

    /// Pre-transition hook: decide and tell `navigator`.
    pub fn before_each<N: Navigator + ?Sized>(
        &self,
        to: &str,
        from: &str,
        session: &SessionHandle,
        navigator: &mut N,
    ) -> Decision {
        let decision = self.check(to, &session.snapshot());
        debug!(to, from, ?decision, "Navigation evaluated");
        match &decision {
            Decision::Allow => navigator.proceed(),
            Decision::Redirect(r) => navigator.redirect(&r.destination, &r.params),
        }
        decision
    }
}
