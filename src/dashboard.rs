//! Route table and role-based dashboard selection.
//!
//! SYSTEM CONTEXT
//! ==============
//! Pages decide what to show from a [`SessionState`] snapshot alone. Every
//! protected route applies the same rules: wait while loading, send
//! anonymous visitors to `/login`, then pick the dashboard for the role.

use crate::role::Role;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Dashboard,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
        }
    }

    /// Match a request path, ignoring a trailing slash and query string.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(Self::Home),
            "/login" => Some(Self::Login),
            "/dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }
}

/// A feature card on a dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub title: &'static str,
    pub description: &'static str,
}

/// Everything a role's dashboard shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSpec {
    pub role: Role,
    pub title: &'static str,
    pub greeting: String,
    pub sections: &'static [Section],
    pub privileges_heading: &'static str,
    pub privileges: &'static [&'static str],
}

const SUPERADMIN_SECTIONS: &[Section] = &[
    Section { title: "User Management", description: "Manage all users and their roles" },
    Section { title: "System Settings", description: "Configure system-wide settings" },
    Section { title: "Analytics", description: "View comprehensive analytics" },
];

const ADMIN_SECTIONS: &[Section] = &[
    Section { title: "User Management", description: "Manage regular users" },
    Section { title: "Content Management", description: "Manage application content" },
];

const USER_SECTIONS: &[Section] = &[
    Section { title: "My Profile", description: "View and edit your profile information" },
    Section { title: "My Activities", description: "View your recent activities" },
];

const SUPERADMIN_PRIVILEGES: &[&str] = &[
    "Full access to all system features",
    "Can manage all users and admins",
    "System configuration access",
    "Advanced analytics and reports",
];

const ADMIN_PRIVILEGES: &[&str] = &["Manage regular users", "Content moderation", "View reports and analytics"];

const USER_PRIVILEGES: &[&str] = &[
    "Access to personal dashboard",
    "View your own data and activities",
    "Update profile information",
];

impl DashboardSpec {
    #[must_use]
    pub fn for_role(role: Role, email: &str) -> Self {
        let (title, sections, privileges_heading, privileges) = match role {
            Role::SuperAdmin => {
                ("Super Admin Dashboard", SUPERADMIN_SECTIONS, "Super Admin Privileges", SUPERADMIN_PRIVILEGES)
            }
            Role::Admin => ("Admin Dashboard", ADMIN_SECTIONS, "Admin Privileges", ADMIN_PRIVILEGES),
            Role::User => ("User Dashboard", USER_SECTIONS, "User Features", USER_PRIVILEGES),
        };
        Self { role, title, greeting: format!("Welcome, {email}"), sections, privileges_heading, privileges }
    }
}

/// What a route renders for a given session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Home,
    Login,
    Loading,
    Redirect(Route),
    Dashboard(DashboardSpec),
}

/// Decide what `route` shows for `state`.
#[must_use]
pub fn resolve(route: Route, state: &SessionState) -> View {
    match route {
        Route::Home => View::Home,
        Route::Login => match &state.identity {
            Some(_) if !state.loading => View::Redirect(Route::Dashboard),
            _ => View::Login,
        },
        Route::Dashboard => {
            if state.loading {
                return View::Loading;
            }
            match &state.identity {
                Some(identity) => View::Dashboard(DashboardSpec::for_role(identity.role, &identity.email)),
                None => View::Redirect(Route::Login),
            }
        }
    }
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
