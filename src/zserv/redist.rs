//! Route-redistribution subscription tracking.
//!
//! One bit per route source type plus a standalone default-route flag.
//! The mutating calls report whether the state actually changed, which is
//! exactly "does a wire message need to be sent"; the session replays the
//! tracked set on every reconnect because the manager keeps no state
//! across sessions.

use crate::types::RouteType;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RedistState {
    /// Subscription bitmap, bit position = route type wire value.
    types: u32,
    default_route: bool,
}

impl RedistState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subscription bit for `route_type`.
    ///
    /// Returns true when the type was not previously subscribed, i.e. a
    /// subscribe request is owed to the manager. Re-subscribing is a
    /// no-op.
    pub fn subscribe(&mut self, route_type: RouteType) -> bool {
        let bit = 1 << route_type as u8;
        let changed = self.types & bit == 0;
        self.types |= bit;
        changed
    }

    /// Clear the subscription bit for `route_type`.
    ///
    /// Returns true when the type was previously subscribed; clearing an
    /// unset bit is a no-op, not an error.
    pub fn unsubscribe(&mut self, route_type: RouteType) -> bool {
        let bit = 1 << route_type as u8;
        let changed = self.types & bit != 0;
        self.types &= !bit;
        changed
    }

    /// Set the default-route flag; same change-reporting discipline.
    pub fn subscribe_default(&mut self) -> bool {
        let changed = !self.default_route;
        self.default_route = true;
        changed
    }

    pub fn unsubscribe_default(&mut self) -> bool {
        let changed = self.default_route;
        self.default_route = false;
        changed
    }

    pub fn is_subscribed(&self, route_type: RouteType) -> bool {
        self.types & (1 << route_type as u8) != 0
    }

    pub fn default_route(&self) -> bool {
        self.default_route
    }

    /// Subscribed route types in ascending wire order.
    pub fn subscribed(&self) -> impl Iterator<Item = RouteType> + '_ {
        RouteType::ALL
            .into_iter()
            .filter(|t| self.is_subscribed(*t))
    }
}
